//! Industry resolver: the query facade over loaded taxonomy sources.
//!
//! Each taxonomy is served by an [`IndustrySource`]. The resolver owns one
//! source per loaded taxonomy and dispatches every query on the
//! [`Taxonomy`] selector. Sources are built eagerly by
//! [`ResolverBuilder`]; once built, a resolver is immutable and can be
//! shared across threads.

pub mod builder;
pub mod native;
pub mod third_party;

pub use builder::{prepare_third_party, ResolverBuilder};
pub use native::NativeSource;
pub use third_party::ThirdPartySource;

use crate::config::ConfigError;
use crate::data::{ClassificationError, SourceManifest, SourceOrigin};
use crate::taxonomy::grammar::is_valid;
use crate::taxonomy::{Block, Industry, LevelRecord, StockIndustry, Taxonomy, TaxonomyTable};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("taxonomy '{0}' was not loaded by this resolver")]
    TaxonomyNotLoaded(Taxonomy),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One loaded taxonomy, queryable by code, block code, name or stock.
pub trait IndustrySource: Send + Sync {
    fn taxonomy(&self) -> Taxonomy;

    fn table(&self) -> &TaxonomyTable;

    fn manifest(&self) -> &SourceManifest;

    /// Levels this taxonomy answers `list_industries` and `blocks` for.
    fn supports_level(&self, level: u8) -> bool;

    /// Level breakdown for one stock. `None` when the stock is unknown.
    fn industry_of(&self, stock_code: &str) -> Option<StockIndustry>;

    fn node_by_block(&self, _block_code: &str) -> Option<&LevelRecord> {
        None
    }

    fn concept_blocks(&self, _filter: Option<&str>) -> Vec<Block> {
        Vec::new()
    }

    /// Where the source files were read from, for sources that go through
    /// the cache gate.
    fn origin(&self) -> Option<SourceOrigin> {
        None
    }

    fn list_industries(&self, level: u8) -> Vec<Industry> {
        if !self.supports_level(level) {
            return Vec::new();
        }
        self.table().nodes_at(level).map(Industry::from).collect()
    }

    /// Map an identifier to a classification code. Tried in order:
    /// classification code (a known node, a raw stock code, or a
    /// well-formed prefix of one), block code, exact industry name.
    fn resolve_identifier(&self, identifier: &str) -> Option<String> {
        let id = identifier.trim();
        if id.is_empty() {
            return None;
        }
        let table = self.table();
        let structural = is_valid(self.taxonomy(), id) && table.has_members_under(id);
        if table.node(id).is_some() || table.has_members(id) || structural {
            return Some(id.to_string());
        }
        if let Some(node) = self.node_by_block(id) {
            return Some(node.code.code.clone());
        }
        table.node_by_name(id).map(|n| n.code.code.clone())
    }

    /// Stocks under `identifier`, including every sub-industry.
    fn stocks_of(&self, identifier: &str) -> BTreeSet<String> {
        self.resolve_identifier(identifier)
            .map(|code| self.table().stocks_with_prefix(&code))
            .unwrap_or_default()
    }

    fn blocks(&self, level: u8) -> Vec<Block> {
        if !self.supports_level(level) {
            return Vec::new();
        }
        self.table().blocks_at(level)
    }
}

pub struct IndustryResolver {
    sources: BTreeMap<Taxonomy, Box<dyn IndustrySource>>,
}

impl IndustryResolver {
    pub fn new(sources: Vec<Box<dyn IndustrySource>>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.taxonomy(), s)).collect(),
        }
    }

    /// Taxonomies this resolver can answer for.
    pub fn taxonomies(&self) -> impl Iterator<Item = Taxonomy> + '_ {
        self.sources.keys().copied()
    }

    pub fn source(&self, taxonomy: Taxonomy) -> Result<&dyn IndustrySource, ResolveError> {
        self.sources
            .get(&taxonomy)
            .map(|s| s.as_ref())
            .ok_or(ResolveError::TaxonomyNotLoaded(taxonomy))
    }

    /// Industries at `level`, in source order. Unsupported levels yield an
    /// empty list.
    pub fn list_industries(
        &self,
        taxonomy: Taxonomy,
        level: u8,
    ) -> Result<Vec<Industry>, ResolveError> {
        Ok(self.source(taxonomy)?.list_industries(level))
    }

    pub fn stocks_of(
        &self,
        taxonomy: Taxonomy,
        identifier: &str,
    ) -> Result<BTreeSet<String>, ResolveError> {
        Ok(self.source(taxonomy)?.stocks_of(identifier))
    }

    pub fn industry_of(
        &self,
        taxonomy: Taxonomy,
        stock_code: &str,
    ) -> Result<Option<StockIndustry>, ResolveError> {
        Ok(self.source(taxonomy)?.industry_of(stock_code))
    }

    /// Stocks grouped under their level-`level` industry.
    pub fn blocks(&self, taxonomy: Taxonomy, level: u8) -> Result<Vec<Block>, ResolveError> {
        Ok(self.source(taxonomy)?.blocks(level))
    }

    /// Native concept blocks, optionally filtered by block type (`GN`, `FG`,
    /// `ZS`) or by a substring of the block name.
    pub fn concept_blocks(&self, filter: Option<&str>) -> Result<Vec<Block>, ResolveError> {
        Ok(self.source(Taxonomy::Native)?.concept_blocks(filter))
    }

    pub fn manifest(&self, taxonomy: Taxonomy) -> Option<&SourceManifest> {
        self.sources.get(&taxonomy).map(|s| s.manifest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::manifest::ManifestBuilder;
    use crate::taxonomy::{ClassificationCode, StockRecord};

    fn native_source() -> NativeSource {
        let mut table = TaxonomyTable::new(Taxonomy::Native);
        for (code, name, level, block) in [
            ("T10", "金融", 0, "880470"),
            ("T1001", "银行", 1, "880471"),
            ("T100101", "国有银行", 2, "880472"),
        ] {
            table.insert_node(LevelRecord {
                code: ClassificationCode::new(Taxonomy::Native, code),
                name: name.into(),
                level,
                block_code: Some(block.into()),
            });
        }
        let mut stock = StockRecord::new("601398");
        stock.codes = vec![ClassificationCode::new(Taxonomy::Native, "T100101")];
        table.insert_stock(stock);
        let manifest = ManifestBuilder::new(Taxonomy::Native, "/tdx").finish(&table);
        NativeSource::new(table, Default::default(), Vec::new(), manifest)
    }

    #[test]
    fn unloaded_taxonomy_is_an_error() {
        let resolver =
            IndustryResolver::new(vec![Box::new(native_source()) as Box<dyn IndustrySource>]);
        let err = resolver
            .list_industries(Taxonomy::ThirdParty, 1)
            .unwrap_err();
        assert!(matches!(err, ResolveError::TaxonomyNotLoaded(Taxonomy::ThirdParty)));
        assert!(resolver.manifest(Taxonomy::ThirdParty).is_none());
        assert!(resolver.manifest(Taxonomy::Native).is_some());
    }

    #[test]
    fn identifier_order_code_then_block_then_name() {
        let source = native_source();
        assert_eq!(source.resolve_identifier("T1001").as_deref(), Some("T1001"));
        assert_eq!(source.resolve_identifier("880471").as_deref(), Some("T1001"));
        assert_eq!(source.resolve_identifier("银行").as_deref(), Some("T1001"));
        assert_eq!(source.resolve_identifier("保险"), None);
        assert_eq!(source.resolve_identifier("  "), None);
    }

    #[test]
    fn stocks_of_is_prefix_inclusive() {
        let resolver =
            IndustryResolver::new(vec![Box::new(native_source()) as Box<dyn IndustrySource>]);
        for id in ["T10", "金融", "880471", "T100101"] {
            let stocks = resolver.stocks_of(Taxonomy::Native, id).unwrap();
            assert!(stocks.contains("601398"), "{id}");
        }
        assert!(resolver.stocks_of(Taxonomy::Native, "T1002").unwrap().is_empty());
    }

    #[test]
    fn resolver_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndustryResolver>();
    }
}
