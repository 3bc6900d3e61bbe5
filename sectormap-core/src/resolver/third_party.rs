//! Third-party (SWS) industry source.

use super::IndustrySource;
use crate::data::{GateOutcome, SourceManifest, SourceOrigin, ThirdPartyData};
use crate::taxonomy::grammar::code_at_level;
use crate::taxonomy::{StockIndustry, Taxonomy, TaxonomyTable};

pub struct ThirdPartySource {
    table: TaxonomyTable,
    manifest: SourceManifest,
    origin: SourceOrigin,
}

impl ThirdPartySource {
    pub fn new(table: TaxonomyTable, manifest: SourceManifest, origin: SourceOrigin) -> Self {
        Self {
            table,
            manifest,
            origin,
        }
    }

    pub fn from_loaded(data: ThirdPartyData, gate: &GateOutcome) -> Self {
        Self::new(data.table, data.manifest, gate.origin)
    }
}

impl IndustrySource for ThirdPartySource {
    fn taxonomy(&self) -> Taxonomy {
        Taxonomy::ThirdParty
    }

    fn table(&self) -> &TaxonomyTable {
        &self.table
    }

    fn manifest(&self) -> &SourceManifest {
        &self.manifest
    }

    fn supports_level(&self, level: u8) -> bool {
        matches!(level, 1 | 2)
    }

    /// Codes are positional prefixes of the stock's code; names come from
    /// the joined hierarchy row, with the sentinel standing in for a
    /// missing level-2 name.
    fn industry_of(&self, stock_code: &str) -> Option<StockIndustry> {
        let stock = self.table.stock(stock_code)?;
        let mut result = StockIndustry::new(stock_code);
        result.stock_name = stock.stock_name.clone();
        if let Some(code) = stock.primary_code() {
            result.l1_code = code_at_level(Taxonomy::ThirdParty, &code.code, 1);
            result.l2_code = code_at_level(Taxonomy::ThirdParty, &code.code, 2);
        }
        let [_, l1, l2, l3] = &stock.level_names;
        result.l1_name = l1.clone();
        result.l2_name = l2.clone();
        result.l3_name = l3.clone();
        Some(result)
    }

    fn origin(&self) -> Option<SourceOrigin> {
        Some(self.origin)
    }
}
