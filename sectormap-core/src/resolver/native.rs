//! Native (TDX) industry source.
//!
//! A stock may carry a primary `T` code and an alternate `X` code. Levels
//! are filled from the codes in that order; a level already set by an
//! earlier code is never overwritten.

use super::IndustrySource;
use crate::data::{NativeData, SourceManifest};
use crate::taxonomy::grammar::level_of;
use crate::taxonomy::{
    Block, LevelConflict, LevelRecord, StockIndustry, StockRecord, Taxonomy, TaxonomyTable,
};
use std::collections::HashMap;
use tracing::{debug, warn};

pub struct NativeSource {
    table: TaxonomyTable,
    names: HashMap<String, String>,
    concepts: Vec<Block>,
    manifest: SourceManifest,
}

impl NativeSource {
    pub fn new(
        table: TaxonomyTable,
        names: HashMap<String, String>,
        concepts: Vec<Block>,
        manifest: SourceManifest,
    ) -> Self {
        Self {
            table,
            names,
            concepts,
            manifest,
        }
    }

    /// Fill whichever of l1/l2 are still empty from `code` and its ancestors.
    fn fill_levels(&self, result: &mut StockIndustry, code: &str) {
        let Some(level) = level_of(Taxonomy::Native, code) else {
            return;
        };
        for target in [2u8, 1] {
            if target > level {
                continue;
            }
            let filled = if target == 2 {
                result.has_l2()
            } else {
                result.has_l1()
            };
            if filled {
                continue;
            }
            if let Some(node) = self.table.node_at_level(code, target) {
                if target == 2 {
                    result.set_l2(node);
                } else {
                    result.set_l1(node);
                }
            }
        }
    }

    /// Heuristic backfill: no code produced a level-1 or level-2 match, so
    /// the first code's own node is reported as level-1.
    fn fallback_first_code(&self, result: &mut StockIndustry, stock: &StockRecord) {
        let Some(first) = stock.primary_code() else {
            return;
        };
        if let Some(node) = self.table.node(&first.code) {
            debug!(
                "stock {} has no structured match, reporting {} as level 1",
                stock.stock_code, first.code
            );
            result.set_l1(node);
        }
    }

    /// The alternate numbering's level-1 node when it disagrees by name with
    /// the reported level-1.
    fn level1_conflict(
        &self,
        result: &StockIndustry,
        stock: &StockRecord,
    ) -> Option<LevelConflict> {
        let reported = result.l1_name.as_deref()?;
        if result.l1_code.as_deref().is_some_and(|c| c.starts_with('X')) {
            return None;
        }
        let alternate: &LevelRecord = stock
            .codes
            .iter()
            .filter(|c| c.code.starts_with('X'))
            .find_map(|c| self.table.node_at_level(&c.code, 1))?;
        if alternate.name == reported {
            return None;
        }
        warn!(
            "stock {}: primary level 1 '{}' disagrees with alternate '{}' ({})",
            stock.stock_code, reported, alternate.name, alternate.code
        );
        Some(LevelConflict {
            l1_name: alternate.name.clone(),
            l1_code: alternate.code.code.clone(),
        })
    }
}

impl From<NativeData> for NativeSource {
    fn from(data: NativeData) -> Self {
        Self::new(data.table, data.names, data.concepts, data.manifest)
    }
}

impl IndustrySource for NativeSource {
    fn taxonomy(&self) -> Taxonomy {
        Taxonomy::Native
    }

    fn table(&self) -> &TaxonomyTable {
        &self.table
    }

    fn manifest(&self) -> &SourceManifest {
        &self.manifest
    }

    fn supports_level(&self, level: u8) -> bool {
        level <= 2
    }

    fn industry_of(&self, stock_code: &str) -> Option<StockIndustry> {
        let stock = self.table.stock(stock_code)?;
        let mut result = StockIndustry::new(stock_code);
        result.stock_name = stock
            .stock_name
            .clone()
            .or_else(|| self.names.get(stock_code).cloned());

        for code in &stock.codes {
            self.fill_levels(&mut result, &code.code);
        }
        if !result.has_l1() && !result.has_l2() {
            self.fallback_first_code(&mut result, stock);
        }
        result.conflict = self.level1_conflict(&result, stock);
        Some(result)
    }

    fn node_by_block(&self, block_code: &str) -> Option<&LevelRecord> {
        self.table.node_by_block(block_code)
    }

    fn concept_blocks(&self, filter: Option<&str>) -> Vec<Block> {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return self.concepts.clone();
        };
        self.concepts
            .iter()
            .filter(|b| {
                b.concept_type.eq_ignore_ascii_case(filter) || b.concept_name.contains(filter)
            })
            .cloned()
            .collect()
    }
}
