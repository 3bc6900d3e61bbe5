//! Normalized, read-only classification table for one taxonomy.
//!
//! A table holds two things:
//! - classification nodes (`LevelRecord`) in source order, indexed by code,
//!   block code and name (first occurrence wins for every index);
//! - stock records keyed by stock code, plus a reverse index from each raw
//!   classification code to the stocks carrying it.
//!
//! Tables are filled by the source loaders and never mutated afterwards.

use super::grammar::{ancestor, level_of};
use super::{Block, BlockStock, ClassificationCode, LevelRecord, Taxonomy};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A stock and everything the source said about its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    pub stock_code: String,
    pub stock_name: Option<String>,
    /// Classification codes in precedence order (primary numbering first).
    pub codes: Vec<ClassificationCode>,
    pub as_of_date: Option<NaiveDate>,
    /// Level names carried verbatim by the source, indexed by level.
    pub level_names: [Option<String>; 4],
}

impl StockRecord {
    pub fn new(stock_code: impl Into<String>) -> Self {
        Self {
            stock_code: stock_code.into(),
            stock_name: None,
            codes: Vec::new(),
            as_of_date: None,
            level_names: Default::default(),
        }
    }

    pub fn primary_code(&self) -> Option<&ClassificationCode> {
        self.codes.first()
    }
}

#[derive(Debug, Clone)]
pub struct TaxonomyTable {
    taxonomy: Taxonomy,
    nodes: Vec<LevelRecord>,
    by_code: HashMap<String, usize>,
    by_block: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    stocks: BTreeMap<String, StockRecord>,
    members: BTreeMap<String, BTreeSet<String>>,
}

impl TaxonomyTable {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy,
            nodes: Vec::new(),
            by_code: HashMap::new(),
            by_block: HashMap::new(),
            by_name: HashMap::new(),
            stocks: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn taxonomy(&self) -> Taxonomy {
        self.taxonomy
    }

    /// Add a classification node. Rejects codes the grammar does not accept
    /// and codes already present; returns whether the node was added.
    pub fn insert_node(&mut self, record: LevelRecord) -> bool {
        if record.code.taxonomy != self.taxonomy
            || level_of(self.taxonomy, &record.code.code) != Some(record.level)
            || self.by_code.contains_key(&record.code.code)
        {
            return false;
        }

        let idx = self.nodes.len();
        self.by_code.insert(record.code.code.clone(), idx);
        if let Some(block) = record.block_code.as_deref().filter(|b| !b.is_empty()) {
            self.by_block.entry(block.to_string()).or_insert(idx);
        }
        self.by_name.entry(record.name.clone()).or_insert(idx);
        self.nodes.push(record);
        true
    }

    /// Add a stock record. The first record for a stock code wins; returns
    /// whether the record was added.
    pub fn insert_stock(&mut self, record: StockRecord) -> bool {
        if self.stocks.contains_key(&record.stock_code) {
            return false;
        }
        for code in &record.codes {
            self.members
                .entry(code.code.clone())
                .or_default()
                .insert(record.stock_code.clone());
        }
        self.stocks.insert(record.stock_code.clone(), record);
        true
    }

    pub fn node(&self, code: &str) -> Option<&LevelRecord> {
        self.by_code.get(code).map(|&i| &self.nodes[i])
    }

    pub fn node_by_block(&self, block_code: &str) -> Option<&LevelRecord> {
        self.by_block.get(block_code).map(|&i| &self.nodes[i])
    }

    pub fn node_by_name(&self, name: &str) -> Option<&LevelRecord> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes at `level`, in source order.
    pub fn nodes_at(&self, level: u8) -> impl Iterator<Item = &LevelRecord> {
        self.nodes.iter().filter(move |n| n.level == level)
    }

    pub fn stock(&self, stock_code: &str) -> Option<&StockRecord> {
        self.stocks.get(stock_code)
    }

    pub fn stocks(&self) -> impl Iterator<Item = &StockRecord> {
        self.stocks.values()
    }

    /// Whether any stock carries exactly `code`.
    pub fn has_members(&self, code: &str) -> bool {
        self.members.contains_key(code)
    }

    /// Whether any stock's classification code starts with `prefix`.
    pub fn has_members_under(&self, prefix: &str) -> bool {
        !prefix.is_empty()
            && self
                .members
                .range(prefix.to_string()..)
                .next()
                .is_some_and(|(code, _)| code.starts_with(prefix))
    }

    /// Every stock whose classification code starts with `prefix`.
    pub fn stocks_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        if prefix.is_empty() {
            return BTreeSet::new();
        }
        self.members
            .range(prefix.to_string()..)
            .take_while(|(code, _)| code.starts_with(prefix))
            .flat_map(|(_, stocks)| stocks.iter().cloned())
            .collect()
    }

    /// The node at `level` that `code` belongs to: the code itself when it
    /// already sits at that level, otherwise its ancestor.
    pub fn node_at_level(&self, code: &str, level: u8) -> Option<&LevelRecord> {
        match level_of(self.taxonomy, code)? {
            l if l == level => self.node(code),
            l if l > level => self.node(&ancestor(self.taxonomy, code, level)?),
            _ => None,
        }
    }

    /// Group stocks under their level-`level` node. Blocks follow node
    /// order; stocks within a block are sorted by code.
    pub fn blocks_at(&self, level: u8) -> Vec<Block> {
        let mut grouped: BTreeMap<usize, BTreeMap<&str, Option<&str>>> = BTreeMap::new();
        for stock in self.stocks.values() {
            for code in &stock.codes {
                let Some(node) = self.node_at_level(&code.code, level) else {
                    continue;
                };
                let idx = self.by_code[&node.code.code];
                grouped
                    .entry(idx)
                    .or_default()
                    .insert(&stock.stock_code, stock.stock_name.as_deref());
            }
        }

        let concept_type = format!("{}_l{level}", self.taxonomy.block_prefix());
        grouped
            .into_iter()
            .map(|(idx, members)| {
                let node = &self.nodes[idx];
                Block {
                    concept_name: node.name.clone(),
                    concept_code: node.code.code.clone(),
                    concept_type: concept_type.clone(),
                    stocks: members
                        .into_iter()
                        .map(|(code, name)| BlockStock {
                            stock_code: code.to_string(),
                            stock_name: name.map(str::to_string),
                        })
                        .collect(),
                }
            })
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn stock_count(&self) -> usize {
        self.stocks.len()
    }

    /// A table with neither nodes nor stocks means "no data available".
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.stocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(code: &str, name: &str, block: Option<&str>) -> LevelRecord {
        LevelRecord {
            code: ClassificationCode::new(Taxonomy::Native, code),
            name: name.into(),
            level: level_of(Taxonomy::Native, code).unwrap(),
            block_code: block.map(String::from),
        }
    }

    fn stock(code: &str, industry: &str) -> StockRecord {
        let mut rec = StockRecord::new(code);
        rec.codes
            .push(ClassificationCode::new(Taxonomy::Native, industry));
        rec
    }

    fn sample() -> TaxonomyTable {
        let mut t = TaxonomyTable::new(Taxonomy::Native);
        t.insert_node(node("T10", "金融", Some("880470")));
        t.insert_node(node("T1001", "银行", Some("880471")));
        t.insert_node(node("T1002", "证券", Some("880472")));
        t.insert_node(node("T100201", "券商", None));
        t.insert_stock(stock("000001", "T1001"));
        t.insert_stock(stock("600030", "T100201"));
        t.insert_stock(stock("000002", "T1101"));
        t
    }

    #[test]
    fn first_node_wins_and_invalid_codes_rejected() {
        let mut t = sample();
        assert!(!t.insert_node(node("T1001", "另一个银行", None)));
        assert_eq!(t.node("T1001").unwrap().name, "银行");

        let bogus = LevelRecord {
            code: ClassificationCode::new(Taxonomy::Native, "880471"),
            name: "bogus".into(),
            level: 1,
            block_code: None,
        };
        assert!(!t.insert_node(bogus));
        assert_eq!(t.node_count(), 4);
    }

    #[test]
    fn lookup_by_block_and_name() {
        let t = sample();
        assert_eq!(t.node_by_block("880471").unwrap().code.code, "T1001");
        assert_eq!(t.node_by_name("证券").unwrap().code.code, "T1002");
        assert!(t.node_by_name("保险").is_none());
    }

    #[test]
    fn prefix_membership_includes_descendants() {
        let t = sample();
        let fin = t.stocks_with_prefix("T10");
        assert!(fin.contains("000001"));
        assert!(fin.contains("600030"));
        assert!(!fin.contains("000002"));

        let sec = t.stocks_with_prefix("T1002");
        assert_eq!(sec.len(), 1);
        assert!(t.stocks_with_prefix("").is_empty());
    }

    #[test]
    fn members_under_prefix() {
        let t = sample();
        assert!(t.has_members_under("T11"));
        assert!(!t.has_members("T11"));
        assert!(t.has_members_under("T1002"));
        assert!(!t.has_members_under("T12"));
        assert!(!t.has_members_under(""));
    }

    #[test]
    fn first_stock_record_wins() {
        let mut t = sample();
        assert!(!t.insert_stock(stock("000001", "T1002")));
        assert_eq!(
            t.stock("000001").unwrap().primary_code().unwrap().code,
            "T1001"
        );
    }

    #[test]
    fn blocks_group_by_level() {
        let t = sample();
        let l1 = t.blocks_at(1);
        assert_eq!(l1.len(), 2);
        assert_eq!(l1[0].concept_name, "银行");
        assert_eq!(l1[0].concept_type, "tdx_l1");
        assert_eq!(l1[1].concept_code, "T1002");
        assert_eq!(l1[1].stocks[0].stock_code, "600030");

        let l0 = t.blocks_at(0);
        assert_eq!(l0.len(), 1);
        assert_eq!(l0[0].stocks.len(), 2);
    }
}
