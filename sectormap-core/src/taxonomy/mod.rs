//! Taxonomy domain types: selectors, classification codes, level records and
//! the derived query shapes returned by the resolver.

pub mod grammar;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use grammar::{ancestor, code_at_level, level_of};
pub use table::{StockRecord, TaxonomyTable};

/// Name substituted for a third-party level-2 industry that the hierarchy
/// table leaves empty.
pub const NO_SUBCLASSIFICATION: &str = "无二级分类";

/// Which classification scheme a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taxonomy {
    /// Vendor-native TDX industries (`T`/`X` prefixed codes).
    Native,
    /// Shenwan (SWS 2021) industries, numeric codes.
    ThirdParty,
}

impl Taxonomy {
    pub const ALL: [Taxonomy; 2] = [Taxonomy::Native, Taxonomy::ThirdParty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Taxonomy::Native => "native",
            Taxonomy::ThirdParty => "thirdparty",
        }
    }

    /// Prefix used in `Block::concept_type` for level groupings.
    pub fn block_prefix(&self) -> &'static str {
        match self {
            Taxonomy::Native => "tdx",
            Taxonomy::ThirdParty => "sws",
        }
    }
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown taxonomy '{0}' (expected 'native' or 'thirdparty')")]
pub struct UnknownTaxonomy(pub String);

impl FromStr for Taxonomy {
    type Err = UnknownTaxonomy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "tdx" => Ok(Taxonomy::Native),
            "thirdparty" | "third-party" | "sws" => Ok(Taxonomy::ThirdParty),
            other => Err(UnknownTaxonomy(other.to_string())),
        }
    }
}

/// A classification code tagged with the taxonomy whose grammar applies to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassificationCode {
    pub taxonomy: Taxonomy,
    pub code: String,
}

impl ClassificationCode {
    pub fn new(taxonomy: Taxonomy, code: impl Into<String>) -> Self {
        Self {
            taxonomy,
            code: code.into(),
        }
    }

    /// Nesting level per the taxonomy's grammar, `None` for malformed codes.
    pub fn level(&self) -> Option<u8> {
        level_of(self.taxonomy, &self.code)
    }

    /// Ancestor code at `target_level`, if one exists.
    pub fn ancestor(&self, target_level: u8) -> Option<ClassificationCode> {
        ancestor(self.taxonomy, &self.code, target_level)
            .map(|code| ClassificationCode::new(self.taxonomy, code))
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ClassificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// One classification node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub code: ClassificationCode,
    pub name: String,
    pub level: u8,
    /// Native index-style block code (`88xxxx`); absent for third-party nodes.
    pub block_code: Option<String>,
}

/// Row returned by `list_industries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Industry {
    pub name: String,
    pub code: String,
    pub level: u8,
}

impl From<&LevelRecord> for Industry {
    fn from(record: &LevelRecord) -> Self {
        Self {
            name: record.name.clone(),
            code: record.code.code.clone(),
            level: record.level,
        }
    }
}

/// A stock inside a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStock {
    pub stock_code: String,
    pub stock_name: Option<String>,
}

/// A named group of stocks (an industry at some level, or a concept block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub concept_name: String,
    pub concept_code: String,
    pub concept_type: String,
    pub stocks: Vec<BlockStock>,
}

/// A level-1 classification from the alternate native numbering that
/// disagrees with the primary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConflict {
    pub l1_name: String,
    pub l1_code: String,
}

/// Result of `industry_of`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIndustry {
    pub stock_code: String,
    pub stock_name: Option<String>,
    pub l1_name: Option<String>,
    pub l1_code: Option<String>,
    pub l2_name: Option<String>,
    pub l2_code: Option<String>,
    /// Raw third-party level-3 name; never derived.
    pub l3_name: Option<String>,
    pub conflict: Option<LevelConflict>,
}

impl StockIndustry {
    pub fn new(stock_code: impl Into<String>) -> Self {
        Self {
            stock_code: stock_code.into(),
            ..Default::default()
        }
    }

    pub fn has_l1(&self) -> bool {
        self.l1_name.is_some()
    }

    pub fn has_l2(&self) -> bool {
        self.l2_name.is_some()
    }

    pub(crate) fn set_l1(&mut self, record: &LevelRecord) {
        self.l1_name = Some(record.name.clone());
        self.l1_code = Some(record.code.code.clone());
    }

    pub(crate) fn set_l2(&mut self, record: &LevelRecord) {
        self.l2_name = Some(record.name.clone());
        self.l2_code = Some(record.code.code.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_parses_aliases() {
        assert_eq!("native".parse::<Taxonomy>().unwrap(), Taxonomy::Native);
        assert_eq!("TDX".parse::<Taxonomy>().unwrap(), Taxonomy::Native);
        assert_eq!("sws".parse::<Taxonomy>().unwrap(), Taxonomy::ThirdParty);
        assert_eq!(
            "thirdparty".parse::<Taxonomy>().unwrap(),
            Taxonomy::ThirdParty
        );
    }

    #[test]
    fn unknown_taxonomy_is_an_error() {
        let err = "gics".parse::<Taxonomy>().unwrap_err();
        assert_eq!(err, UnknownTaxonomy("gics".into()));
    }

    #[test]
    fn taxonomy_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Taxonomy::ThirdParty).unwrap(),
            "\"thirdparty\""
        );
        let back: Taxonomy = serde_json::from_str("\"native\"").unwrap();
        assert_eq!(back, Taxonomy::Native);
    }

    #[test]
    fn code_level_and_ancestor() {
        let code = ClassificationCode::new(Taxonomy::Native, "X500102");
        assert_eq!(code.level(), Some(3));
        assert_eq!(code.ancestor(1).unwrap().code, "X50");
    }
}
