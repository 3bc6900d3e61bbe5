//! Native (TDX) classification source.
//!
//! Layout under the TDX install directory:
//!
//! ```text
//! {tdx_dir}/T0002/hq_cache/
//!     tdxzs3.cfg            name|block_code|flag|flag|flag|classification_code
//!     tdxhy.cfg             market|stock_code|T-code|...|...|X-code
//!     infoharbor_ex.code    stock_code|stock_name|...
//!     infoharbor_block.dat  #TYPE_name,count,code  followed by market#code,...
//! ```
//!
//! Every file is optional. A missing or unreadable file contributes nothing
//! and the resulting table may be empty; callers treat an empty table as
//! "no data available".

use super::decode::{decode_permissive, non_empty, read_optional, strip_name_spaces};
use super::manifest::{ManifestBuilder, SourceManifest};
use crate::taxonomy::grammar::level_of;
use crate::taxonomy::{
    Block, BlockStock, ClassificationCode, LevelRecord, StockRecord, Taxonomy, TaxonomyTable,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const HQ_CACHE_SUBDIR: &str = "T0002/hq_cache";
pub const INDUSTRY_CONFIG: &str = "tdxzs3.cfg";
pub const STOCK_INDUSTRY_MAP: &str = "tdxhy.cfg";
pub const STOCK_NAME_MAP: &str = "infoharbor_ex.code";
pub const CONCEPT_BLOCKS: &str = "infoharbor_block.dat";

/// One line of `tdxhy.cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAssignment {
    pub stock_code: String,
    pub primary: Option<String>,
    pub alternate: Option<String>,
}

impl NativeAssignment {
    /// Non-empty codes, primary numbering first.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.primary.iter().chain(self.alternate.iter()).map(String::as_str)
    }
}

/// Everything loaded from a TDX install.
#[derive(Debug, Clone)]
pub struct NativeData {
    pub table: TaxonomyTable,
    pub names: HashMap<String, String>,
    pub concepts: Vec<Block>,
    pub manifest: SourceManifest,
}

/// Path to the `hq_cache` directory of a TDX install.
pub fn hq_cache_dir(tdx_dir: &Path) -> PathBuf {
    tdx_dir.join(HQ_CACHE_SUBDIR)
}

/// Parse `tdxzs3.cfg` into level records. Lines with fewer than six fields
/// and records whose classification code fails the grammar are dropped.
pub fn parse_industry_config(text: &str) -> Vec<LevelRecord> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 6 {
            debug!("skipping short industry config line: {line}");
            continue;
        }
        let code = parts[5].trim();
        let Some(level) = level_of(Taxonomy::Native, code) else {
            continue;
        };
        records.push(LevelRecord {
            code: ClassificationCode::new(Taxonomy::Native, code),
            name: parts[0].trim().to_string(),
            level,
            block_code: non_empty(parts[1]),
        });
    }
    records
}

/// Parse `infoharbor_ex.code` into `stock_code -> stock_name`.
pub fn parse_stock_names(text: &str) -> HashMap<String, String> {
    let mut names = HashMap::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 2 {
            warn!("{STOCK_NAME_MAP} line {line_num} malformed: {line}");
            continue;
        }
        let code = parts[0].trim();
        if code.is_empty() {
            continue;
        }
        names
            .entry(code.to_string())
            .or_insert_with(|| strip_name_spaces(parts[1].trim()));
    }
    names
}

/// Parse `tdxhy.cfg`. A line carrying neither a primary nor an alternate
/// code is dropped.
pub fn parse_stock_industries(text: &str) -> Vec<NativeAssignment> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('|').collect();
        if parts.len() < 3 {
            debug!("skipping short stock industry line: {line}");
            continue;
        }
        let Some(stock_code) = non_empty(parts[1]) else {
            warn!("{STOCK_INDUSTRY_MAP} line without stock code: {line}");
            continue;
        };
        let primary = non_empty(parts[2]);
        let alternate = parts.get(5).and_then(|p| non_empty(p));
        if primary.is_none() && alternate.is_none() {
            debug!("stock {stock_code} has no industry code, dropped");
            continue;
        }
        rows.push(NativeAssignment {
            stock_code,
            primary,
            alternate,
        });
    }
    rows
}

/// Parse `infoharbor_block.dat` into concept blocks, naming members from
/// `names`.
pub fn parse_concept_blocks(text: &str, names: &HashMap<String, String>) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut in_block = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('#') {
            let parts: Vec<&str> = header.trim_start_matches('#').split(',').collect();
            let Some((kind, name)) = parts[0].split_once('_') else {
                warn!("{CONCEPT_BLOCKS} header without type prefix: {line}");
                in_block = false;
                continue;
            };
            blocks.push(Block {
                concept_name: name.to_string(),
                concept_code: parts.get(2).map(|c| c.trim().to_string()).unwrap_or_default(),
                concept_type: kind.to_string(),
                stocks: Vec::new(),
            });
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        let Some(block) = blocks.last_mut() else {
            continue;
        };
        for item in line.split(',') {
            let Some((_market, code)) = item.split_once('#') else {
                continue;
            };
            let code = code.trim();
            if code.is_empty() {
                continue;
            }
            block.stocks.push(BlockStock {
                stock_code: code.to_string(),
                stock_name: names.get(code).cloned(),
            });
        }
    }
    blocks
}

/// Assemble the native table from parsed parts.
pub fn build_table(
    records: Vec<LevelRecord>,
    assignments: Vec<NativeAssignment>,
    names: &HashMap<String, String>,
) -> TaxonomyTable {
    let mut table = TaxonomyTable::new(Taxonomy::Native);
    for record in records {
        table.insert_node(record);
    }
    for row in assignments {
        let mut stock = StockRecord::new(row.stock_code.clone());
        stock.stock_name = names.get(&row.stock_code).cloned();
        stock.codes = row
            .codes()
            .map(|c| ClassificationCode::new(Taxonomy::Native, c))
            .collect();
        if !table.insert_stock(stock) {
            debug!("duplicate stock {} in {STOCK_INDUSTRY_MAP}, keeping first", row.stock_code);
        }
    }
    table
}

/// Load every native source file under `tdx_dir`. Never fails: unreadable
/// files are logged and treated as absent.
pub fn load_native(tdx_dir: &Path) -> NativeData {
    let dir = hq_cache_dir(tdx_dir);
    let mut manifest = ManifestBuilder::new(Taxonomy::Native, &dir);

    let mut read = |file: &str| -> Option<String> {
        let path = dir.join(file);
        match read_optional(&path) {
            Ok(Some(bytes)) => {
                manifest.add(&path, &bytes);
                Some(decode_permissive(&bytes))
            }
            Ok(None) => {
                debug!("native source {} not present", path.display());
                None
            }
            Err(e) => {
                warn!("failed to read native source: {e}");
                None
            }
        }
    };

    let records = read(INDUSTRY_CONFIG)
        .map(|t| parse_industry_config(&t))
        .unwrap_or_default();
    let assignments = read(STOCK_INDUSTRY_MAP)
        .map(|t| parse_stock_industries(&t))
        .unwrap_or_default();
    let names = read(STOCK_NAME_MAP)
        .map(|t| parse_stock_names(&t))
        .unwrap_or_default();
    let concepts = read(CONCEPT_BLOCKS)
        .map(|t| parse_concept_blocks(&t, &names))
        .unwrap_or_default();

    let table = build_table(records, assignments, &names);
    if table.is_empty() {
        warn!("no native classification data under {}", dir.display());
    } else {
        info!(
            nodes = table.node_count(),
            stocks = table.stock_count(),
            "loaded native classification from {}",
            dir.display()
        );
    }

    NativeData {
        manifest: manifest.finish(&table),
        table,
        names,
        concepts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "\
金融|880470|0|1|1|T10
银行|880471|1|1|1|T1001
证券|880472|1|1|1|T1002
券商II|880473|2|1|1|T100201
申万银行|881001|1|1|1|X48
股份制银行|881002|2|1|1|X4803
股份制银行III|881003|3|1|1|X480301
概念装饰行|880999|1|1|1|GN01
短行|880998|1
";

    #[test]
    fn industry_config_keeps_only_grammar_codes() {
        let recs = parse_industry_config(CONFIG);
        assert_eq!(recs.len(), 7);
        assert!(recs.iter().all(|r| r.code.code.starts_with(['T', 'X'])));
        let bank = recs.iter().find(|r| r.code.code == "T1001").unwrap();
        assert_eq!(bank.name, "银行");
        assert_eq!(bank.level, 1);
        assert_eq!(bank.block_code.as_deref(), Some("880471"));
        let x3 = recs.iter().find(|r| r.code.code == "X480301").unwrap();
        assert_eq!(x3.level, 3);
    }

    #[test]
    fn stock_names_strip_spaces_and_skip_malformed() {
        let text = "000001|平安 银行|平安保险\nbroken\n600000|浦发\u{3000}银行\n";
        let names = parse_stock_names(text);
        assert_eq!(names.len(), 2);
        assert_eq!(names["000001"], "平安银行");
        assert_eq!(names["600000"], "浦发银行");
    }

    #[test]
    fn stock_industries_need_some_code() {
        let rows = parse_stock_industries(
            "0|000001|T1001|||X480301\n1|600000|||\n1|600036|T1001\n0|000002\n",
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].primary.as_deref(), Some("T1001"));
        assert_eq!(rows[0].alternate.as_deref(), Some("X480301"));
        assert_eq!(rows[1].stock_code, "600036");
        assert_eq!(rows[1].alternate, None);
    }

    #[test]
    fn concept_blocks_parse_headers_and_members() {
        let names: HashMap<String, String> =
            [("600000".to_string(), "浦发银行".to_string())].into();
        let text = "#GN_银行概念,2,880901\n1#600000,0#000001\n#FG_高股息,1,880902\n1#600036\n";
        let blocks = parse_concept_blocks(text, &names);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].concept_type, "GN");
        assert_eq!(blocks[0].concept_name, "银行概念");
        assert_eq!(blocks[0].concept_code, "880901");
        assert_eq!(blocks[0].stocks.len(), 2);
        assert_eq!(blocks[0].stocks[0].stock_name.as_deref(), Some("浦发银行"));
        assert_eq!(blocks[0].stocks[1].stock_name, None);
        assert_eq!(blocks[1].stocks[0].stock_code, "600036");
    }

    #[test]
    fn missing_install_yields_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let data = load_native(dir.path());
        assert!(data.table.is_empty());
        assert!(data.concepts.is_empty());
        assert!(data.manifest.files.is_empty());
    }
}
