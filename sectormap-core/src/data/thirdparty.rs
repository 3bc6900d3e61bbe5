//! Third-party (SWS 2021) classification source.
//!
//! Two layouts are accepted. Each file may be the published workbook
//! (`.xls`/`.xlsx`, first worksheet) or a CSV export of it (UTF-8 or GBK):
//!
//! - **Merged**: `StockClassifyUse_stock*` (stock → code assignments with
//!   an assignment date, one row per re-classification) joined against
//!   `SwClassCode*` (code → level-1/2/3 names).
//! - **Legacy**: a single `*个股申万行业分类*` carrying stock codes with
//!   exchange suffixes and the level names inline.
//!
//! Pipeline: normalize stock codes → keep the latest assignment per stock →
//! left-join names by classification code → substitute the
//! no-sub-classification sentinel for missing level-2 names.

use super::decode::{decode_permissive, non_empty, pad_stock_code, strip_exchange_suffix};
use super::manifest::{ManifestBuilder, SourceManifest};
use super::provider::DataError;
use crate::taxonomy::grammar::code_at_level;
use crate::taxonomy::{
    ClassificationCode, LevelRecord, StockRecord, Taxonomy, TaxonomyTable, NO_SUBCLASSIFICATION,
};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ASSIGNMENT_FILE_MARKER: &str = "StockClassifyUse_stock";
pub const HIERARCHY_FILE_MARKER: &str = "SwClassCode";
pub const LEGACY_FILE_MARKER: &str = "个股申万行业分类";

const STOCK_CODE_COLS: &[&str] = &["股票代码", "证券代码", "stock_code"];
const DATE_COLS: &[&str] = &["计入日期", "assignment_date", "as_of_date"];
const CODE_COLS: &[&str] = &["行业代码", "classification_code", "industry_code"];
const NAME_COLS: &[&str] = &["公司简称", "股票简称", "stock_name"];
const L1_COLS: &[&str] = &["一级行业名称", "新版一级行业", "level1_name", "l1_name"];
const L2_COLS: &[&str] = &["二级行业名称", "新版二级行业", "level2_name", "l2_name"];
const L3_COLS: &[&str] = &["三级行业名称", "新版三级行业", "level3_name", "l3_name"];

/// Which files make up a third-party source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLayout {
    Merged {
        assignments: PathBuf,
        hierarchy: PathBuf,
    },
    Legacy {
        path: PathBuf,
    },
}

impl SourceLayout {
    /// Inspect `dir` for source files. The merged layout wins when both are
    /// present; for each file, a workbook wins over a CSV export.
    pub fn detect(dir: &Path) -> Option<SourceLayout> {
        let files = source_files(dir);
        let find = |marker: &str| files.iter().find(|p| file_name_contains(p, marker)).cloned();

        if let (Some(assignments), Some(hierarchy)) =
            (find(ASSIGNMENT_FILE_MARKER), find(HIERARCHY_FILE_MARKER))
        {
            return Some(SourceLayout::Merged {
                assignments,
                hierarchy,
            });
        }
        find(LEGACY_FILE_MARKER).map(|path| SourceLayout::Legacy { path })
    }

    /// The file whose modification time decides freshness.
    pub fn primary(&self) -> &Path {
        match self {
            SourceLayout::Merged { assignments, .. } => assignments,
            SourceLayout::Legacy { path } => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SheetFormat {
    Workbook,
    Csv,
}

impl SheetFormat {
    fn of(path: &Path) -> Option<SheetFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xls" => Some(SheetFormat::Workbook),
            "csv" => Some(SheetFormat::Csv),
            _ => None,
        }
    }
}

/// Readable source files in `dir`, workbooks first, then by path.
fn source_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(SheetFormat, PathBuf)> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter_map(|p| SheetFormat::of(&p).map(|f| (f, p)))
        .collect();
    files.sort();
    files.into_iter().map(|(_, p)| p).collect()
}

fn file_name_contains(path: &Path, marker: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(marker))
}

/// One stock → code assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRow {
    pub stock_code: String,
    pub as_of_date: Option<NaiveDate>,
    pub classification_code: String,
    pub stock_name: Option<String>,
}

/// One code → names row of the hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRow {
    pub classification_code: String,
    pub level1_name: Option<String>,
    pub level2_name: Option<String>,
    pub level3_name: Option<String>,
}

/// A header row plus data rows, from either a CSV export or a workbook.
struct Sheet {
    file: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn from_csv(file: &str, text: &str) -> Result<Self, DataError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let headers = reader
            .headers()
            .map_err(|e| DataError::Table {
                file: file.to_string(),
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            match record {
                Ok(r) => rows.push(r.iter().map(str::to_string).collect()),
                Err(e) => warn!("{file}: skipping unreadable row {}: {e}", i + 1),
            }
        }
        Ok(Self {
            file: file.to_string(),
            headers,
            rows,
        })
    }

    /// Read the first worksheet of an `.xls`/`.xlsx` workbook. The first
    /// non-blank row is the header.
    fn from_workbook(file: &str, bytes: Vec<u8>) -> Result<Self, DataError> {
        let table_error = |reason: String| DataError::Table {
            file: file.to_string(),
            reason,
        };
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| table_error(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| table_error("workbook has no worksheets".into()))?
            .map_err(|e| table_error(e.to_string()))?;

        let mut rows = range
            .rows()
            .map(|cells| cells.iter().map(cell_text).collect::<Vec<_>>())
            .skip_while(|cells| cells.iter().all(String::is_empty));
        let headers = rows
            .next()
            .ok_or_else(|| table_error("worksheet is empty".into()))?;
        Ok(Self {
            file: file.to_string(),
            headers,
            rows: rows
                .filter(|cells| cells.iter().any(|c| !c.is_empty()))
                .collect(),
        })
    }

    fn column(&self, aliases: &[&str]) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| aliases.iter().any(|a| h.trim() == *a))
    }

    fn require(&self, aliases: &[&str]) -> Result<usize, DataError> {
        self.column(aliases).ok_or_else(|| DataError::MissingColumn {
            file: self.file.clone(),
            column: aliases.last().copied().unwrap_or_default().to_string(),
        })
    }
}

/// Text form of a workbook cell. Whole numbers print without a fraction so
/// numeric codes read like their CSV counterparts.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn field(row: &[String], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i)).and_then(|v| non_empty(v))
}

/// Classification codes exported from spreadsheets may carry a float tail.
fn clean_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    non_empty(trimmed.strip_suffix(".0").unwrap_or(trimmed))
}

/// Parse an assignment date. Accepts `2021-07-30`, `2021/7/30`, `20210730`
/// and any of those followed by a time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split_whitespace().next()?;
    let day = day.split('T').next()?;
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%Y.%m.%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

fn cell<'r>(row: &'r [String], idx: usize) -> Option<&'r str> {
    row.get(idx).map(String::as_str)
}

/// Parse the merged-format assignment table from CSV text.
pub fn parse_assignments(file: &str, text: &str) -> Result<Vec<AssignmentRow>, DataError> {
    assignments_from(&Sheet::from_csv(file, text)?)
}

/// Parse the code → names hierarchy table from CSV text.
pub fn parse_hierarchy(file: &str, text: &str) -> Result<Vec<HierarchyRow>, DataError> {
    hierarchy_from(&Sheet::from_csv(file, text)?)
}

/// Parse the legacy single-file format from CSV text into assignments plus
/// the hierarchy rows implied by its inline level names.
pub fn parse_legacy(
    file: &str,
    text: &str,
) -> Result<(Vec<AssignmentRow>, Vec<HierarchyRow>), DataError> {
    legacy_from(&Sheet::from_csv(file, text)?)
}

fn assignments_from(sheet: &Sheet) -> Result<Vec<AssignmentRow>, DataError> {
    let file = &sheet.file;
    let code_col = sheet.require(STOCK_CODE_COLS)?;
    let class_col = sheet.require(CODE_COLS)?;
    let date_col = sheet.column(DATE_COLS);
    let name_col = sheet.column(NAME_COLS);

    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        let stock_code = cell(row, code_col).and_then(pad_stock_code);
        let class_code = cell(row, class_col).and_then(clean_code);
        let (Some(stock_code), Some(classification_code)) = (stock_code, class_code) else {
            warn!("{file}: row {} lacks stock or classification code, skipped", i + 1);
            continue;
        };
        rows.push(AssignmentRow {
            stock_code,
            as_of_date: field(row, date_col).as_deref().and_then(parse_date),
            classification_code,
            stock_name: field(row, name_col),
        });
    }
    Ok(rows)
}

fn hierarchy_from(sheet: &Sheet) -> Result<Vec<HierarchyRow>, DataError> {
    let class_col = sheet.require(CODE_COLS)?;
    let l1 = Some(sheet.require(L1_COLS)?);
    let l2 = Some(sheet.require(L2_COLS)?);
    let l3 = sheet.column(L3_COLS);

    let mut rows = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        let Some(classification_code) = cell(row, class_col).and_then(clean_code) else {
            warn!("{}: hierarchy row {} without code, skipped", sheet.file, i + 1);
            continue;
        };
        rows.push(HierarchyRow {
            classification_code,
            level1_name: field(row, l1),
            level2_name: field(row, l2),
            level3_name: field(row, l3),
        });
    }
    Ok(rows)
}

fn legacy_from(sheet: &Sheet) -> Result<(Vec<AssignmentRow>, Vec<HierarchyRow>), DataError> {
    let file = &sheet.file;
    let code_col = sheet.require(STOCK_CODE_COLS)?;
    let class_col = sheet.require(CODE_COLS)?;
    let name_col = sheet.column(NAME_COLS);
    let date_col = sheet.column(DATE_COLS);
    let (l1, l2, l3) = (
        sheet.column(L1_COLS),
        sheet.column(L2_COLS),
        sheet.column(L3_COLS),
    );

    let mut assignments = Vec::with_capacity(sheet.rows.len());
    let mut hierarchy = Vec::with_capacity(sheet.rows.len());
    for (i, row) in sheet.rows.iter().enumerate() {
        let stock_code = cell(row, code_col).and_then(strip_exchange_suffix);
        let class_code = cell(row, class_col).and_then(clean_code);
        let (Some(stock_code), Some(classification_code)) = (stock_code, class_code) else {
            warn!("{file}: row {} lacks stock or classification code, skipped", i + 1);
            continue;
        };
        hierarchy.push(HierarchyRow {
            classification_code: classification_code.clone(),
            level1_name: field(row, l1),
            level2_name: field(row, l2),
            level3_name: field(row, l3),
        });
        assignments.push(AssignmentRow {
            stock_code,
            as_of_date: field(row, date_col).as_deref().and_then(parse_date),
            classification_code,
            stock_name: field(row, name_col),
        });
    }
    Ok((assignments, hierarchy))
}

/// Keep exactly one assignment per stock: the one with the latest date.
///
/// Rows are stable-sorted ascending by date (undated rows first) and the
/// last row per stock wins, so ties resolve to the later row in the file.
pub fn latest_assignments(mut rows: Vec<AssignmentRow>) -> Vec<AssignmentRow> {
    rows.sort_by_key(|r| r.as_of_date);
    let mut latest: BTreeMap<String, AssignmentRow> = BTreeMap::new();
    for row in rows {
        latest.insert(row.stock_code.clone(), row);
    }
    latest.into_values().collect()
}

fn node(code: String, name: &str, level: u8) -> LevelRecord {
    LevelRecord {
        code: ClassificationCode::new(Taxonomy::ThirdParty, code),
        name: name.to_string(),
        level,
        block_code: None,
    }
}

/// Join deduplicated assignments against the hierarchy into a table.
///
/// Names missing from the assignment rows are filled from `names` (the
/// native stock-name mapping) when one is supplied.
pub fn build_table(
    assignments: Vec<AssignmentRow>,
    hierarchy: &[HierarchyRow],
    names: Option<&HashMap<String, String>>,
) -> TaxonomyTable {
    let mut table = TaxonomyTable::new(Taxonomy::ThirdParty);

    let mut by_code: HashMap<&str, &HierarchyRow> = HashMap::new();
    for row in hierarchy {
        by_code.entry(row.classification_code.as_str()).or_insert(row);

        let levels = [
            (1, row.level1_name.as_deref()),
            (2, row.level2_name.as_deref()),
            (3, row.level3_name.as_deref()),
        ];
        for (level, name) in levels {
            let code = code_at_level(Taxonomy::ThirdParty, &row.classification_code, level);
            let (Some(name), Some(code)) = (name, code) else {
                continue;
            };
            table.insert_node(node(code, name, level));
        }
    }

    for row in latest_assignments(assignments) {
        let joined = by_code.get(row.classification_code.as_str());
        if joined.is_none() {
            debug!(
                "stock {} code {} not in hierarchy table",
                row.stock_code, row.classification_code
            );
        }

        let mut stock = StockRecord::new(row.stock_code.clone());
        stock.stock_name = row
            .stock_name
            .or_else(|| names.and_then(|n| n.get(&row.stock_code).cloned()));
        stock.as_of_date = row.as_of_date;
        stock.level_names = [
            None,
            joined.and_then(|h| h.level1_name.clone()),
            Some(
                joined
                    .and_then(|h| h.level2_name.clone())
                    .unwrap_or_else(|| NO_SUBCLASSIFICATION.to_string()),
            ),
            joined.and_then(|h| h.level3_name.clone()),
        ];
        stock.codes = vec![ClassificationCode::new(
            Taxonomy::ThirdParty,
            row.classification_code,
        )];
        table.insert_stock(stock);
    }
    table
}

/// Loaded third-party data.
#[derive(Debug, Clone)]
pub struct ThirdPartyData {
    pub table: TaxonomyTable,
    pub manifest: SourceManifest,
}

/// Read `path` as a workbook or CSV export, recording it in the manifest.
fn read_sheet(path: &Path, manifest: &mut ManifestBuilder) -> Result<Sheet, DataError> {
    let bytes = fs::read(path).map_err(|e| DataError::io(path, e))?;
    manifest.add(path, &bytes);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match SheetFormat::of(path) {
        Some(SheetFormat::Workbook) => Sheet::from_workbook(&name, bytes),
        _ => Sheet::from_csv(&name, &decode_permissive(&bytes)),
    }
}

/// Load the third-party table from the files `layout` names. `dir` is
/// recorded in the manifest as the source directory.
pub fn load_third_party(
    dir: &Path,
    layout: &SourceLayout,
    names: Option<&HashMap<String, String>>,
) -> Result<ThirdPartyData, DataError> {
    let mut manifest = ManifestBuilder::new(Taxonomy::ThirdParty, dir);

    let (assignments, hierarchy) = match layout {
        SourceLayout::Merged {
            assignments,
            hierarchy,
        } => {
            let assignments = read_sheet(assignments, &mut manifest)?;
            let hierarchy = read_sheet(hierarchy, &mut manifest)?;
            (assignments_from(&assignments)?, hierarchy_from(&hierarchy)?)
        }
        SourceLayout::Legacy { path } => legacy_from(&read_sheet(path, &mut manifest)?)?,
    };

    let raw_rows = assignments.len();
    let table = build_table(assignments, &hierarchy, names);
    info!(
        rows = raw_rows,
        stocks = table.stock_count(),
        nodes = table.node_count(),
        "loaded third-party classification from {}",
        dir.display()
    );

    Ok(ThirdPartyData {
        manifest: manifest.finish(&table),
        table,
    })
}
