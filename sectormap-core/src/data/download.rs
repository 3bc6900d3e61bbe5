//! HTTP downloader for the third-party classification archive.
//!
//! The publisher ships a RAR archive of Excel workbooks. Fetching it is a
//! three-step pipeline: download → extract → copy each workbook into the
//! target directory, where the loader reads it directly. Extraction shells
//! out to whichever of the known tools is installed.

use super::provider::{DataError, SourceDownloader};
use super::thirdparty::SourceLayout;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ARCHIVE_URL: &str =
    "https://www.swsresearch.com/swindex/pdf/SwClass2021/SwClass.rar";
const ARCHIVE_NAME: &str = "SwClass.rar";
const STAGING_DIR: &str = ".download";

/// Downloads and unpacks the classification archive over HTTP.
pub struct HttpArchiveDownloader {
    client: reqwest::blocking::Client,
    url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpArchiveDownloader {
    pub fn new() -> Result<Self, DataError> {
        Self::with_url(DEFAULT_ARCHIVE_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the archive bytes, retrying transient failures with backoff.
    fn download(&self) -> Result<Vec<u8>, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }

            match self.client.get(&self.url).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() {
                        let msg = format!("HTTP {status} for {}", self.url);
                        last_error = Some(DataError::Network(msg));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(DataError::Network(format!("HTTP {status} for {}", self.url)));
                    }
                    let bytes = resp
                        .bytes()
                        .map_err(|e| DataError::Network(format!("reading body: {e}")))?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::Network(e.to_string()));
                        continue;
                    }
                    return Err(DataError::Network(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Network("max retries exceeded".into())))
    }
}

impl SourceDownloader for HttpArchiveDownloader {
    fn name(&self) -> &str {
        "http_archive"
    }

    fn fetch(&self, target: &Path) -> Result<(), DataError> {
        fs::create_dir_all(target).map_err(|e| DataError::io(target, e))?;
        let staging = target.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| DataError::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| DataError::io(&staging, e))?;

        let result = self.fetch_into(target, &staging);

        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!("could not remove staging dir {}: {e}", staging.display());
        }
        result
    }
}

impl HttpArchiveDownloader {
    fn fetch_into(&self, target: &Path, staging: &Path) -> Result<(), DataError> {
        info!("downloading classification archive from {}", self.url);
        let bytes = self.download()?;
        let archive = staging.join(ARCHIVE_NAME);
        fs::write(&archive, &bytes).map_err(|e| DataError::io(&archive, e))?;
        debug!("wrote {} bytes to {}", bytes.len(), archive.display());

        let extracted = staging.join("extracted");
        fs::create_dir_all(&extracted).map_err(|e| DataError::io(&extracted, e))?;
        extract_archive(&archive, &extracted)?;

        let sheets = collect_sheets(&extracted)?;
        if sheets.is_empty() {
            return Err(DataError::Extraction(format!(
                "archive {} contained no spreadsheets",
                archive.display()
            )));
        }
        for sheet in &sheets {
            place_sheet(sheet, target)?;
        }

        if SourceLayout::detect(target).is_none() {
            return Err(DataError::MissingSource(target.to_path_buf()));
        }
        info!("classification sources refreshed in {}", target.display());
        Ok(())
    }
}

/// Run the first tool invocation that exits successfully.
fn run_first(candidates: Vec<Command>, what: &str) -> Result<(), String> {
    let mut failures = Vec::new();
    for mut cmd in candidates {
        let program = cmd.get_program().to_string_lossy().into_owned();
        match cmd.output() {
            Ok(out) if out.status.success() => {
                debug!("{what} succeeded with {program}");
                return Ok(());
            }
            Ok(out) => failures.push(format!("{program} exited with {}", out.status)),
            Err(e) => failures.push(format!("{program}: {e}")),
        }
    }
    Err(failures.join("; "))
}

fn extract_archive(archive: &Path, dest: &Path) -> Result<(), DataError> {
    let mut bsdtar = Command::new("bsdtar");
    bsdtar.arg("-xf").arg(archive).arg("-C").arg(dest);

    let mut unrar = Command::new("unrar");
    unrar.arg("x").arg("-y").arg(archive).arg(dest);

    run_first(vec![bsdtar, unrar], "extraction").map_err(DataError::Extraction)
}

/// Spreadsheet-like files below `dir`, recursively, in path order.
fn collect_sheets(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = fs::read_dir(&current).map_err(|e| DataError::io(&current, e))?;
        for entry in entries {
            let path = entry.map_err(|e| DataError::io(&current, e))?.path();
            if path.is_dir() {
                pending.push(path);
            } else if is_sheet(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn is_sheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "xls" | "xlsx" | "csv"))
}

/// Copy `sheet` into `target_dir` under its own file name.
fn place_sheet(sheet: &Path, target_dir: &Path) -> Result<(), DataError> {
    let name = sheet
        .file_name()
        .ok_or_else(|| DataError::Extraction(format!("unnamed file {}", sheet.display())))?;
    let out = target_dir.join(name);
    fs::copy(sheet, &out).map_err(|e| DataError::io(&out, e))?;
    debug!("placed {}", out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheets_are_found_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("SwClass");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("StockClassifyUse_stock.xls"), b"").unwrap();
        fs::write(nested.join("SwClassCode_2021.XLSX"), b"").unwrap();
        fs::write(nested.join("readme.txt"), b"").unwrap();

        let sheets = collect_sheets(dir.path()).unwrap();
        assert_eq!(sheets.len(), 2);
        assert!(sheets.iter().all(|p| is_sheet(p)));
    }

    #[test]
    fn sheets_are_copied_verbatim() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let sheet = src.path().join("SwClassCode_2021.xls");
        fs::write(&sheet, b"\xd0\xcf\x11\xe0").unwrap();

        place_sheet(&sheet, dst.path()).unwrap();
        let copied = fs::read(dst.path().join("SwClassCode_2021.xls")).unwrap();
        assert_eq!(copied, b"\xd0\xcf\x11\xe0");
    }

    #[test]
    fn missing_tools_report_every_attempt() {
        let err = run_first(
            vec![
                Command::new("sectormap-no-such-tool-a"),
                Command::new("sectormap-no-such-tool-b"),
            ],
            "extraction",
        )
        .unwrap_err();
        assert!(err.contains("sectormap-no-such-tool-a"));
        assert!(err.contains("sectormap-no-such-tool-b"));
    }

    #[test]
    fn client_builds_with_custom_url() {
        let dl = HttpArchiveDownloader::with_url("http://127.0.0.1:1/SwClass.rar").unwrap();
        assert_eq!(dl.url(), "http://127.0.0.1:1/SwClass.rar");
        assert_eq!(dl.name(), "http_archive");
    }
}
