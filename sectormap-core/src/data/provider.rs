//! Source downloader trait and structured data-layer errors.
//!
//! The `SourceDownloader` trait abstracts over how the third-party
//! classification files reach the cache directory (HTTP archive, manual copy,
//! test doubles). The cache gate sits above this trait; downloaders don't
//! know about freshness or fallback locations.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output and log lines alike.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {file}: {reason}")]
    Table { file: String, reason: String },

    #[error("{file} is missing required column '{column}'")]
    MissingColumn { file: String, column: String },

    #[error("no classification source files in {0}")]
    MissingSource(PathBuf),

    #[error("network error: {0}")]
    Network(String),

    #[error("archive extraction failed: {0}")]
    Extraction(String),
}

impl DataError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Fetches third-party classification files into a directory.
pub trait SourceDownloader: Send + Sync {
    /// Human-readable name of this downloader.
    fn name(&self) -> &str;

    /// Populate `target` with the classification source files.
    fn fetch(&self, target: &Path) -> Result<(), DataError>;
}

/// Downloader used when network access is disabled.
pub struct NoopDownloader;

impl SourceDownloader for NoopDownloader {
    fn name(&self) -> &str {
        "noop"
    }

    fn fetch(&self, target: &Path) -> Result<(), DataError> {
        Err(DataError::Network(format!(
            "downloads disabled, not fetching into {}",
            target.display()
        )))
    }
}
