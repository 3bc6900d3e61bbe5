//! Cache gate for the third-party classification source.
//!
//! Decides whether the user cache must be refreshed before loading, and
//! which directory the loader should read from:
//!
//! - Without `force_update`, a bundled snapshot is preferred and used as-is
//!   (a stale snapshot only produces a warning). Failing that, the cache is
//!   refreshed when its files are missing or older than `max_age_days`.
//! - With `force_update`, the cache is always refreshed and preferred over
//!   the bundled snapshot.
//! - Download failures are warnings. Only the absence of usable files in
//!   every candidate location is fatal.

use super::provider::{DataError, SourceDownloader};
use super::thirdparty::SourceLayout;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_AGE_DAYS: u64 = 90;
const SECS_PER_DAY: u64 = 86_400;

/// Fatal construction-time failures.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error(
        "classification source not found (searched cache dir {}, bundled dir {})",
        cache_dir.display(),
        bundled_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_else(|| "<none>".into())
    )]
    SourceNotFound {
        cache_dir: PathBuf,
        bundled_dir: Option<PathBuf>,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Freshness policy for the user cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub force_update: bool,
    pub max_age_days: u64,
    pub auto_download: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            force_update: false,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            auto_download: true,
        }
    }
}

/// Why a refresh was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Forced,
    Missing,
    Expired { age_days: u64 },
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshReason::Forced => write!(f, "update forced"),
            RefreshReason::Missing => write!(f, "source files missing"),
            RefreshReason::Expired { age_days } => write!(f, "source is {age_days} days old"),
        }
    }
}

impl FreshnessPolicy {
    /// Evaluate the policy against `dir` at time `now`. `None` means the
    /// directory can be used without refreshing.
    pub fn refresh_reason(&self, dir: &Path, now: SystemTime) -> Option<RefreshReason> {
        if self.force_update {
            return Some(RefreshReason::Forced);
        }
        let Some(layout) = SourceLayout::detect(dir) else {
            return Some(RefreshReason::Missing);
        };
        self.expiry(layout.primary(), now)
    }

    /// `Some(Expired)` when `file` is older than `max_age_days`.
    fn expiry(&self, file: &Path, now: SystemTime) -> Option<RefreshReason> {
        let Ok(mtime) = fs::metadata(file).and_then(|m| m.modified()) else {
            return Some(RefreshReason::Missing);
        };
        let age = now.duration_since(mtime).unwrap_or(Duration::ZERO);
        if age > Duration::from_secs(self.max_age_days.saturating_mul(SECS_PER_DAY)) {
            Some(RefreshReason::Expired {
                age_days: age.as_secs() / SECS_PER_DAY,
            })
        } else {
            None
        }
    }
}

/// Where the chosen source files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    Bundled,
    Cache,
}

/// Result of running the gate.
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub dir: PathBuf,
    pub layout: SourceLayout,
    pub origin: SourceOrigin,
    /// Whether a download into the cache succeeded during this run.
    pub refreshed: bool,
}

pub struct CacheGate<'a> {
    cache_dir: PathBuf,
    bundled_dir: Option<PathBuf>,
    policy: FreshnessPolicy,
    downloader: &'a dyn SourceDownloader,
}

impl<'a> CacheGate<'a> {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        bundled_dir: Option<PathBuf>,
        policy: FreshnessPolicy,
        downloader: &'a dyn SourceDownloader,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            bundled_dir,
            policy,
            downloader,
        }
    }

    pub fn prepare(&self) -> Result<GateOutcome, ClassificationError> {
        self.prepare_at(SystemTime::now())
    }

    /// Run the gate as of `now`.
    pub fn prepare_at(&self, now: SystemTime) -> Result<GateOutcome, ClassificationError> {
        if !self.policy.force_update {
            if let Some(outcome) = self.bundled(now) {
                return Ok(outcome);
            }
        }

        let mut refreshed = false;
        if let Some(reason) = self.policy.refresh_reason(&self.cache_dir, now) {
            refreshed = self.refresh(reason);
        }

        if let Some(layout) = SourceLayout::detect(&self.cache_dir) {
            if !refreshed {
                if let Some(RefreshReason::Expired { age_days }) =
                    self.policy.expiry(layout.primary(), now)
                {
                    warn!(
                        "using stale classification cache ({age_days} days old) in {}",
                        self.cache_dir.display()
                    );
                }
            }
            return Ok(GateOutcome {
                dir: self.cache_dir.clone(),
                layout,
                origin: SourceOrigin::Cache,
                refreshed,
            });
        }

        if self.policy.force_update {
            if let Some(outcome) = self.bundled(now) {
                warn!("refreshed cache unusable, falling back to bundled snapshot");
                return Ok(outcome);
            }
        }

        Err(ClassificationError::SourceNotFound {
            cache_dir: self.cache_dir.clone(),
            bundled_dir: self.bundled_dir.clone(),
        })
    }

    fn bundled(&self, now: SystemTime) -> Option<GateOutcome> {
        let dir = self.bundled_dir.as_ref()?;
        let layout = SourceLayout::detect(dir)?;
        if let Some(RefreshReason::Expired { age_days }) = self.policy.expiry(layout.primary(), now)
        {
            warn!(
                "bundled classification snapshot is {age_days} days old ({})",
                dir.display()
            );
        }
        Some(GateOutcome {
            dir: dir.clone(),
            layout,
            origin: SourceOrigin::Bundled,
            refreshed: false,
        })
    }

    /// Invoke the downloader; failures are reported, never raised.
    fn refresh(&self, reason: RefreshReason) -> bool {
        if !self.policy.auto_download {
            warn!(
                "classification cache needs refresh ({reason}) but downloads are disabled"
            );
            return false;
        }
        info!(
            "refreshing classification cache in {} ({reason}) via {}",
            self.cache_dir.display(),
            self.downloader.name()
        );
        match self.downloader.fetch(&self.cache_dir) {
            Ok(()) => true,
            Err(e) => {
                warn!("classification download failed: {e}");
                false
            }
        }
    }
}
