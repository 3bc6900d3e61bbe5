//! Resolver configuration.
//!
//! Directories are resolved once, explicitly, by [`ResolverConfig::discover`]
//! or read from a TOML file. Keys missing from the file take the defaults
//! below.

use crate::data::cache::{FreshnessPolicy, DEFAULT_MAX_AGE_DAYS};
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the TDX install directory.
pub const TDX_DIR_ENV: &str = "TDXDIR";
const WINDOWS_TDX_DIR: &str = "C:/new_tdx";
const HOME_SUBDIR: &str = ".kitetdx";
const BUNDLED_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data/sws");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config lists no taxonomies")]
    NoTaxonomies,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// TDX install directory (contains `T0002/hq_cache`).
    pub tdx_dir: PathBuf,

    /// User cache for the third-party source files.
    pub cache_dir: PathBuf,

    /// Read-only snapshot shipped with the crate.
    pub bundled_dir: Option<PathBuf>,

    pub max_age_days: u64,
    pub force_update: bool,
    pub auto_download: bool,

    /// Taxonomies to load at build time.
    pub taxonomies: Vec<Taxonomy>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let home = home_root();
        Self {
            tdx_dir: home.join("tdx"),
            cache_dir: home.join("cache"),
            bundled_dir: Some(PathBuf::from(BUNDLED_DIR)),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            force_update: false,
            auto_download: true,
            taxonomies: Taxonomy::ALL.to_vec(),
        }
    }
}

impl ResolverConfig {
    /// Resolve default directories from the environment.
    ///
    /// TDX directory: `$TDXDIR`, then `C:/new_tdx` when it exists, then
    /// `~/.kitetdx/tdx`.
    pub fn discover() -> Self {
        let env_dir = std::env::var_os(TDX_DIR_ENV).map(PathBuf::from);
        let windows_dir = Path::new(WINDOWS_TDX_DIR);
        let windows_dir = windows_dir.is_dir().then(|| windows_dir.to_path_buf());

        let mut config = Self::default();
        if let Some(dir) = choose_tdx_dir(env_dir, windows_dir) {
            config.tdx_dir = dir;
        }
        config
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.taxonomies.is_empty() {
            return Err(ConfigError::NoTaxonomies);
        }
        Ok(config)
    }

    pub fn freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            force_update: self.force_update,
            max_age_days: self.max_age_days,
            auto_download: self.auto_download,
        }
    }

    pub fn loads(&self, taxonomy: Taxonomy) -> bool {
        self.taxonomies.contains(&taxonomy)
    }
}

fn home_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(HOME_SUBDIR)
}

fn choose_tdx_dir(env_dir: Option<PathBuf>, windows_dir: Option<PathBuf>) -> Option<PathBuf> {
    env_dir.filter(|d| !d.as_os_str().is_empty()).or(windows_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config = ResolverConfig::from_toml("tdx_dir = \"/opt/tdx\"\n").unwrap();
        assert_eq!(config.tdx_dir, PathBuf::from("/opt/tdx"));
        assert_eq!(config.max_age_days, 90);
        assert!(config.auto_download);
        assert!(!config.force_update);
        assert_eq!(config.taxonomies, vec![Taxonomy::Native, Taxonomy::ThirdParty]);
    }

    #[test]
    fn taxonomies_parse_lowercase() {
        let config = ResolverConfig::from_toml("taxonomies = [\"thirdparty\"]\n").unwrap();
        assert!(config.loads(Taxonomy::ThirdParty));
        assert!(!config.loads(Taxonomy::Native));
    }

    #[test]
    fn empty_taxonomy_list_is_rejected() {
        let err = ResolverConfig::from_toml("taxonomies = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::NoTaxonomies));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let err = ResolverConfig::from_toml("max_age_days = \"ninety\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sectormap.toml");
        std::fs::write(&path, "max_age_days = 30\nforce_update = true\n").unwrap();

        let config = ResolverConfig::from_file(&path).unwrap();
        let policy = config.freshness();
        assert_eq!(policy.max_age_days, 30);
        assert!(policy.force_update);

        let missing = ResolverConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn env_dir_beats_windows_dir() {
        let env = Some(PathBuf::from("/env/tdx"));
        let win = Some(PathBuf::from("C:/new_tdx"));
        assert_eq!(choose_tdx_dir(env, win.clone()), Some(PathBuf::from("/env/tdx")));
        assert_eq!(choose_tdx_dir(Some(PathBuf::new()), win.clone()), win);
        assert_eq!(choose_tdx_dir(None, None), None);
    }
}
