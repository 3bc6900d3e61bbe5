//! Two-phase resolver construction.
//!
//! Configuration is collected first; `build()` then loads every requested
//! taxonomy eagerly, so missing source data surfaces here and never at
//! query time. The native source is always read when either taxonomy is
//! requested because its stock-name mapping fills third-party names.

use super::{IndustryResolver, IndustrySource, NativeSource, ResolveError, ThirdPartySource};
use crate::config::{ConfigError, ResolverConfig};
use crate::data::{
    load_native, load_third_party, CacheGate, ClassificationError, GateOutcome,
    HttpArchiveDownloader, NoopDownloader, SourceDownloader,
};
use crate::taxonomy::Taxonomy;
use tracing::{info, warn};

pub struct ResolverBuilder {
    config: ResolverConfig,
    downloader: Option<Box<dyn SourceDownloader>>,
}

impl ResolverBuilder {
    pub fn from_config(config: ResolverConfig) -> Self {
        Self {
            config,
            downloader: None,
        }
    }

    /// Replace the downloader the cache gate uses.
    pub fn downloader(mut self, downloader: Box<dyn SourceDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Override the configured taxonomy list.
    pub fn taxonomies(mut self, taxonomies: &[Taxonomy]) -> Self {
        self.config.taxonomies = taxonomies.to_vec();
        self
    }

    pub fn build(self) -> Result<IndustryResolver, ResolveError> {
        if self.config.taxonomies.is_empty() {
            return Err(ConfigError::NoTaxonomies.into());
        }

        let native = load_native(&self.config.tdx_dir);
        let mut sources: Vec<Box<dyn IndustrySource>> = Vec::new();

        if self.config.loads(Taxonomy::ThirdParty) {
            let downloader = self.downloader.unwrap_or_else(|| default_downloader(&self.config));
            let gate = prepare_third_party(&self.config, downloader.as_ref())?;
            let names = (!native.names.is_empty()).then_some(&native.names);
            let data = load_third_party(&gate.dir, &gate.layout, names)
                .map_err(ClassificationError::from)?;
            sources.push(Box::new(ThirdPartySource::from_loaded(data, &gate)));
        }

        if self.config.loads(Taxonomy::Native) {
            sources.push(Box::new(NativeSource::from(native)));
        }

        let resolver = IndustryResolver::new(sources);
        info!(
            taxonomies = ?resolver.taxonomies().collect::<Vec<_>>(),
            "industry resolver ready"
        );
        Ok(resolver)
    }
}

/// Run the cache gate for the third-party source.
pub fn prepare_third_party(
    config: &ResolverConfig,
    downloader: &dyn SourceDownloader,
) -> Result<GateOutcome, ClassificationError> {
    CacheGate::new(
        &config.cache_dir,
        config.bundled_dir.clone(),
        config.freshness(),
        downloader,
    )
    .prepare()
}

fn default_downloader(config: &ResolverConfig) -> Box<dyn SourceDownloader> {
    if !config.auto_download {
        return Box::new(NoopDownloader);
    }
    match HttpArchiveDownloader::new() {
        Ok(dl) => Box::new(dl),
        Err(e) => {
            warn!("HTTP downloader unavailable, refresh disabled: {e}");
            Box::new(NoopDownloader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_override_is_rejected() {
        let err = ResolverBuilder::from_config(ResolverConfig::default())
            .taxonomies(&[])
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ResolveError::Config(ConfigError::NoTaxonomies)));
    }

    #[test]
    fn native_only_never_touches_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResolverConfig {
            tdx_dir: dir.path().join("tdx"),
            cache_dir: dir.path().join("cache"),
            bundled_dir: None,
            ..ResolverConfig::default()
        };
        let resolver = ResolverBuilder::from_config(config)
            .downloader(Box::new(NoopDownloader))
            .taxonomies(&[Taxonomy::Native])
            .build()
            .unwrap();
        assert_eq!(resolver.taxonomies().collect::<Vec<_>>(), vec![Taxonomy::Native]);
        assert!(resolver.list_industries(Taxonomy::Native, 1).unwrap().is_empty());
    }
}
