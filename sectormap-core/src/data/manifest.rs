//! Provenance for a loaded taxonomy table.
//!
//! The content hash is BLAKE3 over every source file's name and bytes, in
//! load order, so two loads of identical files produce identical hashes.

use crate::taxonomy::{Taxonomy, TaxonomyTable};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub taxonomy: Taxonomy,
    pub source_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub content_hash: String,
    pub node_count: usize,
    pub stock_count: usize,
    pub loaded_at: NaiveDateTime,
}

/// Accumulates source files as a loader reads them.
pub struct ManifestBuilder {
    taxonomy: Taxonomy,
    source_dir: PathBuf,
    files: Vec<PathBuf>,
    hasher: blake3::Hasher,
}

impl ManifestBuilder {
    pub fn new(taxonomy: Taxonomy, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            taxonomy,
            source_dir: source_dir.into(),
            files: Vec::new(),
            hasher: blake3::Hasher::new(),
        }
    }

    pub fn add(&mut self, path: &Path, bytes: &[u8]) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.hasher.update(name.as_bytes());
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self.files.push(path.to_path_buf());
    }

    pub fn finish(self, table: &TaxonomyTable) -> SourceManifest {
        SourceManifest {
            taxonomy: self.taxonomy,
            source_dir: self.source_dir,
            files: self.files,
            content_hash: self.hasher.finalize().to_hex().to_string(),
            node_count: table.node_count(),
            stock_count: table.stock_count(),
            loaded_at: chrono::Local::now().naive_local(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_hash_identically() {
        let table = TaxonomyTable::new(Taxonomy::Native);
        let build = || {
            let mut b = ManifestBuilder::new(Taxonomy::Native, "/tmp/x");
            b.add(Path::new("/tmp/x/tdxzs3.cfg"), b"abc");
            b.finish(&table)
        };
        assert_eq!(build().content_hash, build().content_hash);

        let mut other = ManifestBuilder::new(Taxonomy::Native, "/tmp/x");
        other.add(Path::new("/tmp/x/tdxzs3.cfg"), b"abd");
        assert_ne!(other.finish(&table).content_hash, build().content_hash);
    }
}
