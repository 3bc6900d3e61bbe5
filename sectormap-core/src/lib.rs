//! Sectormap Core: industry classification resolution for A-share stocks.
//!
//! This crate answers industry questions against two classification schemes:
//! - Native TDX industries read from a local TDX install (`T`/`X` codes)
//! - Third-party SWS 2021 industries read from the published workbooks (or
//!   CSV exports of them), kept fresh by a cache gate
//!
//! Code structure alone decides nesting (see [`taxonomy::grammar`]), so
//! membership queries are prefix scans over a normalized table.

pub mod config;
pub mod data;
pub mod resolver;
pub mod taxonomy;

pub use config::{ConfigError, ResolverConfig};
pub use data::{ClassificationError, DataError, SourceDownloader, SourceManifest};
pub use resolver::{IndustryResolver, IndustrySource, ResolveError, ResolverBuilder};
pub use taxonomy::{
    Block, BlockStock, ClassificationCode, Industry, LevelConflict, LevelRecord, StockIndustry,
    Taxonomy, NO_SUBCLASSIFICATION,
};
