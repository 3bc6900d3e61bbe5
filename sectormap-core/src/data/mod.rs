//! Source loading: file decoding, native and third-party loaders, the cache
//! gate and the archive downloader.

pub mod cache;
pub mod decode;
pub mod download;
pub mod manifest;
pub mod native;
pub mod provider;
pub mod thirdparty;

pub use cache::{
    CacheGate, ClassificationError, FreshnessPolicy, GateOutcome, RefreshReason, SourceOrigin,
};
pub use download::HttpArchiveDownloader;
pub use manifest::SourceManifest;
pub use native::{load_native, NativeData};
pub use provider::{DataError, NoopDownloader, SourceDownloader};
pub use thirdparty::{load_third_party, SourceLayout, ThirdPartyData};
