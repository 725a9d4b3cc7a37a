//! Rate-aware channel collection into the partitioned lake.

pub mod collector;
pub mod error;
pub mod http;
pub mod lake;
mod rate_limit;
pub mod source;

pub use collector::{
    ChannelCollection, ChannelOutcome, ChannelRequest, CollectorSettings, RateLimitedCollector,
};
pub use error::{CollectorError, LakeError, SourceError};
pub use http::HttpMessageSource;
pub use lake::{
    discover_snapshots, read_snapshot_entries, snapshot_path, write_snapshot, LakeSnapshot,
    SnapshotFile,
};
pub use source::{MediaRef, MessageSource, PageRequest, SourceMessage};
