use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a [`crate::MessageSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The source asked us to back off. Carries the wait it requested.
    #[error("rate limited on channel {channel} (retry after {retry_after_secs}s)")]
    RateLimited {
        channel: String,
        retry_after_secs: u64,
    },

    #[error("channel not found: {channel}")]
    ChannelNotFound { channel: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid source URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors writing or reading lake files.
#[derive(Debug, Error)]
pub enum LakeError {
    #[error("lake I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot for {channel}: {source}")]
    Serialize {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot {path} is not a JSON array of records: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot path {path} does not follow <date>/<channel>.json")]
    BadLayout { path: PathBuf },
}

impl LakeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Terminal outcome of a single channel's collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("channel {channel} stayed rate limited after {waits} suspensions")]
    RateLimitExhausted { channel: String, waits: u32 },

    #[error(transparent)]
    Lake(#[from] LakeError),
}
