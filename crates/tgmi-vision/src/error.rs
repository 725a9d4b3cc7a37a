use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("labels configured as both person and product: {0:?}")]
    OverlappingLabels(Vec<String>),
}

/// Errors from the external object detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("detector returned HTTP {status} for {path}")]
    UnexpectedStatus { status: u16, path: PathBuf },

    #[error("detector response for {path} is not valid JSON: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read media file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid detector URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors reading the media tree or the detection result file.
#[derive(Debug, Error)]
pub enum DetectionFileError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("detection file task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DetectionFileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}
