//! Shared domain types and configuration for the tgmi ingestion pipeline.

pub mod app_config;
pub mod channels;
pub mod config;
pub mod detections;
pub mod messages;
pub mod report;

pub use app_config::{AppConfig, Environment};
pub use channels::{load_channels, parse_channels, ChannelConfig, ChannelsFile};
pub use config::{load_app_config, load_app_config_from_env};
pub use detections::{ClassifiedDetection, Detection, DetectionResult, ImageCategory};
pub use messages::{ChannelIdentity, CollectedMessage};
pub use report::LoadReport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read channels file {path}: {source}")]
    ChannelsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse channels file: {0}")]
    ChannelsFileParse(#[from] serde_yaml::Error),

    #[error("channel config validation failed: {0}")]
    Validation(String),
}
