use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Static configuration handed to every pipeline component at construction.
///
/// Built once by [`crate::load_app_config`]; nothing reads the process
/// environment after that.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub channels_path: PathBuf,
    /// Root of the lake; snapshots, media and the detection file live below it.
    pub lake_root: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub source_base_url: String,
    pub source_api_token: Option<String>,
    pub collector_request_timeout_secs: u64,
    pub collector_user_agent: String,
    /// Default per-channel message budget; a channel entry may override it.
    pub collector_max_messages: usize,
    pub collector_page_size: usize,
    pub collector_max_concurrent_channels: usize,
    /// Consecutive rate-limit suspensions tolerated before a channel is failed.
    pub collector_max_rate_limit_waits: u32,
    pub collector_max_retries: u32,
    pub collector_retry_backoff_base_ms: u64,
    pub detector_url: Option<String>,
    pub detector_timeout_secs: u64,
    pub transform_command: String,
    pub transform_dir: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("channels_path", &self.channels_path)
            .field("lake_root", &self.lake_root)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("source_base_url", &self.source_base_url)
            .field(
                "source_api_token",
                &self.source_api_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "collector_request_timeout_secs",
                &self.collector_request_timeout_secs,
            )
            .field("collector_user_agent", &self.collector_user_agent)
            .field("collector_max_messages", &self.collector_max_messages)
            .field("collector_page_size", &self.collector_page_size)
            .field(
                "collector_max_concurrent_channels",
                &self.collector_max_concurrent_channels,
            )
            .field(
                "collector_max_rate_limit_waits",
                &self.collector_max_rate_limit_waits,
            )
            .field("collector_max_retries", &self.collector_max_retries)
            .field(
                "collector_retry_backoff_base_ms",
                &self.collector_retry_backoff_base_ms,
            )
            .field("detector_url", &self.detector_url)
            .field("detector_timeout_secs", &self.detector_timeout_secs)
            .field("transform_command", &self.transform_command)
            .field("transform_dir", &self.transform_dir)
            .finish()
    }
}

impl AppConfig {
    /// Directory holding the dated snapshot partitions.
    #[must_use]
    pub fn snapshots_root(&self) -> PathBuf {
        self.lake_root.join("telegram_messages")
    }

    /// Directory holding downloaded media, one sub-directory per channel.
    #[must_use]
    pub fn images_root(&self) -> PathBuf {
        self.lake_root.join("images")
    }

    /// Path of the tabular detection result file.
    #[must_use]
    pub fn detections_path(&self) -> PathBuf {
        self.lake_root.join("yolo_detections.csv")
    }
}
