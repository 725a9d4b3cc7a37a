use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::messages::ChannelIdentity;
use crate::ConfigError;

/// One source channel the pipeline collects from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Public channel handle, e.g. `"tikvahpharma"`.
    pub name: String,
    /// Per-channel override of the collector's message budget.
    pub max_messages: Option<usize>,
    pub notes: Option<String>,
}

impl ChannelConfig {
    #[must_use]
    pub fn identity(&self) -> ChannelIdentity {
        ChannelIdentity::new(self.name.trim())
    }

    /// Message budget for this channel, falling back to `default_max`.
    #[must_use]
    pub fn message_budget(&self, default_max: usize) -> usize {
        self.max_messages.unwrap_or(default_max)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChannelsFile {
    pub channels: Vec<ChannelConfig>,
}

impl ChannelsFile {
    /// Returns the configured channel whose name matches `name`, ignoring case.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(name.trim()))
    }
}

static CHANNEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,64}$").expect("valid regex"));

/// Load and validate the channel list from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_channels(path: &Path) -> Result<ChannelsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ChannelsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_channels(&content)
}

/// Parse and validate channel YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_channels(content: &str) -> Result<ChannelsFile, ConfigError> {
    let channels_file: ChannelsFile = serde_yaml::from_str(content)?;
    validate_channels(&channels_file)?;
    Ok(channels_file)
}

fn validate_channels(channels_file: &ChannelsFile) -> Result<(), ConfigError> {
    if channels_file.channels.is_empty() {
        return Err(ConfigError::Validation(
            "at least one channel must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();

    for channel in &channels_file.channels {
        let name = channel.name.trim();
        if name.is_empty() {
            return Err(ConfigError::Validation(
                "channel name must be non-empty".to_string(),
            ));
        }

        if !CHANNEL_NAME_RE.is_match(name) {
            return Err(ConfigError::Validation(format!(
                "channel '{name}' is not a valid handle; expected 3-64 letters, digits or underscores"
            )));
        }

        if channel.max_messages == Some(0) {
            return Err(ConfigError::Validation(format!(
                "channel '{name}' has max_messages 0; must be at least 1"
            )));
        }

        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate channel: '{name}'"
            )));
        }
    }

    Ok(())
}
