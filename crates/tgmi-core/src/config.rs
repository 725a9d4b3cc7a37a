use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;
    use std::str::FromStr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    fn parse_num<T>(var: &str, raw: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    }

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        parse_num(var, &or_default(var, default))
    };
    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        parse_num(var, &or_default(var, default))
    };
    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        parse_num(var, &or_default(var, default))
    };

    let database_url = require("DATABASE_URL")?;
    let source_base_url = require("TGMI_SOURCE_BASE_URL")?;

    let env = parse_environment(&or_default("TGMI_ENV", "development"));
    let log_level = or_default("TGMI_LOG_LEVEL", "info");
    let channels_path = PathBuf::from(or_default("TGMI_CHANNELS_PATH", "./config/channels.yaml"));
    let lake_root = PathBuf::from(or_default("TGMI_LAKE_ROOT", "./data/raw"));

    let db_max_connections = parse_u32("TGMI_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("TGMI_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("TGMI_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source_api_token = lookup("TGMI_SOURCE_API_TOKEN").ok();
    let collector_request_timeout_secs = parse_u64("TGMI_COLLECTOR_REQUEST_TIMEOUT_SECS", "30")?;
    let collector_user_agent = or_default("TGMI_COLLECTOR_USER_AGENT", "tgmi/0.1 (channel-collector)");
    let collector_max_messages = parse_usize("TGMI_COLLECTOR_MAX_MESSAGES", "100")?;
    let collector_page_size = parse_usize("TGMI_COLLECTOR_PAGE_SIZE", "50")?;
    if collector_page_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "TGMI_COLLECTOR_PAGE_SIZE".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let collector_max_concurrent_channels =
        parse_usize("TGMI_COLLECTOR_MAX_CONCURRENT_CHANNELS", "2")?;
    let collector_max_rate_limit_waits = parse_u32("TGMI_COLLECTOR_MAX_RATE_LIMIT_WAITS", "10")?;
    let collector_max_retries = parse_u32("TGMI_COLLECTOR_MAX_RETRIES", "3")?;
    let collector_retry_backoff_base_ms = parse_u64("TGMI_COLLECTOR_RETRY_BACKOFF_BASE_MS", "1000")?;

    let detector_url = lookup("TGMI_DETECTOR_URL").ok().filter(|s| !s.trim().is_empty());
    let detector_timeout_secs = parse_u64("TGMI_DETECTOR_TIMEOUT_SECS", "120")?;

    let transform_command = or_default("TGMI_TRANSFORM_COMMAND", "dbt");
    let transform_dir = PathBuf::from(or_default("TGMI_TRANSFORM_DIR", "./medical_warehouse"));

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        channels_path,
        lake_root,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source_base_url,
        source_api_token,
        collector_request_timeout_secs,
        collector_user_agent,
        collector_max_messages,
        collector_page_size,
        collector_max_concurrent_channels,
        collector_max_rate_limit_waits,
        collector_max_retries,
        collector_retry_backoff_base_ms,
        detector_url,
        detector_timeout_secs,
        transform_command,
        transform_dir,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
