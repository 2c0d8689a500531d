//! Configuration loader for jobwave.
//!
//! Reads `config.toml` from the data directory (`~/.jobwave/` unless
//! `JOBWAVE_DATA_DIR` says otherwise) and deserializes it into
//! [`SchedulerConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use jobwave_types::config::SchedulerConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "JOBWAVE_DATA_DIR";

/// Resolve the data directory: `JOBWAVE_DATA_DIR`, else `~/.jobwave`.
///
/// Falls back to `./.jobwave` when no home directory can be determined.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".jobwave"),
    }
}

/// Load scheduler configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`SchedulerConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config; absent fields keep their defaults.
pub async fn load_config(data_dir: &Path) -> SchedulerConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return SchedulerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return SchedulerConfig::default();
        }
    };

    match toml::from_str::<SchedulerConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            SchedulerConfig::default()
        }
    }
}
