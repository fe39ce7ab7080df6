//! File-based configuration loading

use std::fs;
use std::path::Path;

use super::model::TallyConfig;
use crate::error::{TallyError, TallyResult};

/// Load configuration from a file.
///
/// The format follows the extension: TOML, YAML, anything else as JSON.
/// Returns the defaults if the file doesn't exist.
pub fn load_from_file(path: &Path) -> TallyResult<TallyConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(TallyConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        TallyError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let format = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => ConfigFormat::Toml,
        Some("yaml") | Some("yml") => ConfigFormat::Yaml,
        _ => ConfigFormat::Json,
    };
    load_from_str(&content, format).map_err(|e| {
        e.with_context(format!("Deserializing configuration from '{}'", path.display()))
    })
}

/// Serialization format of a config document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

/// Parse configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> TallyResult<TallyConfig> {
    match format {
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| TallyError::config(format!("Failed to parse TOML config: {}", e))),
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| TallyError::config(format!("Failed to parse YAML config: {}", e))),
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| TallyError::config(format!("Failed to parse JSON config: {}", e))),
    }
}
