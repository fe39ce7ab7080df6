//! From trait implementations for TallyError conversions

use super::types::TallyError;

impl From<std::io::Error> for TallyError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<toml::de::Error> for TallyError {
    fn from(error: toml::de::Error) -> Self {
        Self::config_with_context(error.to_string(), "Parsing TOML configuration")
    }
}

impl From<serde_yaml::Error> for TallyError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config_with_context(error.to_string(), "Parsing YAML configuration")
    }
}

impl From<tokio::task::JoinError> for TallyError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else {
            Self::other(format!("Task failed: {}", error))
        }
    }
}
