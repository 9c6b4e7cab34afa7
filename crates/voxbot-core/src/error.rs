use thiserror::Error;

/// Top-level error type for voxbot.
///
/// Only configuration loading can fail. Classification and composition are
/// total and never produce one of these; anything that goes wrong mid-turn
/// degrades to a fallback response instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoxbotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing fallback intent: '{0}' must always be declared")]
    MissingFallback(String),

    #[error("Duplicate intent: {0}")]
    DuplicateIntent(String),

    #[error("Invalid intent '{intent}': {reason}")]
    InvalidIntent { intent: String, reason: String },

    #[error("Invalid {kind} pattern '{pattern}': {reason}")]
    InvalidPattern {
        kind: String,
        pattern: String,
        reason: String,
    },

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for VoxbotError {
    fn from(err: toml::de::Error) -> Self {
        VoxbotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for VoxbotError {
    fn from(err: toml::ser::Error) -> Self {
        VoxbotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for VoxbotError {
    fn from(err: serde_json::Error) -> Self {
        VoxbotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for voxbot operations.
pub type Result<T> = std::result::Result<T, VoxbotError>;
