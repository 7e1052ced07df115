//! Configuration loading and validation.
//!
//! Layers a base file, an environment-specific file, and `QORCH__`-prefixed
//! environment variables (double-underscore separator) into a validated
//! [`Settings`] value. Unknown keys and out-of-range values are rejected at
//! load time rather than discovered at first use.

pub mod settings;

pub use settings::{
    BreakerConfig, ContextConfig, LlmConfig, PhiConfig, RouterMode, RuntimeEnvironment, Settings,
    VoiceConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(path) => ConfigError::FileNotFound(path),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
