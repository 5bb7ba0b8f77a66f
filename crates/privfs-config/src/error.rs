//! Configuration error types.

use std::io;

use thiserror::Error;

/// Failure to load or validate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("failed to read config file at {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A config file is not valid TOML, or the merged tree does not match
    /// the expected shape.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        /// File path, or a marker such as `<merged config>`.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or inconsistent.
    #[error("invalid value for '{field}': {message}")]
    Invalid {
        /// Dotted field path.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The resolved configuration could not be rendered.
    #[error("failed to render config: {0}")]
    Render(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
