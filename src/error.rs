//! Policy error types.
//!
//! Training and prediction never fail; only the file-system and
//! configuration glue around them does.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by persistence and configuration loading.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Reading or writing a file failed.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON or YAML (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration is syntactically valid but semantically wrong.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An action referenced by input data is not in the domain.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl PolicyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PolicyError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IO",
            Self::Serialization(_) => "SERIALIZATION",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnknownAction(_) => "UNKNOWN_ACTION",
        }
    }
}

impl From<serde_json::Error> for PolicyError {
    fn from(err: serde_json::Error) -> Self {
        PolicyError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PolicyError {
    fn from(err: serde_yaml::Error) -> Self {
        PolicyError::Serialization(err.to_string())
    }
}
