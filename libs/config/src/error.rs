//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {format} snapshot: {message}")]
    Encode { format: &'static str, message: String },

    #[error("Failed to decode {format} snapshot: {message}")]
    Decode { format: &'static str, message: String },

    /// Snapshot or settings content is well-formed but not usable
    #[error("Invalid configuration: {message} (field: {field:?})")]
    Invalid {
        message: String,
        field: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Invalid {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }
}
