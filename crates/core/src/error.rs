//! Core error types for factory operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for factory operations.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    // Parsing errors
    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    #[error("JSON encode error: {reason}")]
    JsonEncodeFailed { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    // Domain errors
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a JSON encode error.
    pub fn json_encode_failed(reason: impl Into<String>) -> Self {
        Self::JsonEncodeFailed {
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_render_file_read_error_with_path() {
        let err = Error::file_read_failed("/tmp/factory.toml", "not found");
        let text = err.to_string();
        assert!(text.contains("/tmp/factory.toml"));
        assert!(text.contains("not found"));
    }

    #[test]
    fn should_render_invalid_config_reason() {
        let err = Error::invalid_config("robots.speed must be positive");
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("robots.speed"));
    }

    #[test]
    fn should_render_unknown_operation() {
        let err = Error::UnknownOperation("WELD".to_string());
        assert_eq!(err.to_string(), "unknown operation: WELD");
    }
}
