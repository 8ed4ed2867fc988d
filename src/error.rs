//! Configuration error types.
//!
//! Board, routing and session failures have their own error types next to
//! the code that raises them (`kicad::error`, `routing`, `session`).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON or has unknown fields.
    #[error("failed to parse configuration file: {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// A value is out of range.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_path() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/boards/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("/boards/config.json"));
    }

    #[test]
    fn parse_error_includes_json_location() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = ConfigError::ParseError {
            path: PathBuf::from("config.json"),
            source,
        };
        assert!(error.to_string().contains("line 1"));
    }
}
