//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given on the command line
//! 2. Default location:
//!    - **Linux/macOS:** `~/.kicad-pcb-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.kicad-pcb-mcp\config.json`
//!
//! A missing file at the default location is not an error: built-in
//! defaults are used instead.
//!
//! # Example Configuration
//!
//! See `config/example-config.json` for a complete example.

mod settings;

pub use settings::{
    BoardSettings, CacheSettings, Config, LoggingConfig, ResponseSettings, RoutingSettings,
    DEFAULT_MAX_RESPONSE_CHARS,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.kicad-pcb-mcp/`
/// - **Windows:** `%USERPROFILE%\.kicad-pcb-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".kicad-pcb-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to [`Config::default`] when no file exists there.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Fields are unknown or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Config::default()),
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.to_string_lossy().contains(".kicad-pcb-mcp"));
        assert!(path.to_string_lossy().ends_with("config.json"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("absent.json")));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn loads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "routing": { "via_cost": 1.0 } }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!((config.routing.via_cost - 1.0).abs() < f64::EPSILON);

        std::fs::write(&path, r#"{ "routing": { "via_cost": -1.0 } }"#).unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ValidationError { .. })
        ));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
