//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::kicad::layers::LayerAliases;
use crate::routing::{
    RouterConfig, DEFAULT_CLEARANCE, DEFAULT_GRID_RESOLUTION, DEFAULT_MAX_ITERATIONS,
    DEFAULT_VIA_COST,
};
use crate::session::{
    SessionConfig, DEFAULT_OUTLINE_STROKE_WIDTH, DEFAULT_TEXT_SIZE, DEFAULT_VIA_DRILL,
    DEFAULT_VIA_SIZE, DEFAULT_ZONE_MIN_THICKNESS,
};

/// Default ceiling for tool response text, in characters.
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 50_000;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Directories board files may be read from and written to.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,

    /// Pathfinder settings.
    #[serde(default)]
    pub routing: RoutingSettings,

    /// Defaults for generated board elements.
    #[serde(default)]
    pub board: BoardSettings,

    /// Summary and route cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Tool response settings.
    #[serde(default)]
    pub response: ResponseSettings,

    /// Extra layer display names, merged over the built-in table.
    #[serde(default)]
    pub layer_aliases: HashMap<String, String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let routing = &self.routing;
        if routing.max_iterations == 0 {
            return Err(invalid("routing.max_iterations must be at least 1"));
        }
        if !(routing.grid_resolution.is_finite() && routing.grid_resolution > 0.0) {
            return Err(invalid(format!(
                "routing.grid_resolution must be positive, got {}",
                routing.grid_resolution
            )));
        }
        if !(routing.via_cost.is_finite() && routing.via_cost >= 0.0) {
            return Err(invalid(format!(
                "routing.via_cost must not be negative, got {}",
                routing.via_cost
            )));
        }
        if !(routing.clearance.is_finite() && routing.clearance >= 0.0) {
            return Err(invalid(format!(
                "routing.clearance must not be negative, got {}",
                routing.clearance
            )));
        }

        let board = &self.board;
        for (name, value) in [
            ("board.outline_stroke_width", board.outline_stroke_width),
            ("board.via_size", board.via_size),
            ("board.via_drill", board.via_drill),
            ("board.text_size", board.text_size),
            ("board.zone_min_thickness", board.zone_min_thickness),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if board.via_drill >= board.via_size {
            return Err(invalid(format!(
                "board.via_drill ({}) must be smaller than board.via_size ({})",
                board.via_drill, board.via_size
            )));
        }

        if self.cache.max_size == 0 {
            return Err(invalid("cache.max_size must be at least 1"));
        }
        if let Some(ttl) = self.cache.ttl_seconds {
            if !(ttl.is_finite() && ttl > 0.0) {
                return Err(invalid(format!(
                    "cache.ttl_seconds must be positive or null, got {ttl}"
                )));
            }
        }
        if self.response.max_chars == 0 {
            return Err(invalid("response.max_chars must be at least 1"));
        }
        if let Some((name, _)) = self
            .layer_aliases
            .iter()
            .find(|(name, target)| name.is_empty() || target.is_empty())
        {
            return Err(invalid(format!("layer alias '{name}' has an empty name or target")));
        }
        Ok(())
    }

    /// Builds the session settings described by this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            router: RouterConfig {
                max_iterations: self.routing.max_iterations,
                via_cost: self.routing.via_cost,
                resolution: self.routing.grid_resolution,
                clearance: self.routing.clearance,
                diagonal: self.routing.diagonal,
            },
            layer_aliases: LayerAliases::with_extra(&self.layer_aliases),
            outline_stroke_width: self.board.outline_stroke_width,
            via_size: self.board.via_size,
            via_drill: self.board.via_drill,
            text_size: self.board.text_size,
            zone_min_thickness: self.board.zone_min_thickness,
            route_cache_size: self.cache.max_size,
            route_cache_ttl: self.cache.ttl(),
        }
    }
}

/// Pathfinder configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSettings {
    /// Maximum node expansions per search.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Cost of a layer change, in mm of equivalent track length.
    #[serde(default = "default_via_cost")]
    pub via_cost: f64,

    /// Grid cell size in mm.
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: f64,

    /// Copper-to-copper clearance in mm.
    #[serde(default = "default_clearance")]
    pub clearance: f64,

    /// Allow 45-degree moves.
    #[serde(default = "default_true")]
    pub diagonal: bool,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            via_cost: default_via_cost(),
            grid_resolution: default_grid_resolution(),
            clearance: default_clearance(),
            diagonal: default_true(),
        }
    }
}

const fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

const fn default_via_cost() -> f64 {
    DEFAULT_VIA_COST
}

const fn default_grid_resolution() -> f64 {
    DEFAULT_GRID_RESOLUTION
}

const fn default_clearance() -> f64 {
    DEFAULT_CLEARANCE
}

const fn default_true() -> bool {
    true
}

/// Defaults for generated board elements.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSettings {
    /// Edge.Cuts line width in mm.
    #[serde(default = "default_outline_stroke_width")]
    pub outline_stroke_width: f64,

    /// Via diameter in mm.
    #[serde(default = "default_via_size")]
    pub via_size: f64,

    /// Via drill in mm.
    #[serde(default = "default_via_drill")]
    pub via_drill: f64,

    /// Text height in mm.
    #[serde(default = "default_text_size")]
    pub text_size: f64,

    /// Minimum copper width of new zones in mm.
    #[serde(default = "default_zone_min_thickness")]
    pub zone_min_thickness: f64,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            outline_stroke_width: default_outline_stroke_width(),
            via_size: default_via_size(),
            via_drill: default_via_drill(),
            text_size: default_text_size(),
            zone_min_thickness: default_zone_min_thickness(),
        }
    }
}

const fn default_outline_stroke_width() -> f64 {
    DEFAULT_OUTLINE_STROKE_WIDTH
}

const fn default_via_size() -> f64 {
    DEFAULT_VIA_SIZE
}

const fn default_via_drill() -> f64 {
    DEFAULT_VIA_DRILL
}

const fn default_text_size() -> f64 {
    DEFAULT_TEXT_SIZE
}

const fn default_zone_min_thickness() -> f64 {
    DEFAULT_ZONE_MIN_THICKNESS
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Maximum number of entries per cache.
    #[serde(default = "default_cache_size")]
    pub max_size: usize,

    /// Entry lifetime in seconds; `null` keeps entries until evicted.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: Option<f64>,
}

impl CacheSettings {
    /// The entry lifetime as a [`Duration`].
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_cache_size(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

const fn default_cache_size() -> usize {
    64
}

#[allow(clippy::unnecessary_wraps)] // serde default must match the field type
const fn default_ttl_seconds() -> Option<f64> {
    Some(60.0)
}

/// Tool response configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSettings {
    /// Responses longer than this are truncated.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

const fn default_max_chars() -> usize {
    DEFAULT_MAX_RESPONSE_CHARS
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.allowed_paths.is_empty());
        assert_eq!(config.routing.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "allowed_paths": ["/home/user/boards"],
            "routing": {
                "max_iterations": 1000,
                "via_cost": 2.5,
                "grid_resolution": 0.1,
                "clearance": 0.15,
                "diagonal": false
            },
            "board": {
                "outline_stroke_width": 0.1,
                "via_size": 0.6,
                "via_drill": 0.3,
                "text_size": 1.5
            },
            "cache": { "max_size": 8, "ttl_seconds": null },
            "response": { "max_chars": 1000 },
            "layer_aliases": { "Top Paste": "F.Paste" },
            "logging": { "level": "debug" }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.allowed_paths, vec![PathBuf::from("/home/user/boards")]);
        assert_eq!(config.routing.max_iterations, 1000);
        assert!(!config.routing.diagonal);
        assert!(config.cache.ttl().is_none());
        assert_eq!(config.response.max_chars, 1000);
        assert_eq!(config.logging.level, "debug");

        let session = config.session_config();
        assert!((session.router.via_cost - 2.5).abs() < f64::EPSILON);
        assert!((session.via_drill - 0.3).abs() < f64::EPSILON);
        assert_eq!(session.layer_aliases.normalize("Top Paste"), "F.Paste");
        assert_eq!(session.layer_aliases.normalize("F.Silkscreen"), "F.SilkS");
        assert_eq!(session.route_cache_size, 8);
    }

    #[test]
    fn defaults_match_core_constants() {
        let board = BoardSettings::default();
        assert!((board.via_size - DEFAULT_VIA_SIZE).abs() < f64::EPSILON);
        assert!((board.outline_stroke_width - 0.05).abs() < f64::EPSILON);
        let cache = CacheSettings::default();
        assert_eq!(cache.ttl(), Some(Duration::from_secs(60)));
        assert_eq!(ResponseSettings::default().max_chars, 50_000);
        assert_eq!(LoggingConfig::default().level, "warn");
    }

    #[test]
    fn reject_drill_not_smaller_than_via() {
        let json = r#"{ "board": { "via_size": 0.4, "via_drill": 0.4 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_bad_routing_values() {
        for json in [
            r#"{ "routing": { "max_iterations": 0 } }"#,
            r#"{ "routing": { "grid_resolution": 0.0 } }"#,
            r#"{ "routing": { "via_cost": -1.0 } }"#,
            r#"{ "cache": { "max_size": 0 } }"#,
            r#"{ "layer_aliases": { "Top": "" } }"#,
        ] {
            let config: Config = serde_json::from_str(json).unwrap();
            assert!(config.validate().is_err(), "accepted {json}");
        }
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
