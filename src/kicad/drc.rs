//! Design-rule-check report classification.
//!
//! The DRC itself is run by an external checker (`kicad-cli pcb drc
//! --format json`). This module turns its JSON report into a pass/fail
//! result with error and warning counts.

use serde::{Deserialize, Serialize};

use super::board::Point;

fn default_kind() -> String {
    "unknown".to_string()
}

fn default_severity() -> String {
    "error".to_string()
}

fn default_unconnected_description() -> String {
    "Unconnected items".to_string()
}

/// Position as written by the checker.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReportPosition {
    /// X in mm.
    #[serde(default)]
    pub x: f64,
    /// Y in mm.
    #[serde(default)]
    pub y: f64,
}

/// An item involved in a violation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportItem {
    /// Human-readable item description.
    #[serde(default)]
    pub description: String,
    /// Item position.
    #[serde(default)]
    pub pos: Option<ReportPosition>,
    /// Item uuid.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// A violation entry as written by the checker.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportViolation {
    /// Violation type (`clearance`, `track_width`, ...).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// `error`, `warning`, or another checker-defined severity.
    #[serde(default = "default_severity")]
    pub severity: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Marker position.
    #[serde(default)]
    pub pos: Option<ReportPosition>,
    /// Involved items.
    #[serde(default)]
    pub items: Vec<ReportItem>,
}

/// An unconnected-items entry as written by the checker.
#[derive(Debug, Clone, Deserialize)]
pub struct UnconnectedEntry {
    /// Human-readable description.
    #[serde(default = "default_unconnected_description")]
    pub description: String,
    /// Involved items.
    #[serde(default)]
    pub items: Vec<ReportItem>,
}

/// A DRC report produced by the external checker.
///
/// Unknown fields (`source`, `date`, `kicad_version`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrcReport {
    /// Rule violations.
    #[serde(default)]
    pub violations: Vec<ReportViolation>,
    /// Connections that still need routing.
    #[serde(default)]
    pub unconnected_items: Vec<UnconnectedEntry>,
}

/// A classified violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrcViolation {
    /// Violation type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Severity.
    pub severity: String,
    /// Human-readable description.
    pub description: String,
    /// Marker position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    /// Descriptions of the involved items.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

/// Outcome of a DRC run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrcResult {
    /// `true` when there are no errors.
    pub passed: bool,
    /// Error-severity violations plus unconnected items.
    pub error_count: usize,
    /// Warning-severity violations.
    pub warning_count: usize,
    /// All violations, unconnected items last.
    pub violations: Vec<DrcViolation>,
    /// Where the report was read from.
    pub report_path: Option<String>,
    /// Checker diagnostics, only surfaced when there are no errors.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn item_descriptions(items: &[ReportItem]) -> Vec<String> {
    items
        .iter()
        .filter(|item| !item.description.is_empty())
        .map(|item| item.description.clone())
        .collect()
}

impl DrcReport {
    /// Parses a JSON report.
    ///
    /// # Errors
    ///
    /// Returns an error if `text` is not a JSON object of the expected shape.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Classifies the report.
    ///
    /// `diagnostics` is the checker's free-form output (typically stderr).
    /// It becomes the result message only when there are no errors.
    #[must_use]
    pub fn classify(&self, diagnostics: &str, report_path: Option<&str>) -> DrcResult {
        let mut error_count = 0;
        let mut warning_count = 0;
        let mut violations = Vec::with_capacity(self.violations.len() + self.unconnected_items.len());

        for v in &self.violations {
            match v.severity.as_str() {
                "error" => error_count += 1,
                "warning" => warning_count += 1,
                _ => {}
            }
            violations.push(DrcViolation {
                kind: v.kind.clone(),
                severity: v.severity.clone(),
                description: v.description.clone(),
                position: v.pos.map(|p| Point::new(p.x, p.y)),
                items: item_descriptions(&v.items),
            });
        }

        for entry in &self.unconnected_items {
            error_count += 1;
            violations.push(DrcViolation {
                kind: "unconnected_items".to_string(),
                severity: "error".to_string(),
                description: entry.description.clone(),
                position: None,
                items: item_descriptions(&entry.items),
            });
        }

        let message = if error_count == 0 {
            diagnostics.trim().to_string()
        } else {
            String::new()
        };

        DrcResult {
            passed: error_count == 0,
            error_count,
            warning_count,
            violations,
            report_path: report_path.map(str::to_string),
            message,
        }
    }
}
