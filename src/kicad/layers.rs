//! Layer name normalisation.
//!
//! KiCad's layer manager shows "user" names such as `F.Silkscreen`, but the
//! board file stores the short canonical tokens (`F.SilkS`). Operations accept
//! either spelling and always write the canonical one.

use std::collections::HashMap;

/// Built-in display alias → canonical layer name table.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("F.Silkscreen", "F.SilkS"),
    ("B.Silkscreen", "B.SilkS"),
    ("F.Adhesive", "F.Adhes"),
    ("B.Adhesive", "B.Adhes"),
    ("F.Courtyard", "F.CrtYd"),
    ("B.Courtyard", "B.CrtYd"),
    ("User.Drawings", "Dwgs.User"),
    ("User.Comments", "Cmts.User"),
    ("User.Eco1", "Eco1.User"),
    ("User.Eco2", "Eco2.User"),
];

/// Mapping from display aliases to canonical layer names.
///
/// Lookup is exact-string: no case folding, no fuzzy matching. Names that are
/// not aliases (canonical names, inner copper layers such as `In1.Cu`, custom
/// user layers) pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerAliases {
    aliases: HashMap<String, String>,
}

impl Default for LayerAliases {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|&(alias, name)| (alias.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl LayerAliases {
    /// Creates an empty table (every name passes through).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Returns the built-in table extended (or overridden) by `extra`.
    #[must_use]
    pub fn with_extra<'a>(extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut table = Self::default();
        for (alias, name) in extra {
            table.aliases.insert(alias.clone(), name.clone());
        }
        table
    }

    /// Maps a display alias to its canonical name; any other name is
    /// returned unchanged.
    #[must_use]
    pub fn normalize<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    /// Number of aliases in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Returns `true` if the table has no aliases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Returns `true` for copper layer names (`F.Cu`, `In1.Cu`, `B.Cu`).
#[must_use]
pub fn is_copper(name: &str) -> bool {
    name.ends_with(".Cu") && name.len() > 3
}

/// The same layer on the other side of the board: `F.Cu` and `B.Cu`,
/// `F.SilkS` and `B.SilkS`, and so on. Inner, board-wide and wildcard
/// layers have no opposite and come back unchanged.
#[must_use]
pub fn opposite_side(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("F.") {
        format!("B.{rest}")
    } else if let Some(rest) = name.strip_prefix("B.") {
        format!("F.{rest}")
    } else {
        name.to_string()
    }
}

/// Returns `true` if a pad or zone layer pattern covers `layer`.
///
/// KiCad uses `*.Cu` (and `*.Mask`, `*.Paste`) to mean every layer of that
/// kind; `F&B.Cu` covers both outer copper layers.
#[must_use]
pub fn pattern_matches(pattern: &str, layer: &str) -> bool {
    if pattern == layer {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return layer.ends_with(suffix);
    }
    if pattern == "F&B.Cu" {
        return layer == "F.Cu" || layer == "B.Cu";
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_maps_to_its_canonical_name() {
        let table = LayerAliases::default();
        assert_eq!(table.len(), DEFAULT_ALIASES.len());
        for &(alias, name) in DEFAULT_ALIASES {
            assert_eq!(table.normalize(alias), name);
        }
    }

    #[test]
    fn canonical_and_unknown_names_pass_through() {
        let table = LayerAliases::default();
        for name in ["F.SilkS", "B.CrtYd", "F.Cu", "In1.Cu", "Edge.Cuts", "MyCustomLayer"] {
            assert_eq!(table.normalize(name), name);
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let table = LayerAliases::default();
        assert_eq!(table.normalize("f.silkscreen"), "f.silkscreen");
    }

    #[test]
    fn extra_aliases_extend_table() {
        let extra: HashMap<String, String> =
            [("Top".to_string(), "F.Cu".to_string())].into_iter().collect();
        let table = LayerAliases::with_extra(&extra);
        assert_eq!(table.normalize("Top"), "F.Cu");
        assert_eq!(table.normalize("F.Silkscreen"), "F.SilkS");
    }

    #[test]
    fn copper_and_patterns() {
        assert!(is_copper("F.Cu"));
        assert!(is_copper("In2.Cu"));
        assert!(!is_copper("F.SilkS"));
        assert!(!is_copper(".Cu"));
        assert!(pattern_matches("*.Cu", "In1.Cu"));
        assert!(pattern_matches("F&B.Cu", "B.Cu"));
        assert!(!pattern_matches("*.Cu", "F.Mask"));
        assert!(pattern_matches("F.Cu", "F.Cu"));
    }

    #[test]
    fn opposite_sides() {
        assert_eq!(opposite_side("F.Cu"), "B.Cu");
        assert_eq!(opposite_side("B.SilkS"), "F.SilkS");
        assert_eq!(opposite_side("F.CrtYd"), "B.CrtYd");
        for name in ["In1.Cu", "Edge.Cuts", "*.Cu", "F&B.Cu", "Dwgs.User"] {
            assert_eq!(opposite_side(name), name);
        }
    }
}
