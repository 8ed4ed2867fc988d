//! Tool catalogue and shared helpers for tool handlers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::session::SessionId;

/// A tool definition for the tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    /// The text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

/// Reads a required string argument.
pub(super) fn required_str<'a>(arguments: &'a Value, name: &str) -> Result<&'a str, String> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter: {name}"))
}

/// Reads an optional string argument.
pub(super) fn optional_str<'a>(arguments: &'a Value, name: &str) -> Option<&'a str> {
    arguments.get(name).and_then(Value::as_str)
}

/// Reads an optional non-negative integer argument.
pub(super) fn optional_usize(arguments: &Value, name: &str) -> Option<usize> {
    arguments
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

/// Reads the `session_id` argument.
pub(super) fn session_id(arguments: &Value) -> Result<SessionId, String> {
    required_str(arguments, "session_id").map(SessionId::from)
}

/// Deserialises the whole argument object into an operation's parameters.
pub(super) fn parse_args<T: DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|e| format!("Invalid arguments: {e}"))
}

/// Compiles a case-insensitive glob (`*`, `?`) into an anchored regex.
pub(super) fn glob_regex(glob: &str) -> Result<regex::Regex, String> {
    let mut pattern = String::with_capacity(glob.len() * 2 + 8);
    pattern.push_str("(?i)^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    regex::Regex::new(&pattern).map_err(|e| format!("Invalid pattern: {e}"))
}

/// Serialises `result` as pretty JSON no longer than `max_chars`.
///
/// An oversized object has its largest top-level array cut to the longest
/// prefix that fits, found by binary search, and is flagged with
/// `_truncated` and `_message`. Values that cannot be shrunk this way are
/// returned whole.
pub(super) fn truncate_response(mut result: Value, max_chars: usize) -> String {
    let render = |value: &Value| serde_json::to_string_pretty(value).unwrap_or_default();
    let full = render(&result);
    if full.len() <= max_chars {
        return full;
    }
    let Some(obj) = result.as_object_mut() else {
        return full;
    };
    let Some((key, total)) = largest_array(obj) else {
        return full;
    };
    let Some(Value::Array(original)) = obj.remove(&key) else {
        return full;
    };

    let with_prefix = |obj: &mut Map<String, Value>, len: usize| {
        obj.insert(key.clone(), Value::Array(original[..len].to_vec()));
        obj.insert("_truncated".into(), Value::Bool(true));
        obj.insert(
            "_message".into(),
            json!(format!(
                "Response truncated: '{key}' reduced from {total} to {len} items. \
                 Use limit/offset parameters for narrower results."
            )),
        );
    };

    let (mut lo, mut hi) = (0, total);
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        with_prefix(obj, mid);
        if render(&Value::Object(obj.clone())).len() <= max_chars {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    with_prefix(obj, lo);
    render(&result)
}

fn largest_array(obj: &Map<String, Value>) -> Option<(String, usize)> {
    obj.iter()
        .filter_map(|(k, v)| v.as_array().map(|a| (k, a.len())))
        .filter(|(_, len)| *len > 0)
        .max_by_key(|(_, len)| *len)
        .map(|(k, len)| (k.clone(), len))
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn session_only(name: &str, description: &str) -> ToolDefinition {
    tool(
        name,
        description,
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session returned by open_board" }
            },
            "required": ["session_id"]
        }),
    )
}

/// Returns the list of available tools.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    let session = json!({ "type": "string", "description": "Session returned by open_board" });
    let net = json!({ "type": "integer", "minimum": 0, "description": "Net number (0 = unconnected)" });
    vec![
        // === Sessions ===
        tool(
            "open_board",
            "Open a .kicad_pcb file and start an editing session. Returns the session id \
             and a board summary. Edits stay in memory until save_board.",
            json!({
                "type": "object",
                "properties": {
                    "filepath": { "type": "string", "description": "Path to the .kicad_pcb file" }
                },
                "required": ["filepath"]
            }),
        ),
        tool(
            "save_board",
            "Write the session's board to disk. Formatting of untouched elements is \
             preserved byte for byte. An existing file is backed up first unless backup is false.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "filepath": { "type": "string", "description": "Target path (default: the opened file)" },
                    "backup": { "type": "boolean", "description": "Keep a timestamped copy of the old file (default: true)" }
                },
                "required": ["session_id"]
            }),
        ),
        session_only("discard_session", "Close a session without saving."),
        session_only(
            "session_history",
            "List the operations applied to or rejected by a session, oldest first.",
        ),
        session_only("undo", "Revert the most recent applied operation of a session."),
        // === Views ===
        session_only(
            "board_summary",
            "Board overview: layers, copper stack, counts of nets, footprints, tracks, vias, \
             zones and the outline bounding box.",
        ),
        tool(
            "list_components",
            "List footprints with position, rotation and pads. All dimensions in mm.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "filter": { "type": "string", "description": "Glob on reference or value, e.g. 'R*'" },
                    "layer": { "type": "string", "description": "Only footprints on this side (F.Cu / B.Cu)" },
                    "limit": { "type": "integer", "minimum": 0 },
                    "offset": { "type": "integer", "minimum": 0 }
                },
                "required": ["session_id"]
            }),
        ),
        tool(
            "list_nets",
            "List declared nets.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "filter": { "type": "string", "description": "Glob on net name, e.g. '*GND*'" }
                },
                "required": ["session_id"]
            }),
        ),
        tool(
            "list_traces",
            "List track segments and vias, optionally for one net.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "net": net
                },
                "required": ["session_id"]
            }),
        ),
        session_only(
            "get_ratsnest",
            "List nets that have two or more pads and no routed track yet.",
        ),
        // === Edits ===
        tool(
            "add_board_text",
            "Place a text item on the board. Layer display names such as 'F.Silkscreen' are accepted.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "text": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "layer": { "type": "string", "description": "Default: F.SilkS" },
                    "size": { "type": "number", "description": "Font height in mm" },
                    "angle": { "type": "number", "description": "Rotation in degrees" }
                },
                "required": ["session_id", "text", "x", "y"]
            }),
        ),
        tool(
            "route_trace",
            "Route a track between two points. Draws a straight segment unless obstacle \
             avoidance or a layer change is requested, in which case a grid pathfinder \
             routes around existing copper and inserts vias where layers change.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "start_x": { "type": "number" },
                    "start_y": { "type": "number" },
                    "end_x": { "type": "number" },
                    "end_y": { "type": "number" },
                    "width": { "type": "number", "description": "Track width in mm" },
                    "layer": { "type": "string", "description": "Start layer (default: F.Cu)" },
                    "end_layer": { "type": "string", "description": "End layer (default: start layer)" },
                    "routing_layers": { "type": "array", "items": { "type": "string" } },
                    "net": net,
                    "avoid_obstacles": { "type": "boolean" }
                },
                "required": ["session_id", "start_x", "start_y", "end_x", "end_y", "width", "net"]
            }),
        ),
        tool(
            "add_via",
            "Place a via connecting two layers.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "net": net,
                    "size": { "type": "number" },
                    "drill": { "type": "number" },
                    "layers": { "type": "array", "items": { "type": "string" }, "minItems": 2, "maxItems": 2 }
                },
                "required": ["session_id", "x", "y", "net"]
            }),
        ),
        tool(
            "create_net",
            "Declare a new net with the next free number.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "name": { "type": "string" }
                },
                "required": ["session_id", "name"]
            }),
        ),
        tool(
            "move_component",
            "Move a footprint, optionally setting its rotation.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "reference": { "type": "string" },
                    "x": { "type": "number" },
                    "y": { "type": "number" },
                    "angle": { "type": "number" }
                },
                "required": ["session_id", "reference", "x", "y"]
            }),
        ),
        tool(
            "delete_component",
            "Remove a footprint by reference designator.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "reference": { "type": "string" }
                },
                "required": ["session_id", "reference"]
            }),
        ),
        tool(
            "delete_trace",
            "Remove a track segment by uuid.",
            json!({
                "type": "object",
                "properties": { "session_id": session, "uuid": { "type": "string" } },
                "required": ["session_id", "uuid"]
            }),
        ),
        tool(
            "delete_via",
            "Remove a via by uuid.",
            json!({
                "type": "object",
                "properties": { "session_id": session, "uuid": { "type": "string" } },
                "required": ["session_id", "uuid"]
            }),
        ),
        tool(
            "flip_component",
            "Move a footprint to the other side of the board, swapping the side of its layers.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "reference": { "type": "string" }
                },
                "required": ["session_id", "reference"]
            }),
        ),
        tool(
            "delete_net",
            "Remove a net declaration. Nets still used by pads, tracks, vias or zones are refused.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "name": { "type": "string" }
                },
                "required": ["session_id", "name"]
            }),
        ),
        tool(
            "assign_net",
            "Connect a footprint pad to a declared net. The empty net name disconnects the pad.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "reference": { "type": "string" },
                    "pad": { "type": "string", "description": "Pad number, e.g. \"1\"" },
                    "net_name": { "type": "string" }
                },
                "required": ["session_id", "reference", "pad", "net_name"]
            }),
        ),
        tool(
            "create_zone",
            "Add a copper pour for a net, bounded by a closed polygon.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "net_name": { "type": "string" },
                    "layer": { "type": "string", "description": "Copper layer (default: F.Cu)" },
                    "points": {
                        "type": "array",
                        "minItems": 3,
                        "items": {
                            "type": "object",
                            "properties": { "x": { "type": "number" }, "y": { "type": "number" } },
                            "required": ["x", "y"]
                        }
                    },
                    "min_thickness": { "type": "number" },
                    "priority": { "type": "integer", "minimum": 0 }
                },
                "required": ["session_id", "net_name", "points"]
            }),
        ),
        tool(
            "set_board_outline",
            "Replace the Edge.Cuts outline with a closed polygon through the given points.",
            json!({
                "type": "object",
                "properties": {
                    "session_id": session,
                    "points": {
                        "type": "array",
                        "minItems": 3,
                        "items": {
                            "type": "object",
                            "properties": { "x": { "type": "number" }, "y": { "type": "number" } },
                            "required": ["x", "y"]
                        }
                    }
                },
                "required": ["session_id", "points"]
            }),
        ),
        // === Checks ===
        tool(
            "read_drc_report",
            "Classify a JSON report written by 'kicad-cli pcb drc --format json'. \
             Errors are error-severity violations plus unconnected items.",
            json!({
                "type": "object",
                "properties": {
                    "filepath": { "type": "string", "description": "Path to the report file" },
                    "diagnostics": { "type": "string", "description": "Checker output shown when there are no errors" }
                },
                "required": ["filepath"]
            }),
        ),
        tool(
            "cache_stats",
            "Hit and miss counters for the summary and route caches.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}
