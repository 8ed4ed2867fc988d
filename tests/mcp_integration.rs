//! Integration tests for the MCP server.
//!
//! These tests drive the server through JSON-RPC lines and direct tool calls:
//! lifecycle handling, opening and saving boards inside the allowed
//! directories, operations and their rejection path, and DRC report reading.

use std::path::{Path, PathBuf};

use kicad_pcb_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use kicad_pcb_mcp::mcp::server::{McpServer, ServerState};
use kicad_pcb_mcp::mcp::Transport;
use kicad_pcb_mcp::session::SessionConfig;
use serde_json::{json, Value};
use tempfile::TempDir;

const SAMPLE: &str = include_str!("fixtures/sample.kicad_pcb");

/// Creates a temporary directory inside `.tmp/` for test isolation.
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
fn test_temp_dir() -> TempDir {
    let tmp_root = Path::new(".tmp");
    std::fs::create_dir_all(tmp_root).expect("Failed to create .tmp directory");
    let tmp_root = tmp_root
        .canonicalize()
        .expect("Failed to canonicalize .tmp path");
    tempfile::tempdir_in(&tmp_root).expect("Failed to create temp dir")
}

fn request(id: i64, method: &str, params: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string()
}

fn server_for(dir: &Path) -> McpServer {
    McpServer::with_session_config(vec![dir.to_path_buf()], SessionConfig::default(), 50_000)
}

fn initialise(server: &mut McpServer) {
    let reply = server
        .handle_line(&request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }),
        ))
        .expect("initialize must be answered");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(reply["result"]["serverInfo"]["name"], "kicad-pcb-mcp");
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .is_none());
    assert_eq!(server.state(), ServerState::Running);
}

fn write_sample(dir: &Path) -> PathBuf {
    let path = dir.join("board.kicad_pcb");
    std::fs::write(&path, SAMPLE).expect("write fixture");
    path
}

/// Calls a tool and returns its parsed JSON payload and error flag.
fn call(server: &mut McpServer, name: &str, arguments: Value) -> (Value, bool) {
    let result = server.call_tool(name, &arguments);
    let text = result.first_text();
    let value = serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()));
    (value, result.is_error)
}

fn open(server: &mut McpServer, path: &Path) -> String {
    let (value, is_error) = call(
        server,
        "open_board",
        json!({ "filepath": path.to_string_lossy() }),
    );
    assert!(!is_error, "open_board failed: {value}");
    value["session_id"]
        .as_str()
        .expect("session id")
        .to_string()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_tools_call_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": "call-7",
        "method": "tools/call",
        "params": { "name": "board_summary", "arguments": { "session_id": "abc" } }
    }"#;

    match parse_message(json).expect("valid request") {
        IncomingMessage::Request(req) => {
            assert_eq!(req.method, "tools/call");
            assert_eq!(req.id, RequestId::String("call-7".to_string()));
        }
        IncomingMessage::Notification(_) => panic!("Expected Request"),
    }
}

#[test]
fn test_parse_rejects_wrong_version() {
    let err = parse_message(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#)
        .expect_err("version 1.0 is not JSON-RPC 2.0");
    assert_eq!(err.error.code, -32600);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_tools_require_initialisation() {
    let dir = test_temp_dir();
    let mut server = server_for(dir.path());

    let reply = server
        .handle_line(&request(2, "tools/list", json!({})))
        .expect("error reply");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(server.state(), ServerState::AwaitingInit);
}

#[test]
fn test_tools_list_after_initialisation() {
    let dir = test_temp_dir();
    let mut server = server_for(dir.path());
    initialise(&mut server);

    let reply = server
        .handle_line(&request(2, "tools/list", json!({})))
        .expect("tools/list reply");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .expect("tools array")
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    for expected in ["open_board", "save_board", "route_trace", "undo", "read_drc_report"] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
}

#[test]
fn test_second_initialize_is_rejected() {
    let dir = test_temp_dir();
    let mut server = server_for(dir.path());
    initialise(&mut server);

    let reply = server
        .handle_line(&request(3, "initialize", json!({ "protocolVersion": "2024-11-05" })))
        .expect("error reply");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(reply["error"]["code"], -32600);
}

#[test]
fn test_unknown_method_and_malformed_json() {
    let dir = test_temp_dir();
    let mut server = server_for(dir.path());
    initialise(&mut server);

    let reply = server
        .handle_line(&request(4, "resources/list", json!({})))
        .expect("error reply");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(reply["error"]["code"], -32601);

    let reply = server.handle_line("{ not json").expect("parse error reply");
    let reply: Value = serde_json::from_str(&reply).expect("reply is JSON");
    assert_eq!(reply["error"]["code"], -32700);

    assert!(server.handle_line("   ").is_none());
}

#[tokio::test]
async fn test_serve_answers_each_line_until_eof() {
    let dir = test_temp_dir();
    let mut server = server_for(dir.path());
    let input = [
        request(
            1,
            "initialize",
            json!({ "protocolVersion": "2024-11-05", "capabilities": {} }),
        ),
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
        request(2, "ping", json!({})),
        request(3, "tools/list", json!({})),
    ]
    .join("\n");

    let mut transport = Transport::new(input.as_bytes(), Vec::new());
    server.serve(&mut transport).await.expect("serve");
    let (_, output) = transport.into_inner();

    let output = String::from_utf8(output).expect("UTF-8 output");
    let replies: Vec<Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line is JSON"))
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["id"], 2);
    assert!(replies[2]["result"]["tools"].is_array());
    assert_eq!(server.state(), ServerState::ShuttingDown);
}

// =============================================================================
// Board Tool Tests
// =============================================================================

#[test]
fn test_open_edit_save_with_backup() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, is_error) = call(
        &mut server,
        "create_net",
        json!({ "session_id": session, "name": "/NEW" }),
    );
    assert!(!is_error, "create_net failed: {value}");
    assert_eq!(value["status"], "applied");
    assert_eq!(value["revision"], 1);
    assert_eq!(value["record"]["target"], "net:5");

    let (value, is_error) = call(&mut server, "save_board", json!({ "session_id": session }));
    assert!(!is_error, "save_board failed: {value}");

    let saved = std::fs::read_to_string(&path).expect("saved file");
    assert!(saved.contains("(net 5 \"/NEW\")"));
    let backup = value["backup"].as_str().expect("backup path");
    assert!(backup.ends_with(".bak"));
    assert_eq!(std::fs::read_to_string(backup).expect("backup file"), SAMPLE);
}

#[test]
fn test_save_to_new_path_without_backup() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let copy = dir.path().join("copy.kicad_pcb");
    let (value, is_error) = call(
        &mut server,
        "save_board",
        json!({ "session_id": session, "filepath": copy.to_string_lossy() }),
    );
    assert!(!is_error, "save_board failed: {value}");
    assert!(value["backup"].is_null());
    assert_eq!(std::fs::read_to_string(&copy).expect("copy"), SAMPLE);
}

#[test]
fn test_paths_outside_allowed_directories_are_refused() {
    let allowed = test_temp_dir();
    let elsewhere = test_temp_dir();
    let path = write_sample(elsewhere.path());
    let mut server = server_for(allowed.path());

    let (value, is_error) = call(
        &mut server,
        "open_board",
        json!({ "filepath": path.to_string_lossy() }),
    );
    assert!(is_error);
    assert!(value.as_str().is_some_and(|m| m.contains("Access denied")));
}

#[test]
fn test_unparseable_board_reports_offset() {
    let dir = test_temp_dir();
    let path = dir.path().join("broken.kicad_pcb");
    std::fs::write(&path, "(kicad_pcb (version 1)").expect("write");
    let mut server = server_for(dir.path());

    let (value, is_error) = call(
        &mut server,
        "open_board",
        json!({ "filepath": path.to_string_lossy() }),
    );
    assert!(is_error);
    assert!(value.as_str().is_some_and(|m| m.contains("offset 0")));
}

#[test]
fn test_rejected_operation_is_flagged() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, is_error) = call(
        &mut server,
        "delete_component",
        json!({ "session_id": session, "reference": "U9" }),
    );
    assert!(is_error);
    assert_eq!(value["status"], "rejected");
    assert_eq!(value["record"]["reason"], "component 'U9' not found");
    assert_eq!(value["revision"], 0);
}

#[test]
fn test_route_trace_and_undo_through_tools() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, is_error) = call(
        &mut server,
        "route_trace",
        json!({
            "session_id": session,
            "start_x": 30.0, "start_y": 22.0,
            "end_x": 30.0, "end_y": 28.0,
            "width": 0.25,
            "net": 4,
            "avoid_obstacles": true
        }),
    );
    assert!(!is_error, "route_trace failed: {value}");
    assert_eq!(value["record"]["details"]["mode"], "pathfinder");

    let (traces, _) = call(
        &mut server,
        "list_traces",
        json!({ "session_id": session, "net": 4 }),
    );
    assert!(traces["segment_count"].as_u64().is_some_and(|n| n > 1));

    let (value, is_error) = call(&mut server, "undo", json!({ "session_id": session }));
    assert!(!is_error, "undo failed: {value}");
    let (traces, _) = call(
        &mut server,
        "list_traces",
        json!({ "session_id": session, "net": 4 }),
    );
    assert_eq!(traces["segment_count"], 0);

    let (history, _) = call(&mut server, "session_history", json!({ "session_id": session }));
    assert_eq!(history["revision"], 2);
    assert_eq!(history["undo_depth"], 0);
    assert_eq!(history["operations"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_invalid_operation_arguments() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, is_error) = call(
        &mut server,
        "route_trace",
        json!({ "session_id": session, "start_x": "left" }),
    );
    assert!(is_error);
    assert!(value.as_str().is_some_and(|m| m.starts_with("Invalid arguments")));

    let (value, is_error) = call(&mut server, "board_summary", json!({}));
    assert!(is_error);
    assert_eq!(value, "Missing required parameter: session_id");

    let (_, is_error) = call(&mut server, "no_such_tool", json!({}));
    assert!(is_error);
}

#[test]
fn test_list_components_filter_and_paging() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, _) = call(
        &mut server,
        "list_components",
        json!({ "session_id": session, "filter": "r*" }),
    );
    assert_eq!(value["total"], 1);
    assert_eq!(value["components"][0]["reference"], "R1");

    let (value, _) = call(
        &mut server,
        "list_components",
        json!({ "session_id": session, "offset": 1, "limit": 2 }),
    );
    assert_eq!(value["total"], 4);
    assert_eq!(value["returned"], 2);

    let (value, _) = call(
        &mut server,
        "list_components",
        json!({ "session_id": session, "layer": "B.Cu" }),
    );
    assert_eq!(value["total"], 1);
    assert_eq!(value["components"][0]["reference"], "C1");
}

#[test]
fn test_summary_is_cached_per_revision() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    call(&mut server, "board_summary", json!({ "session_id": session }));
    call(&mut server, "board_summary", json!({ "session_id": session }));
    call(
        &mut server,
        "delete_via",
        json!({ "session_id": session, "uuid": "via-gnd-1" }),
    );
    let (summary, _) = call(&mut server, "board_summary", json!({ "session_id": session }));
    assert_eq!(summary["summary"]["via_count"], 0);

    let (stats, _) = call(&mut server, "cache_stats", json!({}));
    assert_eq!(stats["summary_cache"]["hits"], 1);
    assert_eq!(stats["summary_cache"]["misses"], 2);
}

#[test]
fn test_discarded_session_cannot_be_saved() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (_, is_error) = call(&mut server, "discard_session", json!({ "session_id": session }));
    assert!(!is_error);
    let (_, is_error) = call(&mut server, "save_board", json!({ "session_id": session }));
    assert!(is_error);
    assert_eq!(server.sessions().sessions().count(), 1);
}

#[test]
fn test_discarded_session_summary_is_not_served_from_cache() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (_, is_error) = call(&mut server, "board_summary", json!({ "session_id": session }));
    assert!(!is_error);
    call(&mut server, "discard_session", json!({ "session_id": session }));

    let (value, is_error) = call(&mut server, "board_summary", json!({ "session_id": session }));
    assert!(is_error);
    assert!(value.as_str().is_some_and(|m| m.contains("not active")), "{value}");
    let (_, is_error) = call(&mut server, "list_nets", json!({ "session_id": session }));
    assert!(is_error);
}

#[test]
fn test_net_and_zone_tools() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server = server_for(dir.path());
    let session = open(&mut server, &path);

    let (value, is_error) = call(
        &mut server,
        "create_zone",
        json!({
            "session_id": session,
            "net_name": "+3V3",
            "layer": "F.Cu",
            "points": [{ "x": 5, "y": 5 }, { "x": 20, "y": 5 }, { "x": 20, "y": 10 }]
        }),
    );
    assert!(!is_error, "{value}");
    assert_eq!(value["status"], "applied");

    let (value, is_error) = call(
        &mut server,
        "assign_net",
        json!({ "session_id": session, "reference": "R1", "pad": "2", "net_name": "/SIG" }),
    );
    assert!(!is_error, "{value}");
    assert_eq!(value["record"]["target"], "pad:R1:2");

    let (value, is_error) = call(
        &mut server,
        "delete_net",
        json!({ "session_id": session, "name": "GND" }),
    );
    assert!(is_error);
    assert_eq!(value["status"], "rejected");

    let (value, is_error) = call(
        &mut server,
        "flip_component",
        json!({ "session_id": session, "reference": "C1" }),
    );
    assert!(!is_error, "{value}");

    let (summary, _) = call(&mut server, "board_summary", json!({ "session_id": session }));
    assert_eq!(summary["summary"]["zone_count"], 2);
    let (value, _) = call(
        &mut server,
        "list_components",
        json!({ "session_id": session, "layer": "B.Cu" }),
    );
    assert_eq!(value["total"], 0);
}

#[test]
fn test_large_listing_is_truncated() {
    let dir = test_temp_dir();
    let path = write_sample(dir.path());
    let mut server =
        McpServer::with_session_config(vec![dir.path().to_path_buf()], SessionConfig::default(), 1_500);
    let session = open(&mut server, &path);

    let (value, is_error) = call(&mut server, "list_components", json!({ "session_id": session }));
    assert!(!is_error);
    assert_eq!(value["_truncated"], true);
    let returned = value["components"].as_array().map_or(0, Vec::len);
    assert!(returned < 4);
}

// =============================================================================
// DRC Report Tests
// =============================================================================

#[test]
fn test_read_drc_report() {
    let dir = test_temp_dir();
    let report = dir.path().join("board-drc.json");
    std::fs::write(
        &report,
        r#"{
            "violations": [
                { "type": "clearance", "severity": "error", "description": "Clearance violation" },
                { "type": "silk_overlap", "severity": "warning", "description": "Silkscreen overlap" }
            ],
            "unconnected_items": []
        }"#,
    )
    .expect("write report");
    let mut server = server_for(dir.path());

    let (value, is_error) = call(
        &mut server,
        "read_drc_report",
        json!({ "filepath": report.to_string_lossy() }),
    );
    assert!(!is_error, "read_drc_report failed: {value}");
    assert_eq!(value["passed"], false);
    assert_eq!(value["error_count"], 1);
    assert_eq!(value["warning_count"], 1);
    assert_eq!(value["violations"][0]["type"], "clearance");
}

#[test]
fn test_read_drc_report_rejects_invalid_json() {
    let dir = test_temp_dir();
    let report = dir.path().join("broken-drc.json");
    std::fs::write(&report, "not a report").expect("write report");
    let mut server = server_for(dir.path());

    let (value, is_error) = call(
        &mut server,
        "read_drc_report",
        json!({ "filepath": report.to_string_lossy() }),
    );
    assert!(is_error);
    assert!(value.as_str().is_some_and(|m| m.starts_with("Invalid DRC report")));
}
