//! MCP server for KiCad board editing.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: EOF on stdin, SIGINT or SIGTERM
//!
//! Message handling is synchronous: [`McpServer::handle_line`] turns one
//! input line into at most one output line. The async loop only moves lines
//! between the transport and that function.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::cache::SharedCache;
use crate::config::Config;
use crate::kicad::board::Point;
use crate::kicad::drc::DrcReport;
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::tools::{
    self, optional_str, optional_usize, parse_args, required_str, session_id, truncate_response,
    ToolCallResult,
};
use crate::mcp::transport::{StdioTransport, Transport};
use crate::session::{SessionConfig, SessionManager, SessionState};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Tools that go through the session manager's operation contract.
const OPERATIONS: &[&str] = &[
    "add_board_text",
    "route_trace",
    "add_via",
    "create_net",
    "move_component",
    "delete_component",
    "delete_trace",
    "delete_via",
    "flip_component",
    "delete_net",
    "assign_net",
    "create_zone",
    "set_board_outline",
    "undo",
];

/// The MCP server.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Directories board and report files must live in.
    allowed_paths: Vec<PathBuf>,
    /// Open editing sessions.
    sessions: SessionManager,
    /// Board summaries keyed by session and revision.
    summaries: SharedCache<String, Value>,
    /// Ceiling for tool response text.
    max_response_chars: usize,
}

impl McpServer {
    /// Creates a server from a loaded configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_session_config(
            config.allowed_paths.clone(),
            config.session_config(),
            config.response.max_chars,
        )
    }

    /// Creates a server with explicit settings.
    #[must_use]
    pub fn with_session_config(
        allowed_paths: Vec<PathBuf>,
        session_config: SessionConfig,
        max_response_chars: usize,
    ) -> Self {
        let summaries = SharedCache::new(
            session_config.route_cache_size,
            session_config.route_cache_ttl,
        );
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            allowed_paths,
            sessions: SessionManager::new(session_config),
            summaries,
            max_response_chars,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// The session manager behind the tools.
    #[must_use]
    pub const fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Validates that a path is within one of the allowed paths.
    ///
    /// Returns `Ok(())` if the path is allowed, or an error message if not.
    fn validate_path(&self, filepath: &str) -> Result<(), String> {
        if self.allowed_paths.is_empty() {
            return Ok(());
        }

        let path = Path::new(filepath);

        // Files that do not exist yet are resolved through their parent.
        let canonical_path = if path.exists() {
            path.canonicalize()
                .map_err(|e| format!("Failed to resolve path '{}': {e}", path.display()))?
        } else {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let filename = path.file_name().ok_or_else(|| {
                format!("Invalid path '{}': no filename specified", path.display())
            })?;
            let canonical_parent = parent.canonicalize().map_err(|e| {
                format!(
                    "Parent directory '{}' does not exist or is inaccessible: {e}",
                    parent.display()
                )
            })?;
            canonical_parent.join(filename)
        };

        let allowed = self
            .allowed_paths
            .iter()
            .filter_map(|p| p.canonicalize().ok())
            .any(|p| canonical_path.starts_with(p));
        if allowed {
            Ok(())
        } else {
            Err("Access denied: path is outside the configured allowed directories".to_string())
        }
    }

    /// Serves stdin/stdout until EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Serves `transport` until its input is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, transport: &mut Transport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = transport.read_line().await;
            if self.process(transport, line).await? {
                return Ok(());
            }
        }
    }

    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.process(transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.process(transport, line).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles one transport read. Returns `true` if the server should stop.
    async fn process<R, W>(
        &mut self,
        transport: &mut Transport<R, W>,
        line: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = line? else {
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };
        if let Some(reply) = self.handle_line(&line) {
            transport.write_line(&reply).await?;
        }
        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one line of input and returns the serialised reply, if any.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        if line.trim().is_empty() {
            return None;
        }
        let reply = match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => match self.handle_request(&req) {
                Ok(response) => serde_json::to_string(&response),
                Err(error) => serde_json::to_string(&error),
            },
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                return None;
            }
            Err(error) => serde_json::to_string(&error),
        };
        match reply {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Failed to serialise reply");
                None
            }
        }
    }

    fn handle_request(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        debug!(id = %req.id, method = %req.method, "Request");
        match req.method.as_str() {
            "initialize" => self.handle_initialize(req),
            "tools/list" => {
                self.require_running(&req.id)?;
                Ok(JsonRpcResponse::success(
                    req.id.clone(),
                    json!({ "tools": tools::definitions() }),
                ))
            }
            "tools/call" => self.handle_tools_call(req),
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            info!(
                protocol = self.protocol_version.as_deref().unwrap_or("-"),
                "Client initialised"
            );
            self.state = ServerState::Running;
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                ErrorCode::InvalidRequest,
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req.parse_params("initialize")?;
        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("-"),
                requested = %params.protocol_version,
                "Initialising"
            );
        }

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": ServerInfo::default(),
            }),
        ))
    }

    fn handle_tools_call(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let params: ToolCallParams = req.parse_params("tool call")?;
        let result = self.call_tool(&params.name, &params.arguments);
        let value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise result")
        })?;
        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }

    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state == ServerState::Running {
            Ok(())
        } else {
            Err(JsonRpcError::new(
                Some(id.clone()),
                ErrorCode::InvalidRequest,
                "Server not initialised",
            ))
        }
    }

    /// Runs one tool and wraps its outcome for the client.
    ///
    /// Rejected operations and tool failures are flagged with `isError`.
    pub fn call_tool(&mut self, name: &str, arguments: &Value) -> ToolCallResult {
        let outcome = match name {
            "open_board" => self.call_open_board(arguments),
            "save_board" => self.call_save_board(arguments),
            "discard_session" => self.call_discard_session(arguments),
            "session_history" => self.call_session_history(arguments),
            "board_summary" => self.call_board_summary(arguments),
            "list_components" => self.call_list_components(arguments),
            "list_nets" => self.call_list_nets(arguments),
            "list_traces" => self.call_list_traces(arguments),
            "get_ratsnest" => self.call_get_ratsnest(arguments),
            "read_drc_report" => self.call_read_drc_report(arguments),
            "cache_stats" => Ok(self.cache_stats()),
            op if OPERATIONS.contains(&op) => self.call_operation(op, arguments),
            _ => Err(format!("Unknown tool: {name}")),
        };

        match outcome {
            Ok(value) => {
                let rejected = value.get("status").and_then(Value::as_str) == Some("rejected");
                let text = truncate_response(value, self.max_response_chars);
                if rejected {
                    ToolCallResult::error(text)
                } else {
                    ToolCallResult::text(text)
                }
            }
            Err(message) => {
                debug!(tool = name, error = %message, "Tool failed");
                ToolCallResult::error(message)
            }
        }
    }

    fn call_open_board(&mut self, arguments: &Value) -> Result<Value, String> {
        let filepath = required_str(arguments, "filepath")?;
        self.validate_path(filepath)?;
        let text = std::fs::read_to_string(filepath)
            .map_err(|e| format!("Failed to read '{filepath}': {e}"))?;
        let id = self
            .sessions
            .open(&text, Some(filepath.to_string()))
            .map_err(|e| format!("Failed to parse '{filepath}': {e}"))?;
        let summary = self.sessions.summary(&id).map_err(|e| e.to_string())?;
        Ok(json!({
            "status": "success",
            "session_id": id,
            "filepath": filepath,
            "summary": summary,
        }))
    }

    fn call_save_board(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let session = self.sessions.session(&id).map_err(|e| e.to_string())?;
        let target = optional_str(arguments, "filepath")
            .or_else(|| session.source())
            .map(str::to_string)
            .ok_or("No filepath given and the session was not opened from a file")?;
        self.validate_path(&target)?;
        let text = self.sessions.snapshot(&id).map_err(|e| e.to_string())?;

        let target_path = Path::new(&target);
        let want_backup = arguments.get("backup").and_then(Value::as_bool).unwrap_or(true);
        let backup = if want_backup && target_path.exists() {
            let backup = backup_path(target_path, chrono::Local::now());
            std::fs::copy(target_path, &backup)
                .map_err(|e| format!("Failed to back up '{target}': {e}"))?;
            Some(backup)
        } else {
            None
        };
        std::fs::write(target_path, &text).map_err(|e| format!("Failed to write '{target}': {e}"))?;
        info!(session = %id, path = %target, bytes = text.len(), "Board saved");

        Ok(json!({
            "status": "success",
            "filepath": target,
            "bytes": text.len(),
            "backup": backup.map(|p| p.display().to_string()),
        }))
    }

    fn call_discard_session(&mut self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        self.sessions.discard(&id).map_err(|e| e.to_string())?;
        Ok(json!({ "status": "success", "session_id": id, "state": SessionState::Discarded }))
    }

    fn call_session_history(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let session = self.sessions.session(&id).map_err(|e| e.to_string())?;
        let history = self.sessions.history(&id).map_err(|e| e.to_string())?;
        Ok(json!({
            "status": "success",
            "session_id": id,
            "state": session.state(),
            "revision": session.revision(),
            "undo_depth": session.undo_depth(),
            "operations": history,
        }))
    }

    fn call_board_summary(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let session = self.sessions.session(&id).map_err(|e| e.to_string())?;
        session.require_active().map_err(|e| e.to_string())?;
        let revision = session.revision();
        let key = format!("{id}:{revision}");
        if let Some(cached) = self.summaries.get(&key) {
            return Ok(cached);
        }
        let summary = self.sessions.summary(&id).map_err(|e| e.to_string())?;
        let value = json!({ "status": "success", "session_id": id, "revision": revision, "summary": summary });
        self.summaries.set(key, value.clone());
        Ok(value)
    }

    fn call_list_components(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let filter = optional_str(arguments, "filter").map(tools::glob_regex).transpose()?;
        let layer = optional_str(arguments, "layer")
            .map(|l| self.sessions.config().layer_aliases.normalize(l).to_string());
        let offset = optional_usize(arguments, "offset").unwrap_or(0);
        let limit = optional_usize(arguments, "limit");

        let matching: Vec<_> = self
            .sessions
            .components(&id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .filter(|c| {
                filter
                    .as_ref()
                    .map_or(true, |re| re.is_match(&c.reference) || re.is_match(&c.value))
            })
            .filter(|c| layer.as_ref().map_or(true, |l| &c.layer == l))
            .collect();
        let total = matching.len();
        let page: Vec<_> = matching
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        Ok(json!({
            "status": "success",
            "total": total,
            "offset": offset,
            "returned": page.len(),
            "components": page,
        }))
    }

    fn call_list_nets(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let filter = optional_str(arguments, "filter").map(tools::glob_regex).transpose()?;
        let nets: Vec<_> = self
            .sessions
            .nets(&id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .filter(|n| filter.as_ref().map_or(true, |re| re.is_match(&n.name)))
            .collect();
        Ok(json!({ "status": "success", "count": nets.len(), "nets": nets }))
    }

    fn call_list_traces(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let net = arguments
            .get("net")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        let keep = |n: u32| net.map_or(true, |want| want == n);
        let segments: Vec<_> = self
            .sessions
            .segments(&id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .filter(|s| keep(s.net))
            .collect();
        let vias: Vec<_> = self
            .sessions
            .vias(&id)
            .map_err(|e| e.to_string())?
            .into_iter()
            .filter(|v| keep(v.net))
            .collect();
        let length: f64 = segments.iter().map(|s| s.start.distance(s.end)).sum();
        Ok(json!({
            "status": "success",
            "segment_count": segments.len(),
            "via_count": vias.len(),
            "total_length": length,
            "segments": segments,
            "vias": vias,
        }))
    }

    fn call_get_ratsnest(&self, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let nets = self.sessions.ratsnest(&id).map_err(|e| e.to_string())?;
        Ok(json!({ "status": "success", "unrouted_nets": nets.len(), "nets": nets }))
    }

    fn call_read_drc_report(&self, arguments: &Value) -> Result<Value, String> {
        let filepath = required_str(arguments, "filepath")?;
        self.validate_path(filepath)?;
        let text = std::fs::read_to_string(filepath)
            .map_err(|e| format!("Failed to read '{filepath}': {e}"))?;
        let report =
            DrcReport::from_json(&text).map_err(|e| format!("Invalid DRC report: {e}"))?;
        let diagnostics = optional_str(arguments, "diagnostics").unwrap_or("");
        let result = report.classify(diagnostics, Some(filepath));
        serde_json::to_value(result).map_err(|e| e.to_string())
    }

    fn cache_stats(&self) -> Value {
        json!({
            "summary_cache": self.summaries.stats(),
            "route_cache": self.sessions.route_cache_stats(),
        })
    }

    fn call_operation(&mut self, operation: &str, arguments: &Value) -> Result<Value, String> {
        let id = session_id(arguments)?;
        let sessions = &mut self.sessions;
        let record = match operation {
            "add_board_text" => sessions.add_board_text(&id, &parse_args(arguments)?),
            "route_trace" => sessions.route_trace(&id, &parse_args(arguments)?),
            "add_via" => sessions.add_via(&id, &parse_args(arguments)?),
            "create_net" => sessions.create_net(&id, required_str(arguments, "name")?),
            "move_component" => sessions.move_component(&id, &parse_args(arguments)?),
            "delete_component" => {
                sessions.delete_component(&id, required_str(arguments, "reference")?)
            }
            "delete_trace" => sessions.delete_trace(&id, required_str(arguments, "uuid")?),
            "delete_via" => sessions.delete_via(&id, required_str(arguments, "uuid")?),
            "flip_component" => {
                sessions.flip_component(&id, required_str(arguments, "reference")?)
            }
            "delete_net" => sessions.delete_net(&id, required_str(arguments, "name")?),
            "assign_net" => sessions.assign_net(&id, &parse_args(arguments)?),
            "create_zone" => sessions.create_zone(&id, &parse_args(arguments)?),
            "set_board_outline" => {
                let points: Vec<Point> = arguments
                    .get("points")
                    .cloned()
                    .ok_or("Missing required parameter: points")
                    .and_then(|p| {
                        serde_json::from_value(p).map_err(|_| "points must be a list of {x, y}")
                    })?;
                sessions.set_board_outline(&id, &points)
            }
            "undo" => sessions.undo(&id),
            _ => return Err(format!("Unknown tool: {operation}")),
        }
        .map_err(|e| e.to_string())?;

        let revision = self
            .sessions
            .session(&id)
            .map(|s| s.revision())
            .unwrap_or_default();
        Ok(json!({
            "status": if record.applied { "applied" } else { "rejected" },
            "session_id": id,
            "revision": revision,
            "record": record.summary(),
        }))
    }
}

/// `board.kicad_pcb` becomes `board.kicad_pcb.20260102-030405.bak`.
fn backup_path(path: &Path, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "board".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!("{name}.{}.bak", now.format("%Y%m%d-%H%M%S")))
}
