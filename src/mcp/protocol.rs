//! JSON-RPC 2.0 message types for the MCP protocol.
//!
//! Requests carry an `id` and get exactly one response; notifications carry
//! no `id` and get none. Per MCP, ids are strings or integers, never `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "kicad-pcb-mcp";

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Deserialises the request parameters into `T`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params error if the parameters are missing or do
    /// not match `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(
        &self,
        what: &str,
    ) -> Result<T, JsonRpcError> {
        let params = self.params.clone().ok_or_else(|| {
            JsonRpcError::invalid_params(self.id.clone(), format!("Missing {what} params"))
        })?;
        serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(self.id.clone(), format!("Invalid {what} params: {e}"))
        })
    }
}

/// A JSON-RPC 2.0 notification message.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Must be "2.0".
    pub jsonrpc: String,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this response corresponds to.
    pub id: RequestId,

    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The request ID this error corresponds to (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error response with a custom message.
    #[must_use]
    pub fn new(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: JsonRpcErrorData {
                code: code.code(),
                message: message.into(),
                data: None,
            },
        }
    }

    /// Creates an error response with the code's default message.
    #[must_use]
    pub fn from_code(id: Option<RequestId>, code: ErrorCode) -> Self {
        Self::new(id, code, code.default_message())
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.error.data = Some(data);
        self
    }

    /// Creates a parse error response (ID cannot be determined).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::from_code(None, ErrorCode::ParseError)
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::from_code(id, ErrorCode::InvalidRequest)
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InvalidParams, message)
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InternalError, message)
    }
}

/// An incoming message that could be either a request or notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

impl IncomingMessage {
    /// Returns the method name of this message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }

    /// Returns the request ID if this is a request.
    #[must_use]
    pub const fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Notification(_) => None,
        }
    }
}

/// Parses one line of JSON into an incoming message.
///
/// # Errors
///
/// Returns a parse error for malformed JSON and an invalid-request error for
/// JSON that is not a JSON-RPC 2.0 message.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;
    let obj = value.as_object().ok_or_else(|| JsonRpcError::invalid_request(None))?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request(None));
    }

    if obj.contains_key("id") {
        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        if request.method.is_empty() {
            return Err(JsonRpcError::invalid_request(Some(request.id)));
        }
        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        Ok(IncomingMessage::Notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_request() {
        let json = r#"{"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "undo"}}"#;
        let msg = parse_message(json).unwrap();

        let IncomingMessage::Request(req) = msg else {
            panic!("Expected Request, got Notification");
        };
        assert_eq!(req.id, RequestId::Number(1));
        assert_eq!(req.method, "tools/call");
    }

    #[test]
    fn parse_valid_notification() {
        let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.id().is_none());
        assert_eq!(msg.method(), "notifications/initialized");
    }

    #[test]
    fn parse_rejects_bad_envelopes() {
        assert_eq!(
            parse_message("not valid json").unwrap_err().error.code,
            ErrorCode::ParseError.code()
        );
        for json in [
            r#"{"id": 1, "method": "test"}"#,
            r#"{"jsonrpc": "1.0", "id": 1, "method": "test"}"#,
            r#"[1, 2]"#,
            r#"{"jsonrpc": "2.0", "id": null, "method": "test"}"#,
        ] {
            assert_eq!(
                parse_message(json).unwrap_err().error.code,
                ErrorCode::InvalidRequest.code(),
                "{json}"
            );
        }
        let empty = parse_message(r#"{"jsonrpc": "2.0", "id": "a", "method": ""}"#).unwrap_err();
        assert_eq!(empty.id, Some(RequestId::String("a".into())));
    }

    #[test]
    fn params_are_typed() {
        #[derive(Deserialize)]
        struct Params {
            name: String,
        }
        let IncomingMessage::Request(req) =
            parse_message(r#"{"jsonrpc": "2.0", "id": 7, "method": "m", "params": {"name": "x"}}"#)
                .unwrap()
        else {
            panic!("Expected Request");
        };
        assert_eq!(req.parse_params::<Params>("m").unwrap().name, "x");

        let IncomingMessage::Request(bare) =
            parse_message(r#"{"jsonrpc": "2.0", "id": 8, "method": "m"}"#).unwrap()
        else {
            panic!("Expected Request");
        };
        let err = bare.parse_params::<Params>("m").err().unwrap();
        assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
        assert_eq!(err.error.message, "Missing m params");
    }

    #[test]
    fn serialise_error_response() {
        let error = JsonRpcError::method_not_found(RequestId::Number(1), "unknown/method")
            .with_data(serde_json::json!({"hint": "tools/list"}));
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""code":-32601"#));
        assert!(json.contains("unknown/method"));
        assert!(json.contains(r#""hint":"tools/list""#));
    }

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId::Number(42).to_string(), "42");
        assert_eq!(RequestId::String("abc".to_string()).to_string(), "abc");
    }
}
