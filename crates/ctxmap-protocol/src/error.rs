//! Error codes and the JSON-RPC error object.
//!
//! Codes below -32000 are the JSON-RPC 2.0 reserved ones. The -32000..-32004
//! range covers the ways a request can fail around its scope: no scope
//! attached, server not running, deadline hit, blocked by middleware.

use serde::{Deserialize, Serialize};

/// Every error code the server can produce. Serialized as the bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum RpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    /// The request handle has no scope in the registry.
    NoScope = -32000,
    ServerNotInitialized = -32001,
    ServerShuttingDown = -32002,
    /// The request deadline expired and its scope was cancelled.
    RequestCancelled = -32003,
    /// A middleware refused the request.
    Blocked = -32004,
}

impl RpcErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<RpcErrorCode> for i32 {
    fn from(code: RpcErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for RpcErrorCode {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Ok(match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::NoScope,
            -32001 => Self::ServerNotInitialized,
            -32002 => Self::ServerShuttingDown,
            -32003 => Self::RequestCancelled,
            -32004 => Self::Blocked,
            other => return Err(format!("unknown error code {other}")),
        })
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured detail, e.g. the parser's message.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(detail: impl std::fmt::Display) -> Self {
        Self::new(RpcErrorCode::ParseError, "Failed to parse JSON")
            .with_data(serde_json::json!({ "detail": detail.to_string() }))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(RpcErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    pub fn no_scope() -> Self {
        Self::new(RpcErrorCode::NoScope, "No scope attached to this request")
    }

    pub fn not_initialized() -> Self {
        Self::new(RpcErrorCode::ServerNotInitialized, "Server is not initialized")
    }

    pub fn shutting_down() -> Self {
        Self::new(RpcErrorCode::ServerShuttingDown, "Server is shutting down")
    }

    pub fn cancelled(deadline: std::time::Duration) -> Self {
        Self::new(
            RpcErrorCode::RequestCancelled,
            format!("Request exceeded {}ms deadline", deadline.as_millis()),
        )
    }

    /// Middleware refusal. Falls back to a generic message when the
    /// middleware gave no feedback.
    pub fn blocked(feedback: Option<String>) -> Self {
        Self::new(
            RpcErrorCode::Blocked,
            feedback.unwrap_or_else(|| "Request blocked by middleware".into()),
        )
    }

    pub fn error_code(&self) -> RpcErrorCode {
        self.code
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({}): {}", self.code, self.code.code(), self.message)
    }
}

impl std::error::Error for RpcError {}
