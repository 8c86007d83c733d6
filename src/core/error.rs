//! Error types for the library
//!
//! Every fallible operation in the crate returns [`McpResult`]. The protocol
//! engine maps [`McpError`] variants onto JSON-RPC error codes via
//! [`McpError::jsonrpc_code`]; progress invariant violations carry a typed
//! [`ProgressError`] so callers can distinguish them without string matching.

use thiserror::Error;

use crate::protocol::types::error_codes;

/// The main error type for the library
#[derive(Error, Debug, Clone)]
pub enum McpError {
    /// Transport-related errors (connection, I/O, framing)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol-level errors (invalid messages, unexpected responses)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid URI format or content
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Requested tool was not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Requested resource was not found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Requested prompt was not found
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// Method not found (JSON-RPC error)
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters (JSON-RPC error)
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Request arrived before the initialize handshake completed
    #[error("Server not initialized: {0}")]
    NotInitialized(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection-related errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O errors from the standard library
    #[error("I/O error: {0}")]
    Io(String),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(String),

    /// Event bus errors (publish deadline exceeded, subject shut down)
    #[error("Event bus error: {0}")]
    Bus(String),

    /// Progress invariant violations
    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    /// Sub-process registry errors (spawn, readiness, shutdown)
    #[error("Process error: {0}")]
    Process(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Cancellation errors
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Typed progress subsystem failures
///
/// Violations never produce a wire notification; the reporter/token state is
/// left exactly as it was before the failing call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressError {
    /// The reporter or token has been deactivated
    #[error("progress reporter is inactive")]
    ReporterInactive,

    /// An update attempted to move progress backwards
    #[error("progress decreased: last {last}, attempted {attempted}")]
    ProgressDecreased { last: f64, attempted: f64 },

    /// An update exceeded the declared total
    #[error("progress {progress} overruns total {total}")]
    ProgressOverrunsTotal { progress: f64, total: f64 },

    /// A negative progress or total value was supplied
    #[error("negative value: {0}")]
    NegativeValue(f64),

    /// The token is not known to the manager
    #[error("unknown progress token: {0}")]
    UnknownToken(String),
}

// Manual From implementations for types that don't implement Clone
impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<url::ParseError> for McpError {
    fn from(err: url::ParseError) -> Self {
        McpError::Url(err.to_string())
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

impl McpError {
    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new process error
    pub fn process<S: Into<String>>(message: S) -> Self {
        Self::Process(message.into())
    }

    /// Create a new event bus error
    pub fn bus<S: Into<String>>(message: S) -> Self {
        Self::Bus(message.into())
    }

    /// The JSON-RPC error code used when this error crosses the wire
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_)
            | McpError::Validation(_)
            | McpError::InvalidUri(_)
            | McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_) => error_codes::INVALID_PARAMS,
            McpError::Protocol(_) => error_codes::INVALID_REQUEST,
            McpError::NotInitialized(_) => error_codes::SERVER_NOT_INITIALIZED,
            McpError::Cancelled(_) | McpError::Timeout(_) => error_codes::REQUEST_CANCELLED,
            McpError::Serialization(_) => error_codes::PARSE_ERROR,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            McpError::Connection(_) | McpError::Timeout(_) | McpError::Io(_) | McpError::Bus(_)
        )
    }

    /// Get the error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            McpError::Transport(_) => "transport",
            McpError::Protocol(_) => "protocol",
            McpError::Connection(_) => "connection",
            McpError::Timeout(_) => "timeout",
            McpError::Validation(_) | McpError::InvalidParams(_) | McpError::InvalidUri(_) => {
                "validation"
            }
            McpError::ToolNotFound(_)
            | McpError::ResourceNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::MethodNotFound(_) => "not_found",
            McpError::NotInitialized(_) => "lifecycle",
            McpError::Serialization(_) => "serialization",
            McpError::Io(_) => "io",
            McpError::Url(_) => "validation",
            McpError::Bus(_) => "bus",
            McpError::Progress(_) => "progress",
            McpError::Process(_) => "process",
            McpError::Cancelled(_) => "cancelled",
            McpError::Internal(_) => "internal",
        }
    }
}
