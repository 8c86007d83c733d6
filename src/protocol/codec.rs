//! JSON-RPC wire codec
//!
//! Decoding turns raw frames into envelopes (or a batch of them) and encodes
//! the standard error replies for malformed input. Batch members are
//! validated independently: a malformed member yields an error response with
//! a null id without invalidating its siblings.

use serde_json::Value;

use crate::core::error::{McpError, McpResult};
use crate::protocol::types::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, error_codes,
};

/// One decoded envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A request expecting a response
    Request(JsonRpcRequest),
    /// A notification (no response)
    Notification(JsonRpcNotification),
    /// A response to an outbound request
    Response(JsonRpcResponse),
    /// An error response to an outbound request
    Error(JsonRpcError),
    /// A member that failed validation; carries the reply to emit in place
    Invalid(JsonRpcError),
}

impl Envelope {
    /// Whether this envelope produces a response element
    pub fn expects_response(&self) -> bool {
        matches!(self, Envelope::Request(_) | Envelope::Invalid(_))
    }
}

/// Result of decoding one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A single envelope
    Single(Envelope),
    /// A batch of ≥1 envelopes, in input order
    Batch(Vec<Envelope>),
    /// The frame could not produce envelopes; reply with this error
    Reject(JsonRpcError),
}

/// Decode one frame of bytes into envelopes.
///
/// Contracts:
/// - invalid JSON → `Reject(-32700)`
/// - top-level value that is neither object nor non-empty array →
///   `Reject(-32600)` (the empty array case included)
/// - batch members are validated independently
pub fn decode_message(bytes: &[u8]) -> Decoded {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(v) => v,
        Err(e) => {
            return Decoded::Reject(JsonRpcError::error(
                Value::Null,
                error_codes::PARSE_ERROR,
                format!("Parse error: {e}"),
                None,
            ));
        }
    };

    match value {
        Value::Object(_) => Decoded::Single(decode_envelope(value)),
        Value::Array(members) => {
            if members.is_empty() {
                return Decoded::Reject(JsonRpcError::invalid_request());
            }
            Decoded::Batch(members.into_iter().map(decode_envelope).collect())
        }
        _ => Decoded::Reject(JsonRpcError::invalid_request()),
    }
}

/// Decode a single JSON value into an envelope.
///
/// A member whose `id` is absent or `null` is a notification per JSON-RPC;
/// members carrying `result` or `error` are responses to our own requests.
fn decode_envelope(value: Value) -> Envelope {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return Envelope::Invalid(JsonRpcError::invalid_request()),
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Envelope::Invalid(JsonRpcError::invalid_request());
    }

    // Responses carry result/error instead of method.
    if obj.contains_key("result") {
        return match serde_json::from_value::<JsonRpcResponse>(Value::Object(obj.clone())) {
            Ok(resp) => Envelope::Response(resp),
            Err(_) => Envelope::Invalid(JsonRpcError::invalid_request()),
        };
    }
    if obj.contains_key("error") {
        return match serde_json::from_value::<JsonRpcError>(Value::Object(obj.clone())) {
            Ok(err) => Envelope::Error(err),
            Err(_) => Envelope::Invalid(JsonRpcError::invalid_request()),
        };
    }

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => return Envelope::Invalid(JsonRpcError::invalid_request()),
    };
    let params = obj.get("params").cloned();

    match obj.get("id") {
        None | Some(Value::Null) => Envelope::Notification(JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method,
            params,
        }),
        Some(id @ (Value::String(_) | Value::Number(_))) => Envelope::Request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method,
            params,
        }),
        Some(_) => Envelope::Invalid(JsonRpcError::invalid_request()),
    }
}

/// Encode a success response to bytes
pub fn encode_response(response: &JsonRpcResponse) -> McpResult<Vec<u8>> {
    serde_json::to_vec(response).map_err(McpError::from)
}

/// Encode an error response to bytes
pub fn encode_error(error: &JsonRpcError) -> McpResult<Vec<u8>> {
    serde_json::to_vec(error).map_err(McpError::from)
}

/// Encode a notification to bytes
pub fn encode_notification(notification: &JsonRpcNotification) -> McpResult<Vec<u8>> {
    serde_json::to_vec(notification).map_err(McpError::from)
}

/// Encode a batch of response values. Returns `None` when the batch is empty
/// (an all-notification input batch produces no transport write).
pub fn encode_batch(responses: &[Value]) -> McpResult<Option<Vec<u8>>> {
    if responses.is_empty() {
        return Ok(None);
    }
    serde_json::to_vec(responses).map(Some).map_err(McpError::from)
}
