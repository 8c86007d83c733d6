//! Payload types for the well-known bus subjects

use crate::protocol::version::ProtocolVersion;

/// A tool/resource/prompt registration or removal
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationEvent {
    /// Name (or URI) of the registered entry
    pub name: String,
    /// Whether the entry was added (false = removed)
    pub added: bool,
}

/// A completed tool or prompt invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEvent {
    /// Name of the invoked entry
    pub name: String,
    /// Whether the invocation succeeded at the domain level
    pub success: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// A resource access or external change
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEvent {
    /// URI of the affected resource
    pub uri: String,
}

/// A session connecting, initializing, or disconnecting
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    /// Session identifier
    pub session_id: String,
    /// Negotiated protocol revision, once known
    pub version: Option<ProtocolVersion>,
}

/// A request that failed at the protocol level
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailedEvent {
    /// Method that failed
    pub method: String,
    /// JSON-RPC error code returned
    pub code: i32,
}
