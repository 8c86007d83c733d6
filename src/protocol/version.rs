//! Protocol revisions and version negotiation
//!
//! The library speaks three MCP revisions. [`ProtocolVersion`] is a closed,
//! totally ordered set; every session records the revision negotiated at
//! `initialize` and the projector (see [`crate::protocol::projection`]) shapes
//! outbound values accordingly.
//!
//! Revision differences at a glance:
//!
//! | Concern | 2024-11-05 | 2025-03-26 | draft |
//! |---|---|---|---|
//! | Audio content (prompts/tools/sampling) | no | yes | yes |
//! | Progress notification `message` field | omitted | included | included |
//! | Sampling streaming chunks | no | yes | yes |
//! | SSE transport pattern | legacy two-endpoint | unified `/mcp` | unified |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::{McpError, McpResult};

/// A supported MCP protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProtocolVersion {
    /// The 2024-11-05 revision
    V2024_11_05,
    /// The 2025-03-26 revision (audio, progress messages, streamable HTTP)
    V2025_03_26,
    /// The in-development draft revision
    Draft,
}

/// All revisions this library speaks, in ascending order
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 3] = [
    ProtocolVersion::V2024_11_05,
    ProtocolVersion::V2025_03_26,
    ProtocolVersion::Draft,
];

/// JSON-RPC version string used on every envelope
pub const JSONRPC_VERSION: &str = "2.0";

impl ProtocolVersion {
    /// The wire identifier of this revision
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2024_11_05 => "2024-11-05",
            ProtocolVersion::V2025_03_26 => "2025-03-26",
            ProtocolVersion::Draft => "draft",
        }
    }

    /// The newest revision the library supports
    pub fn latest() -> Self {
        ProtocolVersion::Draft
    }

    /// The oldest revision the library supports
    pub fn oldest() -> Self {
        ProtocolVersion::V2024_11_05
    }

    /// Whether audio content blocks exist in this revision
    pub fn supports_audio(&self) -> bool {
        *self >= ProtocolVersion::V2025_03_26
    }

    /// Whether progress notifications carry a `message` field
    pub fn supports_progress_message(&self) -> bool {
        *self >= ProtocolVersion::V2025_03_26
    }

    /// Whether sampling responses may stream as chunk notifications
    pub fn supports_sampling_streaming(&self) -> bool {
        *self >= ProtocolVersion::V2025_03_26
    }

    /// Whether per-URI `notifications/resources/updated` is emitted
    pub fn supports_resource_updated(&self) -> bool {
        // Present in all three revisions; kept as a query point so a future
        // revision can gate it.
        true
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2024-11-05" => Ok(ProtocolVersion::V2024_11_05),
            "2025-03-26" => Ok(ProtocolVersion::V2025_03_26),
            "draft" => Ok(ProtocolVersion::Draft),
            other => Err(McpError::Protocol(format!(
                "unsupported protocol version: {other}"
            ))),
        }
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Select the session revision from the peer's requested version string.
///
/// The result is `min(peer_requested, max_supported)`. A peer that requests a
/// version we cannot parse is answered with our oldest revision and left to
/// decide whether to proceed.
pub fn negotiate(peer_requested: &str) -> ProtocolVersion {
    match ProtocolVersion::from_str(peer_requested) {
        Ok(peer) => peer.min(ProtocolVersion::latest()),
        Err(_) => ProtocolVersion::oldest(),
    }
}

/// Validate a version string against the supported set
pub fn parse_supported(version: &str) -> McpResult<ProtocolVersion> {
    version.parse()
}
