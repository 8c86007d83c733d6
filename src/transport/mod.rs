//! Transport layer
//!
//! The core sees only the framing-neutral [`Transport`] seam. Stdio ships
//! with the crate because the sub-process registry depends on it; richer
//! transports (HTTP, SSE, WebSocket) live outside the library behind the
//! same trait.

pub mod traits;

#[cfg(feature = "stdio")]
pub mod stdio;

pub use traits::{FrameHandler, Transport};

#[cfg(feature = "stdio")]
pub use stdio::{StdioClientTransport, StdioServerTransport};
