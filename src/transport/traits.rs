//! Transport seam
//!
//! The core is framing-neutral: a transport delivers whole frames to the
//! installed [`FrameHandler`] and writes whole frames on [`Transport::send`].
//! The handler's optional return value is the response frame for
//! request-reply transports; stream transports write it like any other
//! outbound frame.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::core::error::McpResult;

/// Callback invoked per received frame; returns an optional response frame
pub type FrameHandler =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Option<Vec<u8>>> + Send + Sync>;

/// Framing-neutral transport seam
#[async_trait]
pub trait Transport: Send + Sync {
    /// One-time setup before `start`
    async fn init(&mut self) -> McpResult<()> {
        Ok(())
    }

    /// Begin reading; received frames flow to the installed handler
    async fn start(&mut self) -> McpResult<()>;

    /// Stop reading and release I/O resources
    async fn stop(&mut self) -> McpResult<()>;

    /// Write one frame
    async fn send(&self, frame: &[u8]) -> McpResult<()>;

    /// Install the frame handler; must be called before `start`
    fn on_receive(&mut self, handler: FrameHandler);

    /// Whether the transport is currently usable
    fn is_connected(&self) -> bool {
        true
    }

    /// Human-readable connection description for diagnostics
    fn connection_info(&self) -> String {
        "unknown transport".to_string()
    }
}
