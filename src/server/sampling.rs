//! Sampling router
//!
//! Server→client `sampling/createMessage` rides the shared outbound
//! correlation path in the engine. Streaming responses arrive as
//! `notifications/sampling/chunk` correlated by the outbound request id; the
//! router fans chunks out to the caller that issued the request, and the
//! final response closes the stream.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::messages::SamplingChunkParams;

/// Routes streaming sampling chunks to their originating request
#[derive(Default)]
pub struct SamplingRouter {
    streams: Mutex<HashMap<i64, mpsc::UnboundedSender<SamplingChunkParams>>>,
}

impl SamplingRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a chunk stream for an outbound request id
    pub fn open_stream(&self, request_id: i64) -> mpsc::UnboundedReceiver<SamplingChunkParams> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .expect("sampling streams poisoned")
            .insert(request_id, tx);
        rx
    }

    /// Route an inbound chunk notification. Chunks for unknown requests are
    /// logged and dropped.
    pub fn route_chunk(&self, params: SamplingChunkParams) {
        let Some(id) = params.request_id.as_i64() else {
            debug!("sampling chunk with non-integer request id dropped");
            return;
        };
        let streams = self.streams.lock().expect("sampling streams poisoned");
        match streams.get(&id) {
            Some(tx) => {
                if tx.send(params).is_err() {
                    debug!(request_id = id, "sampling chunk receiver gone");
                }
            }
            None => debug!(request_id = id, "sampling chunk for unknown request dropped"),
        }
    }

    /// Close the stream once the final response arrived
    pub fn close_stream(&self, request_id: i64) {
        self.streams
            .lock()
            .expect("sampling streams poisoned")
            .remove(&request_id);
    }

    /// Number of open streams
    pub fn open_count(&self) -> usize {
        self.streams.lock().expect("sampling streams poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::ContentBlock;
    use serde_json::json;

    fn chunk(id: i64, index: u32, text: &str) -> SamplingChunkParams {
        SamplingChunkParams {
            request_id: json!(id),
            content: ContentBlock::text(text),
            index,
        }
    }

    #[tokio::test]
    async fn test_chunks_route_by_request_id() {
        let router = SamplingRouter::new();
        let mut rx = router.open_stream(7);

        router.route_chunk(chunk(7, 0, "Hel"));
        router.route_chunk(chunk(7, 1, "lo"));
        router.route_chunk(chunk(9, 0, "other")); // unknown, dropped

        assert_eq!(rx.recv().await.unwrap().index, 0);
        assert_eq!(rx.recv().await.unwrap().index, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_stream_stops_routing() {
        let router = SamplingRouter::new();
        let mut rx = router.open_stream(1);
        router.close_stream(1);
        router.route_chunk(chunk(1, 0, "late"));
        assert!(rx.recv().await.is_none());
        assert_eq!(router.open_count(), 0);
    }
}
