//! Per-request execution context
//!
//! Every dispatched request hands its handler a [`RequestContext`] carrying
//! the request id, the cancellation token installed by the cancellation
//! fabric, and the progress token extracted from `params._meta`.

use tokio_util::sync::CancellationToken;

use crate::protocol::types::RequestId;

/// Context passed to tool/resource/prompt handlers for one invocation
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Id of the request being serviced
    pub request_id: RequestId,
    /// Cancellation signal; resolved by `notifications/cancelled`
    pub cancellation: CancellationToken,
    /// Progress token from `params._meta.progressToken`, when supplied
    pub progress_token: Option<String>,
}

impl RequestContext {
    /// Build a context for the given request id
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            cancellation: CancellationToken::new(),
            progress_token: None,
        }
    }

    /// Attach a progress token
    pub fn with_progress_token(mut self, token: Option<String>) -> Self {
        self.progress_token = token;
        self
    }

    /// Whether the request has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Await cancellation; completes when the peer cancels the request
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let ctx = RequestContext::new(json!(1));
        assert!(!ctx.is_cancelled());
        ctx.cancellation.cancel();
        assert!(ctx.is_cancelled());
        ctx.cancelled().await; // resolves immediately once cancelled
    }

    #[test]
    fn test_progress_token_attachment() {
        let ctx = RequestContext::new(json!("a")).with_progress_token(Some("tok".into()));
        assert_eq!(ctx.progress_token.as_deref(), Some("tok"));
    }
}
