//! Argument completion seam
//!
//! `completion/complete` requests reference a prompt (by name) or resource
//! (by URI) and ask for candidate values for one argument. Servers register
//! completion handlers alongside the referenced entries.

use async_trait::async_trait;

use crate::core::error::McpResult;
use crate::protocol::messages::{CompletionArgument, CompletionData};

/// Trait for implementing argument completion
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Produce candidate values for the argument being completed
    async fn complete(&self, argument: &CompletionArgument) -> McpResult<CompletionData>;
}

/// Completion over a fixed candidate list, filtered by prefix
pub struct StaticCompletionHandler {
    candidates: Vec<String>,
}

impl StaticCompletionHandler {
    /// Create a handler over a fixed candidate set
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl CompletionHandler for StaticCompletionHandler {
    async fn complete(&self, argument: &CompletionArgument) -> McpResult<CompletionData> {
        let values: Vec<String> = self
            .candidates
            .iter()
            .filter(|c| c.starts_with(&argument.value))
            .cloned()
            .collect();
        let total = values.len() as u32;
        Ok(CompletionData {
            values,
            total: Some(total),
            has_more: Some(false),
        })
    }
}
