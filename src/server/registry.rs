//! Handler registry
//!
//! Tools and prompts are keyed by name; resources keep registration order
//! with exact-URI entries checked before templates. Lookups in the dispatch
//! hot path clone an `Arc` snapshot and never hold a lock while matching or
//! calling handlers; mutations rebuild the snapshot and swap the pointer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::bus::events::RegistrationEvent;
use crate::bus::{EventBus, SubjectConfig, topics};
use crate::core::completion::CompletionHandler;
use crate::core::error::{McpError, McpResult};
use crate::core::prompt::PromptEntry;
use crate::core::resource::{ResourceEntry, ResourceHandler, ResourceTemplateEntry};
use crate::core::tool::ToolEntry;

/// Which enumerable list a change notification refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Tools,
    Resources,
    Prompts,
}

/// Target of a registered completion handler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompletionTarget {
    /// Completion for a prompt argument
    Prompt(String),
    /// Completion for a resource template argument
    Resource(String),
}

/// Immutable view of all registered handlers
#[derive(Default, Clone)]
pub struct RegistrySnapshot {
    tools: HashMap<String, ToolEntry>,
    prompts: HashMap<String, PromptEntry>,
    resources: Vec<ResourceEntry>,
    resource_index: HashMap<String, usize>,
    /// Kept sorted by descending literal-character count
    templates: Vec<ResourceTemplateEntry>,
    completions: HashMap<CompletionTarget, Arc<dyn CompletionHandler>>,
}

impl RegistrySnapshot {
    /// Look up a tool by name
    pub fn tool(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    /// Look up a prompt by name
    pub fn prompt(&self, name: &str) -> Option<&PromptEntry> {
        self.prompts.get(name)
    }

    /// All tools in arbitrary order
    pub fn tools(&self) -> Vec<&ToolEntry> {
        self.tools.values().collect()
    }

    /// All prompts in arbitrary order
    pub fn prompts(&self) -> Vec<&PromptEntry> {
        self.prompts.values().collect()
    }

    /// All exact resources in registration order
    pub fn resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    /// All templates in precedence order
    pub fn templates(&self) -> &[ResourceTemplateEntry] {
        &self.templates
    }

    /// Completion handler for a target
    pub fn completion(&self, target: &CompletionTarget) -> Option<Arc<dyn CompletionHandler>> {
        self.completions.get(target).cloned()
    }

    /// Resolve a concrete URI to a handler and its template captures.
    ///
    /// Exact entries win; among templates the one with the most literal
    /// characters that captures the URI wins.
    pub fn resolve_resource(
        &self,
        uri: &str,
    ) -> Option<(Arc<dyn ResourceHandler>, HashMap<String, String>)> {
        if let Some(&idx) = self.resource_index.get(uri) {
            return Some((self.resources[idx].handler.clone(), HashMap::new()));
        }
        for entry in &self.templates {
            if let Some(captures) = entry.template.matches(uri) {
                return Some((entry.handler.clone(), captures));
            }
        }
        None
    }

    /// Whether any tools are registered
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Whether any resources (exact or templated) are registered
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty() || !self.templates.is_empty()
    }

    /// Whether any prompts are registered
    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }
}

/// Shared, copy-on-write handler registry
pub struct HandlerRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
    bus: Arc<EventBus>,
    watchers: std::sync::Mutex<Vec<mpsc::UnboundedSender<ListKind>>>,
}

impl HandlerRegistry {
    /// Create an empty registry publishing to `bus`
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
            bus,
            watchers: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Take the current snapshot; cheap pointer clone, no lock held after
    /// return.
    pub fn load(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().expect("registry lock poisoned").clone()
    }

    /// Register a channel that receives a [`ListKind`] per mutation; sessions
    /// use this to schedule debounced `list_changed` notifications.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<ListKind> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().expect("watchers poisoned").push(tx);
        rx
    }

    fn mutate<F>(&self, f: F) -> McpResult<()>
    where
        F: FnOnce(&mut RegistrySnapshot) -> McpResult<()>,
    {
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }

    fn notify_watchers(&self, kind: ListKind) {
        self.watchers
            .lock()
            .expect("watchers poisoned")
            .retain(|tx| tx.send(kind).is_ok());
    }

    async fn publish_registration(&self, topic: &str, name: &str, added: bool) {
        if let Ok(subject) = self
            .bus
            .subject::<RegistrationEvent>(topic, SubjectConfig::default())
        {
            if let Err(e) = subject
                .publish(RegistrationEvent {
                    name: name.to_string(),
                    added,
                })
                .await
            {
                debug!(topic, error = %e, "registration event dropped");
            }
        }
    }

    /// Register a tool. Replacing an existing name is an error.
    pub async fn add_tool(&self, entry: ToolEntry) -> McpResult<()> {
        let name = entry.info.name.clone();
        self.mutate(|snap| {
            if snap.tools.contains_key(&name) {
                return Err(McpError::Validation(format!(
                    "tool '{name}' is already registered"
                )));
            }
            snap.tools.insert(name.clone(), entry);
            Ok(())
        })?;
        self.publish_registration(topics::TOOL_REGISTERED, &name, true)
            .await;
        self.notify_watchers(ListKind::Tools);
        Ok(())
    }

    /// Remove a tool by name
    pub async fn remove_tool(&self, name: &str) -> McpResult<bool> {
        let mut removed = false;
        self.mutate(|snap| {
            removed = snap.tools.remove(name).is_some();
            Ok(())
        })?;
        if removed {
            self.publish_registration(topics::TOOL_REGISTERED, name, false)
                .await;
            self.notify_watchers(ListKind::Tools);
        }
        Ok(removed)
    }

    /// Register an exact-URI resource
    pub async fn add_resource(&self, entry: ResourceEntry) -> McpResult<()> {
        let uri = entry.info.uri.clone();
        self.mutate(|snap| {
            if snap.resource_index.contains_key(&uri) {
                return Err(McpError::Validation(format!(
                    "resource '{uri}' is already registered"
                )));
            }
            snap.resources.push(entry);
            snap.resource_index.insert(uri.clone(), snap.resources.len() - 1);
            Ok(())
        })?;
        self.publish_registration(topics::RESOURCE_REGISTERED, &uri, true)
            .await;
        self.notify_watchers(ListKind::Resources);
        Ok(())
    }

    /// Remove an exact-URI resource
    pub async fn remove_resource(&self, uri: &str) -> McpResult<bool> {
        let mut removed = false;
        self.mutate(|snap| {
            if let Some(idx) = snap.resource_index.remove(uri) {
                snap.resources.remove(idx);
                // Reindex entries that shifted down.
                for i in snap.resource_index.values_mut() {
                    if *i > idx {
                        *i -= 1;
                    }
                }
                removed = true;
            }
            Ok(())
        })?;
        if removed {
            self.publish_registration(topics::RESOURCE_REGISTERED, uri, false)
                .await;
            self.notify_watchers(ListKind::Resources);
        }
        Ok(removed)
    }

    /// Register a templated resource.
    ///
    /// Two templates with the same literal-character count would make the
    /// precedence rule ambiguous, so the tie is rejected at registration.
    pub async fn add_resource_template(&self, entry: ResourceTemplateEntry) -> McpResult<()> {
        let uri_template = entry.info.uri_template.clone();
        self.mutate(|snap| {
            let literal_chars = entry.template.literal_chars();
            if let Some(existing) = snap
                .templates
                .iter()
                .find(|t| t.template.literal_chars() == literal_chars)
            {
                return Err(McpError::Validation(format!(
                    "template '{uri_template}' ties with '{}' on literal length; precedence would be ambiguous",
                    existing.info.uri_template
                )));
            }
            let pos = snap
                .templates
                .partition_point(|t| t.template.literal_chars() > literal_chars);
            snap.templates.insert(pos, entry);
            Ok(())
        })?;
        self.publish_registration(topics::RESOURCE_REGISTERED, &uri_template, true)
            .await;
        self.notify_watchers(ListKind::Resources);
        Ok(())
    }

    /// Register a prompt
    pub async fn add_prompt(&self, entry: PromptEntry) -> McpResult<()> {
        let name = entry.info.name.clone();
        self.mutate(|snap| {
            if snap.prompts.contains_key(&name) {
                return Err(McpError::Validation(format!(
                    "prompt '{name}' is already registered"
                )));
            }
            snap.prompts.insert(name.clone(), entry);
            Ok(())
        })?;
        self.publish_registration(topics::PROMPT_REGISTERED, &name, true)
            .await;
        self.notify_watchers(ListKind::Prompts);
        Ok(())
    }

    /// Remove a prompt by name
    pub async fn remove_prompt(&self, name: &str) -> McpResult<bool> {
        let mut removed = false;
        self.mutate(|snap| {
            removed = snap.prompts.remove(name).is_some();
            Ok(())
        })?;
        if removed {
            self.publish_registration(topics::PROMPT_REGISTERED, name, false)
                .await;
            self.notify_watchers(ListKind::Prompts);
        }
        Ok(removed)
    }

    /// Register a completion handler for a prompt or resource target
    pub fn add_completion<H>(&self, target: CompletionTarget, handler: H) -> McpResult<()>
    where
        H: CompletionHandler + 'static,
    {
        self.mutate(|snap| {
            snap.completions.insert(target, Arc::new(handler));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RequestContext;
    use crate::core::error::McpResult;
    use crate::core::tool::ToolHandler;
    use crate::protocol::types::{ResourceContents, ToolResult};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Noop;

    #[async_trait]
    impl ToolHandler for Noop {
        async fn call(
            &self,
            _arguments: HashMap<String, Value>,
            _ctx: &RequestContext,
        ) -> McpResult<ToolResult> {
            Ok(ToolResult::text("ok"))
        }
    }

    struct FileRes;

    #[async_trait]
    impl ResourceHandler for FileRes {
        async fn read(
            &self,
            uri: &str,
            _params: &HashMap<String, String>,
            _ctx: &RequestContext,
        ) -> McpResult<Vec<ResourceContents>> {
            Ok(vec![ResourceContents::Text {
                uri: uri.to_string(),
                mime_type: None,
                text: String::new(),
            }])
        }
    }

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new(Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn test_tool_registration_and_lookup() {
        let reg = registry();
        reg.add_tool(ToolEntry::new("echo", None, json!({"type":"object"}), Noop))
            .await
            .unwrap();
        let snap = reg.load();
        assert!(snap.tool("echo").is_some());
        assert!(snap.tool("missing").is_none());
        assert!(snap.has_tools());

        // Duplicate name rejected
        assert!(reg
            .add_tool(ToolEntry::new("echo", None, json!({"type":"object"}), Noop))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_snapshot_isolation() {
        let reg = registry();
        let before = reg.load();
        reg.add_tool(ToolEntry::new("t", None, json!({"type":"object"}), Noop))
            .await
            .unwrap();
        // The old snapshot is untouched; the new one sees the tool.
        assert!(!before.has_tools());
        assert!(reg.load().has_tools());
    }

    #[tokio::test]
    async fn test_exact_resource_precedes_template() {
        let reg = registry();
        reg.add_resource(ResourceEntry::new("db://table/users", "users", FileRes))
            .await
            .unwrap();
        reg.add_resource_template(
            ResourceTemplateEntry::new("db://table/{name}", "any-table", FileRes).unwrap(),
        )
        .await
        .unwrap();

        let snap = reg.load();
        let (_, captures) = snap.resolve_resource("db://table/users").unwrap();
        assert!(captures.is_empty()); // exact match, no captures

        let (_, captures) = snap.resolve_resource("db://table/orders").unwrap();
        assert_eq!(captures["name"], "orders");
    }

    #[tokio::test]
    async fn test_template_precedence_by_literal_count() {
        let reg = registry();
        reg.add_resource_template(
            ResourceTemplateEntry::new("file:///{path*}", "fallback", FileRes).unwrap(),
        )
        .await
        .unwrap();
        reg.add_resource_template(
            ResourceTemplateEntry::new("file:///var/log/{file}", "logs", FileRes).unwrap(),
        )
        .await
        .unwrap();

        let snap = reg.load();
        let (_, captures) = snap.resolve_resource("file:///var/log/app.log").unwrap();
        // The longer-literal template wins even though both match.
        assert_eq!(captures.get("file").map(String::as_str), Some("app.log"));
    }

    #[tokio::test]
    async fn test_template_literal_tie_rejected() {
        let reg = registry();
        reg.add_resource_template(
            ResourceTemplateEntry::new("a://x/{id}", "a", FileRes).unwrap(),
        )
        .await
        .unwrap();
        let err = reg
            .add_resource_template(ResourceTemplateEntry::new("b://x/{id}", "b", FileRes).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Validation(_)));
    }

    #[tokio::test]
    async fn test_watchers_see_mutations() {
        let reg = registry();
        let mut rx = reg.watch();
        reg.add_tool(ToolEntry::new("t", None, json!({"type":"object"}), Noop))
            .await
            .unwrap();
        reg.add_prompt(PromptEntry::new("p", None, None, DummyPrompt))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(ListKind::Tools));
        assert_eq!(rx.recv().await, Some(ListKind::Prompts));
    }

    struct DummyPrompt;

    #[async_trait]
    impl crate::core::prompt::PromptHandler for DummyPrompt {
        async fn render(
            &self,
            _arguments: HashMap<String, String>,
            _ctx: &RequestContext,
        ) -> McpResult<crate::protocol::messages::GetPromptResult> {
            Ok(crate::protocol::messages::GetPromptResult {
                description: None,
                messages: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_remove_resource_reindexes() {
        let reg = registry();
        reg.add_resource(ResourceEntry::new("m://a", "a", FileRes))
            .await
            .unwrap();
        reg.add_resource(ResourceEntry::new("m://b", "b", FileRes))
            .await
            .unwrap();
        assert!(reg.remove_resource("m://a").await.unwrap());
        let snap = reg.load();
        assert!(snap.resolve_resource("m://a").is_none());
        assert!(snap.resolve_resource("m://b").is_some());
    }
}
