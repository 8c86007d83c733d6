//! Sub-process registry
//!
//! Spawns child MCP servers, wires their pipes to stdio client transports,
//! probes readiness (initialize handshake + ping poll), and shuts them down
//! gracefully with a SIGKILL escalation against the whole process group.
//!
//! Children are launched in their own POSIX process group so that a stuck
//! child cannot shelter descendants: the escalation signals the group, not
//! just the direct child. `start`/`stop` serialize per child name; distinct
//! children proceed concurrently, and no lock is held while waiting on a
//! child.

use std::collections::{HashMap, HashSet};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::client::McpClient;
use crate::core::error::{McpError, McpResult};
use crate::process::config::{ServerDefinition, ServersConfig};
use crate::transport::stdio::StdioClientTransport;

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Deadline for the initialize handshake + ping probe
    pub ready_timeout: Duration,
    /// Poll cadence while waiting for readiness
    pub ping_interval: Duration,
    /// Grace period between closing stdin and SIGKILL
    pub shutdown_grace: Duration,
    /// Bounded wait for reaping after SIGKILL
    pub reap_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(3),
            reap_timeout: Duration::from_secs(2),
        }
    }
}

/// Readiness of one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// Spawn succeeded, handshake still in progress
    Starting,
    /// Handshake and ping probe succeeded
    Ready,
    /// Spawn or readiness failed; the message surfaces at `get_client`
    Failed(String),
}

struct ChildInner {
    state: ReadyState,
    pid: Option<u32>,
    pgid: Option<i32>,
    client: Option<Arc<McpClient>>,
}

struct ChildEntry {
    definition: ServerDefinition,
    /// Serializes start/stop for this child name
    op_lock: tokio::sync::Mutex<()>,
    inner: Mutex<ChildInner>,
    child: tokio::sync::Mutex<Option<Child>>,
}

/// Registry of spawned child MCP servers
pub struct ChildServerRegistry {
    config: RegistryConfig,
    entries: Mutex<HashMap<String, Arc<ChildEntry>>>,
    tracked_groups: Mutex<HashSet<i32>>,
}

impl Default for ChildServerRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ChildServerRegistry {
    /// Create a registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            tracked_groups: Mutex::new(HashSet::new()),
        }
    }

    /// Start every child in the configuration document. Distinct children
    /// start concurrently; each failure is logged and reflected in its
    /// entry's state rather than aborting the rest.
    pub async fn apply_config(self: &Arc<Self>, config: ServersConfig) {
        let starts = config.mcp_servers.into_iter().map(|(name, definition)| {
            let registry = self.clone();
            async move {
                if let Err(e) = registry.start(&name, definition).await {
                    warn!(child = %name, error = %e, "child server failed to start");
                }
            }
        });
        futures::future::join_all(starts).await;
    }

    /// Spawn and ready-probe one child. Idempotent for an already-ready
    /// child.
    pub async fn start(self: &Arc<Self>, name: &str, definition: ServerDefinition) -> McpResult<()> {
        let entry = {
            let mut entries = self.entries.lock().expect("entries poisoned");
            entries
                .entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(ChildEntry {
                        definition: definition.clone(),
                        op_lock: tokio::sync::Mutex::new(()),
                        inner: Mutex::new(ChildInner {
                            state: ReadyState::Starting,
                            pid: None,
                            pgid: None,
                            client: None,
                        }),
                        child: tokio::sync::Mutex::new(None),
                    })
                })
                .clone()
        };

        let _op = entry.op_lock.lock().await;
        if entry.inner.lock().expect("child inner poisoned").state == ReadyState::Ready {
            return Ok(());
        }

        match self.spawn_and_probe(name, &entry).await {
            Ok(()) => Ok(()),
            Err(e) => {
                entry.inner.lock().expect("child inner poisoned").state =
                    ReadyState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn spawn_and_probe(&self, name: &str, entry: &Arc<ChildEntry>) -> McpResult<()> {
        let definition = &entry.definition;
        let mut command = Command::new(&definition.command);
        command
            .args(&definition.args)
            .envs(definition.resolved_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        if let Some(dir) = &definition.working_directory {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            // New group; the child becomes its own group leader so the whole
            // fleet can be signalled together.
            command.as_std_mut().process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| McpError::process(format!("spawn '{}' failed: {e}", definition.command)))?;

        let pid = child
            .id()
            .ok_or_else(|| McpError::process("child exited before pid was read"))?;
        let pgid = pid as i32;
        self.tracked_groups
            .lock()
            .expect("tracked groups poisoned")
            .insert(pgid);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::process("child stdin not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::process("child stdout not piped"))?;
        let stderr = child.stderr.take();

        {
            let mut inner = entry.inner.lock().expect("child inner poisoned");
            inner.pid = Some(pid);
            inner.pgid = Some(pgid);
            inner.state = ReadyState::Starting;
        }
        *entry.child.lock().await = Some(child);

        info!(child = name, pid, "child server spawned");

        // Readiness: initialize handshake, then ping until success or the
        // configured deadline.
        let transport = StdioClientTransport::from_pipes(stdin, stdout, stderr);
        let client = Arc::new(McpClient::new(
            format!("{name}-supervisor"),
            env!("CARGO_PKG_VERSION").to_string(),
        ));

        let ready = tokio::time::timeout(self.config.ready_timeout, async {
            client.connect(transport).await?;
            loop {
                match client.ping().await {
                    Ok(()) => return Ok::<(), McpError>(()),
                    Err(e) => {
                        debug!(child = name, error = %e, "ping probe failed, retrying");
                        tokio::time::sleep(self.config.ping_interval).await;
                    }
                }
            }
        })
        .await;

        match ready {
            Ok(Ok(())) => {
                let mut inner = entry.inner.lock().expect("child inner poisoned");
                inner.client = Some(client);
                inner.state = ReadyState::Ready;
                info!(child = name, "child server ready");
                Ok(())
            }
            Ok(Err(e)) => Err(McpError::process(format!(
                "child '{name}' handshake failed: {e}"
            ))),
            Err(_) => Err(McpError::process(format!(
                "child '{name}' not ready within {:?}",
                self.config.ready_timeout
            ))),
        }
    }

    /// Fetch the client for a ready child; Starting/Failed states surface
    /// here.
    pub fn get_client(&self, name: &str) -> McpResult<Arc<McpClient>> {
        let entry = self
            .entries
            .lock()
            .expect("entries poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::process(format!("unknown child server '{name}'")))?;
        let inner = entry.inner.lock().expect("child inner poisoned");
        match &inner.state {
            ReadyState::Ready => inner
                .client
                .clone()
                .ok_or_else(|| McpError::internal("ready child without client")),
            ReadyState::Starting => Err(McpError::process(format!(
                "child server '{name}' is still starting"
            ))),
            ReadyState::Failed(msg) => Err(McpError::process(format!(
                "child server '{name}' failed: {msg}"
            ))),
        }
    }

    /// Stop one child: close stdin, wait out the grace period, SIGKILL the
    /// process group if it is still alive, then reap within a bounded wait.
    pub async fn stop(&self, name: &str) -> McpResult<()> {
        let entry = self
            .entries
            .lock()
            .expect("entries poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::process(format!("unknown child server '{name}'")))?;

        let _op = entry.op_lock.lock().await;

        let (client, pgid) = {
            let mut inner = entry.inner.lock().expect("child inner poisoned");
            let client = inner.client.take();
            inner.state = ReadyState::Starting;
            (client, inner.pgid)
        };

        // Step 1: closing stdin prompts a graceful exit.
        if let Some(client) = client {
            if let Err(e) = client.disconnect().await {
                debug!(child = name, error = %e, "disconnect during stop");
            }
        }

        let mut child = entry.child.lock().await.take();
        if let Some(child) = child.as_mut() {
            // Step 2: wait out the grace period.
            match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(child = name, %status, "child exited gracefully");
                    if let Some(pgid) = pgid {
                        self.untrack(pgid);
                    }
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!(child = name, error = %e, "wait failed");
                }
                Err(_) => {
                    // Step 3: escalate to the whole group.
                    warn!(child = name, "grace period elapsed, killing process group");
                    if let Some(pgid) = pgid {
                        kill_group(pgid);
                    }
                }
            }

            // Step 4: bounded reap after the kill.
            match tokio::time::timeout(self.config.reap_timeout, child.wait()).await {
                Ok(_) => {
                    if let Some(pgid) = pgid {
                        self.untrack(pgid);
                    }
                    Ok(())
                }
                Err(_) => Err(McpError::process(format!(
                    "child '{name}' did not exit after SIGKILL"
                ))),
            }
        } else {
            if let Some(pgid) = pgid {
                self.untrack(pgid);
            }
            Ok(())
        }
    }

    /// Stop every child and force-kill any process group still tracked.
    /// Always completes cleanup; returns the last stop error, if any.
    pub async fn close(&self) -> McpResult<()> {
        let names: Vec<String> = self
            .entries
            .lock()
            .expect("entries poisoned")
            .keys()
            .cloned()
            .collect();

        let mut last_error = None;
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(child = %name, error = %e, "stop failed during close");
                last_error = Some(e);
            }
        }

        self.cleanup_all_process_groups();
        self.entries.lock().expect("entries poisoned").clear();

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Force-kill every tracked process group
    pub fn cleanup_all_process_groups(&self) {
        let groups: Vec<i32> = self
            .tracked_groups
            .lock()
            .expect("tracked groups poisoned")
            .drain()
            .collect();
        for pgid in groups {
            warn!(pgid, "force-killing leftover process group");
            kill_group(pgid);
        }
    }

    /// Readiness of one child, if known
    pub fn state(&self, name: &str) -> Option<ReadyState> {
        self.entries
            .lock()
            .expect("entries poisoned")
            .get(name)
            .map(|e| e.inner.lock().expect("child inner poisoned").state.clone())
    }

    fn untrack(&self, pgid: i32) {
        self.tracked_groups
            .lock()
            .expect("tracked groups poisoned")
            .remove(&pgid);
    }
}

#[cfg(unix)]
fn kill_group(pgid: i32) {
    // Negative pid addresses the whole group.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: i32) {}

/// Whether a pid still exists (signal 0 probe)
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn fast_config() -> RegistryConfig {
        RegistryConfig {
            ready_timeout: Duration::from_millis(400),
            ping_interval: Duration::from_millis(50),
            shutdown_grace: Duration::from_millis(300),
            reap_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_unknown_child_errors() {
        let registry = Arc::new(ChildServerRegistry::new(fast_config()));
        assert!(registry.get_client("nope").is_err());
        assert!(registry.stop("nope").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_readiness_surfaces_at_get_client() {
        let registry = Arc::new(ChildServerRegistry::new(fast_config()));
        // `cat` is alive but never answers the handshake.
        let err = registry
            .start(
                "mute",
                ServerDefinition {
                    command: "cat".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    working_directory: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Process(_)));
        assert!(matches!(
            registry.state("mute"),
            Some(ReadyState::Failed(_))
        ));
        assert!(registry.get_client("mute").is_err());
        let _ = registry.close().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_kills_process_group_descendants() {
        let registry = Arc::new(ChildServerRegistry::new(fast_config()));
        // The child detaches a second sleep into the same process group.
        let _ = registry
            .start(
                "sleeper",
                ServerDefinition {
                    command: "sh".to_string(),
                    args: vec!["-c".to_string(), "sleep 30 & exec sleep 30".to_string()],
                    env: HashMap::new(),
                    working_directory: None,
                },
            )
            .await;

        let pid = {
            let entries = registry.entries.lock().unwrap();
            entries["sleeper"].inner.lock().unwrap().pid.unwrap()
        };
        assert!(process_alive(pid));

        let started = Instant::now();
        let _ = registry.close().await;
        assert!(started.elapsed() < Duration::from_secs(5));

        // The direct child and its group are gone shortly after close.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!process_alive(pid));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_substitution_reaches_child() {
        // Covered at the config level; here we only assert resolution shape.
        unsafe { std::env::set_var("SPECTRA_TEST_VALUE", "resolved") };
        let def = ServerDefinition {
            command: "true".to_string(),
            args: vec![],
            env: HashMap::from([("K".to_string(), "${SPECTRA_TEST_VALUE}".to_string())]),
            working_directory: None,
        };
        assert_eq!(def.resolved_env()["K"], "resolved");
    }
}
