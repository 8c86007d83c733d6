//! Stdio transport
//!
//! Newline-delimited JSON: one envelope (or batch) per line. The client
//! variant talks to a child process over its pipes; the server variant
//! serves the current process' stdin/stdout, which is how spawned MCP
//! servers are driven by their parents.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::error::{McpError, McpResult};
use crate::transport::traits::{FrameHandler, Transport};

/// Client-side stdio transport over a child process' pipes.
///
/// The registry (or caller) owns the `Child` itself; the transport only
/// borrows the pipe ends, so process-group shutdown stays with the owner.
pub struct StdioClientTransport {
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    handler: Option<FrameHandler>,
    writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shutdown: CancellationToken,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

impl StdioClientTransport {
    /// Build a transport from child pipe ends
    pub fn from_pipes(
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: Option<ChildStderr>,
    ) -> Self {
        Self {
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr,
            handler: None,
            writer_tx: None,
            shutdown: CancellationToken::new(),
            connected: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn start(&mut self) -> McpResult<()> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| McpError::transport("on_receive not installed"))?;
        let stdin = self
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("transport already started"))?;
        let stdout = self
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("transport already started"))?;

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.writer_tx = Some(writer_tx.clone());
        self.connected
            .store(true, std::sync::atomic::Ordering::Release);

        // Writer task: one frame per line.
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut writer = BufWriter::new(stdin);
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    f = writer_rx.recv() => match f {
                        Some(f) => f,
                        None => break,
                    },
                };
                if writer.write_all(&frame).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    debug!("stdio writer closed");
                    break;
                }
            }
        });

        // Reader task: frames to the handler; response frames go back out
        // through the writer queue.
        let shutdown = self.shutdown.clone();
        let connected = self.connected.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    l = lines.next_line() => l,
                };
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(response) = handler(line.into_bytes()).await {
                            if writer_tx.send(response).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("stdio peer closed stdout");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdio read failed");
                        break;
                    }
                }
            }
            connected.store(false, std::sync::atomic::Ordering::Release);
        });

        // Forward child stderr to the logger.
        if let Some(stderr) = self.stderr.take() {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    let line = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        l = lines.next_line() => l,
                    };
                    match line {
                        Ok(Some(line)) => debug!(target: "mcp_child_stderr", "{line}"),
                        _ => break,
                    }
                }
            });
        }

        Ok(())
    }

    async fn stop(&mut self) -> McpResult<()> {
        self.shutdown.cancel();
        // Dropping the writer side closes the child's stdin, prompting a
        // graceful exit.
        self.writer_tx = None;
        self.connected
            .store(false, std::sync::atomic::Ordering::Release);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> McpResult<()> {
        let tx = self
            .writer_tx
            .as_ref()
            .ok_or_else(|| McpError::transport("transport not started"))?;
        tx.send(frame.to_vec())
            .map_err(|_| McpError::transport("stdio writer closed"))
    }

    fn on_receive(&mut self, handler: FrameHandler) {
        self.handler = Some(handler);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Acquire)
    }

    fn connection_info(&self) -> String {
        "stdio (child process)".to_string()
    }
}

/// Server-side stdio transport over the current process' stdin/stdout.
///
/// Stdin EOF/POLLHUP means the parent went away; the transport resolves its
/// `closed` token so the embedding server can shut down gracefully (the
/// child-side watchdog behavior).
pub struct StdioServerTransport {
    handler: Option<FrameHandler>,
    writer_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    shutdown: CancellationToken,
    closed: CancellationToken,
}

impl Default for StdioServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioServerTransport {
    /// Create an unstarted transport
    pub fn new() -> Self {
        Self {
            handler: None,
            writer_tx: None,
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Resolved when stdin reaches EOF (parent closed the pipe)
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[async_trait]
impl Transport for StdioServerTransport {
    async fn start(&mut self) -> McpResult<()> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| McpError::transport("on_receive not installed"))?;

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.writer_tx = Some(writer_tx.clone());

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut writer = BufWriter::new(tokio::io::stdout());
            loop {
                let frame = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    f = writer_rx.recv() => match f {
                        Some(f) => f,
                        None => break,
                    },
                };
                if writer.write_all(&frame).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let shutdown = self.shutdown.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut lines = BufReader::new(stdin).lines();
            loop {
                let line = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    l = lines.next_line() => l,
                };
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(response) = handler(line.into_bytes()).await {
                            if writer_tx.send(response).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            // Parent hung up; let the host begin its own shutdown.
            closed.cancel();
        });

        Ok(())
    }

    async fn stop(&mut self) -> McpResult<()> {
        self.shutdown.cancel();
        self.writer_tx = None;
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> McpResult<()> {
        let tx = self
            .writer_tx
            .as_ref()
            .ok_or_else(|| McpError::transport("transport not started"))?;
        tx.send(frame.to_vec())
            .map_err(|_| McpError::transport("stdout writer closed"))
    }

    fn on_receive(&mut self, handler: FrameHandler) {
        self.handler = Some(handler);
    }

    fn connection_info(&self) -> String {
        "stdio (current process)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_transport_requires_handler_and_start() {
        let mut transport = StdioServerTransport::new();
        // Sending before start fails cleanly.
        assert!(transport.send(b"{}").await.is_err());
        // Starting without a handler is an error, not a hang.
        assert!(transport.start().await.is_err());
        assert!(!transport.closed().is_cancelled());
    }

    #[tokio::test]
    async fn test_client_transport_requires_handler() {
        let mut child = tokio::process::Command::new("cat")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StdioClientTransport::from_pipes(stdin, stdout, None);
        assert!(!transport.is_connected());
        assert!(transport.start().await.is_err());
        assert!(transport.send(b"{}").await.is_err());

        transport.on_receive(Arc::new(|_| Box::pin(async { None })));
        transport.start().await.unwrap();
        assert!(transport.is_connected());
        assert!(transport.send(br#"{"jsonrpc":"2.0","method":"ping"}"#).await.is_ok());

        transport.stop().await.unwrap();
        assert!(!transport.is_connected());
        let _ = child.kill().await;
    }
}
