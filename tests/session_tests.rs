// Copyright (c) 2025 MCP Rust Contributors
// SPDX-License-Identifier: MIT

//! Session machine tests: notification gating, list_changed debt, roots

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use spectra_mcp_rs::prelude::*;
use spectra_mcp_rs::server::LIST_CHANGED_DEBOUNCE;

struct NullTool;

#[async_trait]
impl ToolHandler for NullTool {
    async fn call(
        &self,
        _arguments: HashMap<String, Value>,
        _ctx: &RequestContext,
    ) -> McpResult<ToolResult> {
        Ok(ToolResult::text("ok"))
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_slice(&frame).unwrap());
    }
    frames
}

async fn initialize_frame(conn: &Arc<ServerConnection>, caps: Value) {
    conn.handle_frame(
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "draft",
                "capabilities": caps,
                "clientInfo": {"name": "t", "version": "0"}
            }
        })
        .to_string()
        .as_bytes(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_p4_pre_init_silence() {
    let server = McpServer::new("s", "0");
    let (conn, mut outgoing) = server.connect(SessionTransportData::default()).await;

    // Registration while PreInit: folded into capabilities, nothing emitted.
    server
        .add_tool("t1", None, json!({"type": "object"}), NullTool)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(drain(&mut outgoing).is_empty());

    // The capability advertisement reflects the pre-init registration.
    let reply = conn
        .handle_frame(
            json!({
                "jsonrpc": "2.0", "id": 0, "method": "initialize",
                "params": {"protocolVersion": "draft", "capabilities": {},
                           "clientInfo": {"name": "t", "version": "0"}}
            })
            .to_string()
            .as_bytes(),
        )
        .await
        .unwrap();
    let v: Value = serde_json::from_slice(&reply).unwrap();
    assert_eq!(v["result"]["capabilities"]["tools"]["listChanged"], json!(true));

    conn.handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    // No list_changed debt from the pre-init registration.
    let frames = drain(&mut outgoing);
    assert!(
        frames
            .iter()
            .all(|f| f["method"] != json!("notifications/tools/list_changed")),
        "unexpected list_changed: {frames:?}"
    );
}

#[tokio::test]
async fn test_p5_post_init_release_once_per_list() {
    let server = McpServer::new("s", "0");
    let (conn, mut outgoing) = server.connect(SessionTransportData::default()).await;
    initialize_frame(&conn, json!({})).await;

    // Between initialize and initialized: registrations accrue debt.
    server
        .add_tool("t1", None, json!({"type": "object"}), NullTool)
        .await
        .unwrap();
    server
        .add_tool("t2", None, json!({"type": "object"}), NullTool)
        .await
        .unwrap();
    server
        .add_prompt("p1", None, None, NullPrompt)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(drain(&mut outgoing).is_empty());

    conn.handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let methods: Vec<String> = drain(&mut outgoing)
        .into_iter()
        .filter_map(|f| f["method"].as_str().map(String::from))
        .filter(|m| m.ends_with("list_changed"))
        .collect();
    // Exactly once per affected list, tools before prompts.
    assert_eq!(
        methods,
        vec![
            "notifications/tools/list_changed".to_string(),
            "notifications/prompts/list_changed".to_string(),
        ]
    );
}

struct NullPrompt;

#[async_trait]
impl PromptHandler for NullPrompt {
    async fn render(
        &self,
        _arguments: HashMap<String, String>,
        _ctx: &RequestContext,
    ) -> McpResult<GetPromptResult> {
        Ok(GetPromptResult {
            description: None,
            messages: vec![],
        })
    }
}

#[tokio::test]
async fn test_post_init_registration_debounced() {
    let server = McpServer::new("s", "0");
    let (conn, mut outgoing) = server.connect(SessionTransportData::default()).await;
    initialize_frame(&conn, json!({})).await;
    conn.handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;

    // A burst of same-list registrations coalesces into one notification.
    for i in 0..4 {
        server
            .add_tool(format!("tool-{i}"), None, json!({"type": "object"}), NullTool)
            .await
            .unwrap();
    }
    tokio::time::sleep(LIST_CHANGED_DEBOUNCE * 4).await;

    let count = drain(&mut outgoing)
        .into_iter()
        .filter(|f| f["method"] == json!("notifications/tools/list_changed"))
        .count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_p9_env_provenance() {
    let server = McpServer::new("s", "0");
    let mut env = HashMap::new();
    env.insert("API_KEY".to_string(), "from-transport".to_string());
    let (conn, _outgoing) = server
        .connect(SessionTransportData {
            env,
            roots: vec![PathBuf::from("/workspace")],
        })
        .await;

    // A hostile initialize carrying environment-looking data changes nothing.
    conn.handle_frame(
        json!({
            "jsonrpc": "2.0", "id": 0, "method": "initialize",
            "params": {
                "protocolVersion": "draft",
                "capabilities": {},
                "clientInfo": {"name": "t", "version": "0"},
                "_meta": {"environment": {"API_KEY": "from-peer"}}
            }
        })
        .to_string()
        .as_bytes(),
    )
    .await
    .unwrap();

    assert_eq!(
        conn.session().env().get("API_KEY").unwrap(),
        "from-transport"
    );
    assert_eq!(conn.session().roots(), vec![PathBuf::from("/workspace")]);
}

#[tokio::test]
async fn test_p10_roots_pull_iff_advertised() {
    // Peer advertises roots: a roots/list request goes out after initialized.
    let server = McpServer::new("s", "0");
    let (conn, mut outgoing) = server.connect(SessionTransportData::default()).await;
    initialize_frame(&conn, json!({"roots": {"listChanged": true}})).await;
    conn.handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = drain(&mut outgoing);
    assert!(
        frames.iter().any(|f| f["method"] == json!("roots/list")),
        "expected roots/list pull, got {frames:?}"
    );

    // Peer without the capability: never pulled.
    let (conn2, mut outgoing2) = server.connect(SessionTransportData::default()).await;
    initialize_frame(&conn2, json!({})).await;
    conn2
        .handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frames = drain(&mut outgoing2);
    assert!(
        frames.iter().all(|f| f["method"] != json!("roots/list")),
        "unexpected roots/list pull: {frames:?}"
    );
}

#[tokio::test]
async fn test_roots_pull_merges_into_session() {
    let server = McpServer::new("s", "0");
    let (conn, mut outgoing) = server.connect(SessionTransportData::default()).await;
    initialize_frame(&conn, json!({"roots": {}})).await;
    conn.handle_frame(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Find the outbound roots/list request and answer it.
    let frames = drain(&mut outgoing);
    let request = frames
        .iter()
        .find(|f| f["method"] == json!("roots/list"))
        .expect("roots/list request");
    let response = json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": {"roots": [
            {"uri": "file:///srv/data", "name": "data"},
            {"uri": "ftp://ignored.example/x"}
        ]}
    });
    assert!(
        conn.handle_frame(response.to_string().as_bytes())
            .await
            .is_none()
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Only the file:// root landed.
    assert_eq!(conn.session().roots(), vec![PathBuf::from("/srv/data")]);
}

#[tokio::test]
async fn test_inline_roots_from_client_info() {
    let server = McpServer::new("s", "0");
    let (conn, _outgoing) = server.connect(SessionTransportData::default()).await;
    conn.handle_frame(
        json!({
            "jsonrpc": "2.0", "id": 0, "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {
                    "name": "t", "version": "0",
                    "roots": [
                        {"uri": "file:///home/dev/proj"},
                        {"uri": "https://not-a-file.example"}
                    ]
                }
            }
        })
        .to_string()
        .as_bytes(),
    )
    .await
    .unwrap();
    assert_eq!(
        conn.session().roots(),
        vec![PathBuf::from("/home/dev/proj")]
    );
}
