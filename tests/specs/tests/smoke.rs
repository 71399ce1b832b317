// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `device-proxy` binary and
//! exercise its TCP and WebSocket transports as an external client would.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use proxy_specs::{handshake_bare, handshake_with, recv_frame, send_frame, ProxyProcess};

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn tcp_admits_a_model_and_answers_get_all_model() -> anyhow::Result<()> {
    let proxy = ProxyProcess::start()?;
    let mut stream = proxy.connect(TIMEOUT).await?;
    handshake_bare(&mut stream, "Smoke").await?;

    send_frame(
        &mut stream,
        &json!({"type": "call", "payload": {"name": "proxy/GetAllModel", "uuid": "q1", "args": {}}}),
    )
    .await?;

    let reply = recv_frame(&mut stream).await?;
    assert_eq!(reply["type"], "response");
    let models = reply["payload"]["response"]["models"].as_array().cloned().unwrap_or_default();
    assert!(models.iter().any(|m| m == "Smoke"));
    Ok(())
}

#[tokio::test]
async fn tcp_call_between_two_processes_round_trips() -> anyhow::Result<()> {
    let proxy = ProxyProcess::start()?;

    let mut caller = proxy.connect(TIMEOUT).await?;
    handshake_bare(&mut caller, "SmokeCaller").await?;

    let mut callee = proxy.connect(TIMEOUT).await?;
    handshake_with(
        &mut callee,
        "SmokeCallee",
        json!([{"name": "Ping", "args": [], "response": []}]),
    )
    .await?;

    send_frame(
        &mut caller,
        &json!({"type": "call", "payload": {"name": "SmokeCallee/Ping", "uuid": "c1", "args": {}}}),
    )
    .await?;

    let forwarded = recv_frame(&mut callee).await?;
    assert_eq!(forwarded["type"], "call");
    assert_eq!(forwarded["payload"]["uuid"], "c1");

    send_frame(
        &mut callee,
        &json!({"type": "response", "payload": {"uuid": "c1", "error": "", "response": {}}}),
    )
    .await?;

    let reply = recv_frame(&mut caller).await?;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"]["uuid"], "c1");
    Ok(())
}

#[tokio::test]
async fn ws_handshake_admits_a_model() -> anyhow::Result<()> {
    let proxy = ProxyProcess::start_with_ws()?;
    // Give the WS listener time to bind alongside the TCP one.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ws_addr = proxy.ws_addr().ok_or_else(|| anyhow::anyhow!("no ws address"))?;
    let url = format!("ws://{ws_addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;

    let msg = tokio::time::timeout(TIMEOUT, ws.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
    let text = match msg {
        Message::Text(t) => t.to_string(),
        other => anyhow::bail!("expected text ws message, got: {other:?}"),
    };
    let query: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(query["type"], "query-meta");

    let meta = json!({"name": "SmokeWs", "states": [], "events": [], "methods": []});
    ws.send(Message::Text(
        serde_json::to_string(&json!({"type": "meta-info", "payload": meta}))?.into(),
    ))
    .await?;

    Ok(())
}
