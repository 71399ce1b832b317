// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `device-proxy` binary as a subprocess and exercises
//! it over its TCP wire protocol and, where enabled, WebSocket.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Resolve the path to the compiled `device-proxy` binary.
pub fn proxy_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("device-proxy")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Send one length-prefixed JSON frame over `stream`.
pub async fn send_frame(stream: &mut TcpStream, value: &Value) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec(value)?;
    let len = u32::try_from(bytes.len())?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(&bytes).await?;
    Ok(())
}

/// Read one length-prefixed JSON frame from `stream`.
pub async fn recv_frame(stream: &mut TcpStream) -> anyhow::Result<Value> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Perform the query-meta / meta-info handshake for a model named `name`
/// with no states, events, or methods.
pub async fn handshake_bare(stream: &mut TcpStream, name: &str) -> anyhow::Result<()> {
    handshake_with(stream, name, serde_json::json!([])).await
}

/// Perform the query-meta / meta-info handshake for a model named `name`
/// declaring `methods` (a JSON array of method descriptors) and no
/// states or events.
pub async fn handshake_with(stream: &mut TcpStream, name: &str, methods: Value) -> anyhow::Result<()> {
    let first = recv_frame(stream).await?;
    anyhow::ensure!(first["type"] == "query-meta", "expected query-meta, got {first}");
    let meta = serde_json::json!({"name": name, "states": [], "events": [], "methods": methods});
    send_frame(stream, &serde_json::json!({"type": "meta-info", "payload": meta})).await
}

/// A running `device-proxy` process that is killed on drop.
pub struct ProxyProcess {
    child: Child,
    addr: String,
    ws_addr: Option<String>,
}

impl ProxyProcess {
    /// Spawn the proxy listening on TCP only, on a freshly-chosen port.
    pub fn start() -> anyhow::Result<Self> {
        Self::build(false)
    }

    /// Spawn the proxy with both TCP and WebSocket listeners enabled.
    pub fn start_with_ws() -> anyhow::Result<Self> {
        Self::build(true)
    }

    fn build(with_ws: bool) -> anyhow::Result<Self> {
        let binary = proxy_binary();
        anyhow::ensure!(binary.exists(), "device-proxy binary not found at {}", binary.display());

        let port = free_port()?;
        let addr = format!("127.0.0.1:{port}");

        let mut args: Vec<String> = vec!["--addr".into(), addr.clone()];
        let ws_addr = if with_ws {
            let ws_port = free_port()?;
            let ws_addr = format!("127.0.0.1:{ws_port}");
            args.extend(["--ws".into(), "--ws-addr".into(), ws_addr.clone()]);
            Some(ws_addr)
        } else {
            None
        };

        let child = Command::new(&binary)
            .args(&args)
            .env("RUST_LOG", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, addr, ws_addr })
    }

    /// The TCP address the proxy is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The WebSocket address the proxy is listening on, if enabled.
    pub fn ws_addr(&self) -> Option<&str> {
        self.ws_addr.as_deref()
    }

    /// Connect a raw TCP client, retrying until the listener is up.
    pub async fn connect(&self, timeout: Duration) -> anyhow::Result<TcpStream> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) if tokio::time::Instant::now() < deadline => {
                    let _ = e;
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for ProxyProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
