// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport: one message per text frame; binary frames are
//! read and silently ignored. A ping/pong keep-alive runs at 9/10 of a
//! 20-second pong-wait deadline.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::admission;
use crate::config::ProxyConfig;
use crate::connection::writer_mailbox;
use crate::logging::FrameLog;
use crate::router::RouterHandle;
use crate::worker::{run_writer, FrameSink, FrameSource};

const PONG_WAIT: Duration = Duration::from_secs(20);
const PING_PERIOD: Duration = Duration::from_millis(PONG_WAIT.as_millis() as u64 * 9 / 10);

#[derive(Clone)]
pub struct WsContext {
    pub router: RouterHandle,
    pub config: Arc<ProxyConfig>,
    pub frame_log: Option<Arc<FrameLog>>,
}

pub fn router(ctx: WsContext) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(ctx)
}

/// Bind `addr` and serve the WebSocket listener until `shutdown` fires.
pub async fn serve(addr: String, ctx: WsContext, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr, "websocket listener bound");
    axum::serve(listener, router(ctx).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(ctx): State<WsContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, remote.to_string(), ctx))
}

async fn handle_socket(socket: WebSocket, remote_addr: String, ctx: WsContext) {
    let (sink, stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let last_pong = Arc::new(AtomicU64::new(now_secs()));
    let writer_quit = CancellationToken::new();

    spawn_ping_loop(Arc::clone(&sink), writer_quit.clone());

    let (writer_tx, writer_rx) = writer_mailbox();
    tokio::spawn(run_writer(
        remote_addr.clone(),
        WsSink { sink },
        writer_rx,
        writer_quit.clone(),
        ctx.frame_log.clone(),
        ctx.config.print_frames,
    ));

    let source = WsSource { stream, last_pong };
    admission::drive(remote_addr, source, writer_tx, writer_quit, ctx.router, &ctx.config).await;
}

/// Sends periodic pings to prompt the peer's pong replies. It never tears
/// the connection down itself: a stalled peer is detected by `WsSource`
/// timing out on its own read, which lets the reader drive removal through
/// the router exactly as any other read failure does.
fn spawn_ping_loop(sink: Arc<Mutex<SplitSink<WebSocket, Message>>>, quit: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_PERIOD);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let mut guard = sink.lock().await;
                    if guard.send(Message::Ping(Vec::new().into())).await.is_err() {
                        tracing::debug!("ping send failed, leaving teardown to the reader");
                        break;
                    }
                }
                () = quit.cancelled() => break,
            }
        }
    });
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

struct WsSink {
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
}

impl FrameSink for WsSink {
    async fn send(&mut self, bytes: Vec<u8>) -> std::io::Result<()> {
        let text = String::from_utf8(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut guard = self.sink.lock().await;
        guard
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}

struct WsSource {
    stream: SplitStream<WebSocket>,
    last_pong: Arc<AtomicU64>,
}

impl FrameSource for WsSource {
    async fn recv(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            let elapsed = now_secs().saturating_sub(self.last_pong.load(Ordering::Relaxed));
            let remaining = Duration::from_secs(PONG_WAIT.as_secs().saturating_sub(elapsed));
            match tokio::time::timeout(remaining, self.stream.next()).await {
                Err(_) => {
                    return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "pong wait exceeded"))
                }
                Ok(Some(Ok(Message::Text(text)))) => return Ok(Some(text.as_bytes().to_vec())),
                Ok(Some(Ok(Message::Binary(_)))) => continue,
                Ok(Some(Ok(Message::Pong(_)))) => {
                    self.last_pong.store(now_secs(), Ordering::Relaxed);
                    continue;
                }
                Ok(Some(Ok(Message::Ping(_)))) => continue,
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Ok(None),
                Ok(Some(Err(e))) => return Err(std::io::Error::other(e.to_string())),
            }
        }
    }
}
