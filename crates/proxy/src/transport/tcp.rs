// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP transport: each frame is a little-endian `u32` length prefix
//! followed by that many bytes of UTF-8 JSON.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission;
use crate::config::ProxyConfig;
use crate::connection::writer_mailbox;
use crate::logging::FrameLog;
use crate::router::RouterHandle;
use crate::worker::{run_writer, FrameSink, FrameSource};

pub struct TcpSink(OwnedWriteHalf);

impl FrameSink for TcpSink {
    async fn send(&mut self, bytes: Vec<u8>) -> std::io::Result<()> {
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.0.write_all(&len.to_le_bytes()).await?;
        self.0.write_all(&bytes).await
    }
}

pub struct TcpSource(OwnedReadHalf);

impl FrameSource for TcpSource {
    async fn recv(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match self.0.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.0.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }
}

/// Accept TCP connections until `shutdown` fires, spawning a worker pair
/// for each.
pub async fn serve(
    addr: String,
    router: RouterHandle,
    config: Arc<ProxyConfig>,
    frame_log: Option<Arc<FrameLog>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "tcp listener bound");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = accepted?;
                let router = router.clone();
                let config = Arc::clone(&config);
                let frame_log = frame_log.clone();
                tokio::spawn(async move {
                    handle(stream, remote.to_string(), router, config, frame_log).await;
                });
            }
            () = shutdown.cancelled() => {
                debug!("tcp listener shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn handle(
    stream: TcpStream,
    remote_addr: String,
    router: RouterHandle,
    config: Arc<ProxyConfig>,
    frame_log: Option<Arc<FrameLog>>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!(remote_addr, err = %e, "failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();
    let (writer_tx, writer_rx) = writer_mailbox();
    let writer_quit = CancellationToken::new();

    tokio::spawn(run_writer(
        remote_addr.clone(),
        TcpSink(write_half),
        writer_rx,
        writer_quit.clone(),
        frame_log,
        config.print_frames,
    ));

    admission::drive(remote_addr, TcpSource(read_half), writer_tx, writer_quit, router, &config).await;
}
