// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The writer half of a connection worker pair, transport-agnostic over
//! whatever raw bytes a TCP or WebSocket stream produces and consumes.
//! The reader half lives in [`crate::admission`], since its early
//! behavior during the handshake and its steady-state behavior afterward
//! are the same loop with different destinations for decoded frames.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::encode_envelope;
use crate::connection::WriterReceiver;
use crate::logging::FrameLog;

/// One outbound byte sink for a connection's transport. TCP and
/// WebSocket each implement this over their own framing.
pub trait FrameSink: Send {
    fn send(&mut self, bytes: Vec<u8>) -> impl Future<Output = std::io::Result<()>> + Send;
}

/// One inbound byte source. Returns `Ok(None)` on a clean EOF.
pub trait FrameSource: Send {
    fn recv(&mut self) -> impl Future<Output = std::io::Result<Option<Vec<u8>>>> + Send;
}

/// Drain `mailbox` to `sink` until told to quit. Write errors are logged
/// and swallowed: a broken socket must never deadlock a sender, and the
/// writer terminates only on an explicit quit signal, never on its own
/// write failures (the paired reader's next read error is what actually
/// tears the connection down).
pub async fn run_writer<S: FrameSink>(
    name: String,
    mut sink: S,
    mut mailbox: WriterReceiver,
    quit: CancellationToken,
    frame_log: Option<Arc<FrameLog>>,
    print_frames: bool,
) {
    loop {
        tokio::select! {
            _ = quit.cancelled() => break,
            frame = mailbox.recv() => {
                let Some(envelope) = frame else { break };
                let bytes = encode_envelope(&envelope);
                if print_frames {
                    println!("-> {name}: {}", String::from_utf8_lossy(&bytes));
                }
                if let Some(log) = &frame_log {
                    log.record("out", &name, &bytes).await;
                }
                if let Err(e) = sink.send(bytes).await {
                    warn!(name, err = %e, "write failed, frame dropped (writer exits only on quit)");
                }
            }
        }
    }
    debug!(name, "writer task exiting");
}
