// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives a connection from raw socket to router-managed model: the
//! handshake (query-meta / meta-info / pending-buffer replay), schema and
//! name-collision checks, and — once admitted — the steady-state loop
//! that forwards decoded frames into the router. This doubles as the
//! connection's reader: its early behavior during the handshake and its
//! later behavior forwarding frames are one continuous loop over the same
//! socket, so there is no separate reader task to hand off to.

use std::collections::HashMap;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::{decode_envelope, meta_info_envelope, query_meta_envelope, to_raw_value, Envelope, FrameKind, PublishPayload};
use crate::config::ProxyConfig;
use crate::connection::{try_enqueue, WriterSender};
use crate::error::AdmissionError;
use crate::router::{proxy_schema, AdmitOutcome, RouterHandle};
use crate::schema::Schema;
use crate::worker::FrameSource;

/// Run the handshake and, on success, the steady-state read loop for one
/// connection. Returns once the connection has been fully torn down.
///
/// `writer_quit` is created by the caller alongside the writer task,
/// before admission begins — a rejected connection's writer still needs
/// to deliver its rejection event before the caller cancels it.
pub async fn drive<R: FrameSource>(
    remote_addr: String,
    mut reader: R,
    writer_tx: WriterSender,
    writer_quit: CancellationToken,
    router: RouterHandle,
    config: &ProxyConfig,
) {
    try_enqueue(&writer_tx, &remote_addr, query_meta_envelope(), "handshake-query-meta");

    let mut pending = Vec::new();
    let handshake = tokio::time::timeout(
        config.admission_timeout(),
        wait_for_meta_info(&remote_addr, &mut reader, &writer_tx, &mut pending),
    )
    .await
    .unwrap_or(Err(AdmissionError::Timeout));

    let schema = match handshake {
        Ok(schema) => schema,
        Err(e) => {
            reject(&remote_addr, &writer_tx, &router, e, config).await;
            writer_quit.cancel();
            return;
        }
    };

    let name = schema.name.clone();
    let name = match router
        .admit(name.clone(), remote_addr.clone(), schema, writer_tx.clone(), writer_quit.clone())
        .await
    {
        AdmitOutcome::Admitted => name,
        AdmitOutcome::NameCollision => {
            reject(&remote_addr, &writer_tx, &router, AdmissionError::NameCollision(name), config).await;
            writer_quit.cancel();
            return;
        }
    };

    info!(name, remote_addr, "connection admitted, replaying pending buffer");
    for envelope in pending.drain(..) {
        router.inbound(name.clone(), envelope).await;
    }

    steady_state(&name, &remote_addr, &mut reader, &router).await;
    // The router cancels `writer_quit` itself as the last step of its
    // removal bookkeeping.
}

/// Read frames until `meta-info` arrives, buffering everything else in
/// arrival order so it can be replayed once admission succeeds.
async fn wait_for_meta_info<R: FrameSource>(
    remote_addr: &str,
    reader: &mut R,
    writer_tx: &WriterSender,
    pending: &mut Vec<Envelope>,
) -> Result<Schema, AdmissionError> {
    loop {
        let bytes = match reader.recv().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(AdmissionError::HandshakeIo("connection closed before meta-info".into()))
            }
            Err(e) => return Err(AdmissionError::HandshakeIo(e.to_string())),
        };
        let envelope = decode_envelope(&bytes).map_err(|e| AdmissionError::HandshakeIo(e.to_string()))?;
        match envelope.kind {
            FrameKind::MetaInfo => {
                return Schema::parse(envelope.payload.get().as_bytes(), &HashMap::new())
                    .map_err(|e| AdmissionError::InvalidSchema(e.to_string()));
            }
            FrameKind::QueryMeta => {
                let reply = meta_info_envelope(proxy_schema().to_canonical_json());
                try_enqueue(writer_tx, remote_addr, reply, "handshake-query-meta-reply");
            }
            _ => pending.push(envelope),
        }
    }
}

/// Forward decoded frames to the router until the socket closes or a
/// frame fails to decode, then tear the connection down.
async fn steady_state<R: FrameSource>(
    name: &str,
    remote_addr: &str,
    reader: &mut R,
    router: &RouterHandle,
) {
    let reason = loop {
        match reader.recv().await {
            Ok(Some(bytes)) => match decode_envelope(&bytes) {
                Ok(envelope) => router.inbound(name.to_owned(), envelope).await,
                Err(e) => break e.to_string(),
            },
            Ok(None) => break "connection closed".to_owned(),
            Err(e) => break e.to_string(),
        }
    };
    router.broadcast_lifecycle("closed", remote_addr.to_owned(), reason.clone()).await;
    router.remove(name.to_owned(), reason).await;
}

/// Tell the offender why admission failed, broadcast the same lifecycle
/// event to peers, then give the offender a brief grace period to read
/// it before the caller drops the socket.
async fn reject(
    remote_addr: &str,
    writer_tx: &WriterSender,
    router: &RouterHandle,
    err: AdmissionError,
    config: &ProxyConfig,
) {
    warn!(remote_addr, err = %err, "admission rejected");
    let event_name = err.event_name();
    let envelope = Envelope {
        kind: FrameKind::Event,
        payload: to_raw_value(&PublishPayload {
            name: format!("proxy/{event_name}"),
            data: json!({ "address": remote_addr, "reason": err.to_string() }),
        }),
    };
    try_enqueue(writer_tx, remote_addr, envelope, "admission-reject");
    router.broadcast_lifecycle(event_name, remote_addr.to_owned(), err.to_string()).await;
    tokio::time::sleep(config.admission_grace()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::writer_mailbox;
    use crate::router::spawn;

    struct ScriptedSource {
        frames: std::collections::VecDeque<Vec<u8>>,
    }

    impl FrameSource for ScriptedSource {
        async fn recv(&mut self) -> std::io::Result<Option<Vec<u8>>> {
            Ok(self.frames.pop_front())
        }
    }

    #[tokio::test]
    async fn successful_handshake_admits_and_replays_pending() -> anyhow::Result<()> {
        let router = spawn(CancellationToken::new());
        let (writer_tx, mut writer_rx) = writer_mailbox();

        let meta = br#"{"type":"meta-info","payload":{"name":"A","states":[{"name":"x","type":"float"}],"events":[],"methods":[]}}"#.to_vec();
        let early_state =
            br#"{"type":"state","payload":{"name":"A/x","data":1}}"#.to_vec();
        let source = ScriptedSource {
            frames: std::collections::VecDeque::from([early_state, meta]),
        };

        let config = crate::config::ProxyConfig {
            addr: "0.0.0.0:0".into(),
            ws: false,
            ws_addr: "0.0.0.0:0".into(),
            print_frames: false,
            log_frames: false,
            print_meta: false,
        };

        drive("peer:1".into(), source, writer_tx, CancellationToken::new(), router.clone(), &config).await;

        let first = writer_rx.recv().await;
        assert!(matches!(first.map(|e| e.kind), Some(FrameKind::QueryMeta)));
        Ok(())
    }
}
