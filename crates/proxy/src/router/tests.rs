// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use anyhow::bail;
use tokio_util::sync::CancellationToken;

use crate::codec::{decode_envelope, encode_envelope, subscription_envelope, FrameKind, ResponsePayload};
use crate::connection::{writer_mailbox, WriterReceiver};
use crate::schema::Schema;

use super::{spawn, AdmitOutcome, RouterHandle};

fn schema(name: &str, states: &[&str]) -> anyhow::Result<Schema> {
    let states_json: Vec<_> =
        states.iter().map(|s| serde_json::json!({"name": s, "type": "float"})).collect();
    let raw = serde_json::json!({
        "name": name,
        "states": states_json,
        "events": [],
        "methods": [{"name": "QS", "args": [], "response": []}]
    });
    Ok(Schema::parse(&serde_json::to_vec(&raw)?, &HashMap::new())?)
}

async fn admit(router: &RouterHandle, name: &str, states: &[&str]) -> anyhow::Result<WriterReceiver> {
    let (tx, rx) = writer_mailbox();
    let outcome = router
        .admit(name.to_owned(), format!("{name}-addr"), schema(name, states)?, tx, CancellationToken::new())
        .await;
    if !matches!(outcome, AdmitOutcome::Admitted) {
        bail!("expected admission to succeed for {name}");
    }
    Ok(rx)
}

async fn recv(rx: &mut WriterReceiver) -> anyhow::Result<crate::codec::Envelope> {
    match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        Ok(Some(envelope)) => Ok(envelope),
        _ => bail!("expected a frame, none arrived within the timeout"),
    }
}

async fn recv_none(rx: &mut WriterReceiver) -> anyhow::Result<()> {
    match tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
        Err(_) => Ok(()),
        Ok(other) => bail!("expected no frame, got {other:?}"),
    }
}

#[tokio::test]
async fn state_broadcast_respects_subscriptions() -> anyhow::Result<()> {
    let router = spawn(CancellationToken::new());
    let mut a_rx = admit(&router, "A", &["x"]).await?;
    let mut b_rx = admit(&router, "B", &[]).await?;
    let mut c_rx = admit(&router, "C", &[]).await?;

    router
        .inbound("B".into(), decode_envelope(br#"{"type":"add-subscribe-state","payload":["A/x"]}"#)?)
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    router
        .inbound("A".into(), decode_envelope(br#"{"type":"state","payload":{"name":"A/x","data":1}}"#)?)
        .await;

    recv(&mut b_rx).await?;
    // A is pre-subscribed to its own declared states, so it also sees its
    // own publication; C never subscribed and sees nothing.
    recv(&mut a_rx).await?;
    recv_none(&mut c_rx).await?;
    Ok(())
}

#[tokio::test]
async fn call_response_round_trips_and_clears_waiter() -> anyhow::Result<()> {
    let router = spawn(CancellationToken::new());
    let mut a_rx = admit(&router, "A", &[]).await?;
    let mut b_rx = admit(&router, "B", &[]).await?;

    router
        .inbound(
            "A".into(),
            decode_envelope(br#"{"type":"call","payload":{"name":"B/QS","uuid":"u1","args":{}}}"#)?,
        )
        .await;
    recv(&mut b_rx).await?;

    router
        .inbound(
            "B".into(),
            decode_envelope(br#"{"type":"response","payload":{"uuid":"u1","error":"","response":{}}}"#)?,
        )
        .await;
    let back = recv(&mut a_rx).await?;
    assert_eq!(back.kind, FrameKind::Response);
    Ok(())
}

#[tokio::test]
async fn callee_disconnect_synthesizes_error_response() -> anyhow::Result<()> {
    let router = spawn(CancellationToken::new());
    let mut a_rx = admit(&router, "A", &[]).await?;
    let _b_rx = admit(&router, "B", &[]).await?;

    router
        .inbound(
            "A".into(),
            decode_envelope(br#"{"type":"call","payload":{"name":"B/QS","uuid":"u2","args":{}}}"#)?,
        )
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    router.remove("B".into(), "test teardown".into()).await;

    let reply = recv(&mut a_rx).await?;
    let bytes = encode_envelope(&reply);
    let decoded = decode_envelope(&bytes)?;
    assert_eq!(decoded.kind, FrameKind::Response);
    let payload: ResponsePayload = serde_json::from_str(decoded.payload.get())?;
    assert_eq!(payload.uuid, "u2");
    assert!(payload.error.contains("have quit"));
    Ok(())
}

#[tokio::test]
async fn call_to_unknown_model_gets_not_exist_error() -> anyhow::Result<()> {
    let router = spawn(CancellationToken::new());
    let mut a_rx = admit(&router, "A", &[]).await?;

    router
        .inbound(
            "A".into(),
            decode_envelope(br#"{"type":"call","payload":{"name":"NOPE/x","uuid":"u3","args":{}}}"#)?,
        )
        .await;
    let reply = recv(&mut a_rx).await?;
    let payload: ResponsePayload = serde_json::from_str(reply.payload.get())?;
    assert!(payload.error.contains("NOT exist"));
    Ok(())
}

#[tokio::test]
async fn admitting_duplicate_name_is_a_collision() -> anyhow::Result<()> {
    let router = spawn(CancellationToken::new());
    let _first = admit(&router, "dup", &[]).await?;

    let (tx, _rx) = writer_mailbox();
    let outcome =
        router.admit("dup".into(), "addr2".into(), schema("dup", &[])?, tx, CancellationToken::new()).await;
    assert!(matches!(outcome, AdmitOutcome::NameCollision));
    Ok(())
}

#[test]
fn subscription_payload_round_trips_as_array() -> anyhow::Result<()> {
    let env = subscription_envelope(FrameKind::AddSubscribeState, &["A/x".to_owned()]);
    let bytes = encode_envelope(&env);
    let decoded = decode_envelope(&bytes)?;
    assert_eq!(decoded.kind, FrameKind::AddSubscribeState);
    Ok(())
}
