// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-wire envelope and payload shapes, and the canonicalization
//! rules that every encoder/decoder pair must honor: subscription
//! payloads are always arrays, `call.args`/`response.response` are
//! always objects, `query-meta` payload is always `null`.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::FrameError;

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

/// An envelope as it crosses the wire: a type tag plus a raw, unparsed
/// payload. Keeping the payload raw lets the reader route a frame
/// without paying to decode bytes nobody downstream will look at, and
/// preserves the original numeric precision and field order when the
/// frame is simply forwarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub payload: Box<RawValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    QueryMeta,
    MetaInfo,
    State,
    Event,
    Call,
    Response,
    SetSubscribeState,
    AddSubscribeState,
    RemoveSubscribeState,
    ClearSubscribeState,
    SetSubscribeEvent,
    AddSubscribeEvent,
    RemoveSubscribeEvent,
    ClearSubscribeEvent,
}

impl FrameKind {
    pub fn is_state_subscription(self) -> bool {
        matches!(
            self,
            Self::SetSubscribeState | Self::AddSubscribeState | Self::RemoveSubscribeState | Self::ClearSubscribeState
        )
    }

    pub fn is_event_subscription(self) -> bool {
        matches!(
            self,
            Self::SetSubscribeEvent | Self::AddSubscribeEvent | Self::RemoveSubscribeEvent | Self::ClearSubscribeEvent
        )
    }
}

/// How a subscription update combines with the existing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOp {
    Set,
    Add,
    Remove,
    Clear,
}

impl FrameKind {
    pub fn subscription_op(self) -> Option<SubscriptionOp> {
        match self {
            Self::SetSubscribeState | Self::SetSubscribeEvent => Some(SubscriptionOp::Set),
            Self::AddSubscribeState | Self::AddSubscribeEvent => Some(SubscriptionOp::Add),
            Self::RemoveSubscribeState | Self::RemoveSubscribeEvent => Some(SubscriptionOp::Remove),
            Self::ClearSubscribeState | Self::ClearSubscribeEvent => Some(SubscriptionOp::Clear),
            _ => None,
        }
    }
}

/// `state` / `event` payload: a fully-qualified name plus a data/args value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishPayload {
    pub name: String,
    #[serde(alias = "args")]
    pub data: serde_json::Value,
}

/// `call` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallPayload {
    pub name: String,
    pub uuid: String,
    #[serde(default = "empty_object")]
    pub args: serde_json::Value,
}

/// `response` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub uuid: String,
    #[serde(default)]
    pub error: String,
    #[serde(default = "empty_object")]
    pub response: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Public alias of the empty-object default, for callers outside this
/// module that need to build a `response`/`call` payload from scratch.
pub fn empty_object_value() -> serde_json::Value {
    empty_object()
}

pub fn to_raw_value(value: &impl Serialize) -> Box<RawValue> {
    to_raw(value)
}

#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(borrow)]
    payload: &'a RawValue,
}

/// Decode a raw frame (one JSON value, no trailing bytes) into an envelope.
/// Unknown `type` tags are reported distinctly from other malformed input.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, FrameError> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let raw: RawEnvelope =
        serde::Deserialize::deserialize(&mut de).map_err(|e| FrameError::Malformed(e.to_string()))?;
    let kind = frame_kind_from_str(raw.kind).ok_or_else(|| FrameError::UnknownType(raw.kind.to_owned()))?;
    let payload = RawValue::from_string(raw.payload.get().to_owned())
        .map_err(|e| FrameError::Malformed(e.to_string()))?;
    de.end().map_err(|e| FrameError::Malformed(format!("trailing content: {e}")))?;
    Ok(Envelope { kind, payload })
}

fn frame_kind_from_str(tag: &str) -> Option<FrameKind> {
    Some(match tag {
        "query-meta" => FrameKind::QueryMeta,
        "meta-info" => FrameKind::MetaInfo,
        "state" => FrameKind::State,
        "event" => FrameKind::Event,
        "call" => FrameKind::Call,
        "response" => FrameKind::Response,
        "set-subscribe-state" => FrameKind::SetSubscribeState,
        "add-subscribe-state" => FrameKind::AddSubscribeState,
        "remove-subscribe-state" => FrameKind::RemoveSubscribeState,
        "clear-subscribe-state" => FrameKind::ClearSubscribeState,
        "set-subscribe-event" => FrameKind::SetSubscribeEvent,
        "add-subscribe-event" => FrameKind::AddSubscribeEvent,
        "remove-subscribe-event" => FrameKind::RemoveSubscribeEvent,
        "clear-subscribe-event" => FrameKind::ClearSubscribeEvent,
        _ => return None,
    })
}

pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    serde_json::to_vec(envelope).unwrap_or_else(|_| b"{}".to_vec())
}

/// Build an envelope whose payload is an array, as required for every
/// subscription op — even an empty update must round-trip as `[]`, never
/// `null`.
pub fn subscription_envelope(kind: FrameKind, items: &[String]) -> Envelope {
    Envelope { kind, payload: to_raw(&items) }
}

pub fn query_meta_envelope() -> Envelope {
    Envelope { kind: FrameKind::QueryMeta, payload: to_raw(&serde_json::Value::Null) }
}

pub fn meta_info_envelope(schema_json: &[u8]) -> Envelope {
    let text = String::from_utf8_lossy(schema_json).into_owned();
    #[allow(clippy::expect_used)]
    let raw = RawValue::from_string(text).expect("schema canonical JSON is always valid JSON");
    Envelope { kind: FrameKind::MetaInfo, payload: raw }
}

pub fn response_envelope(uuid: &str, error: impl Into<String>, response: serde_json::Value) -> Envelope {
    let payload = ResponsePayload { uuid: uuid.to_owned(), error: error.into(), response };
    Envelope { kind: FrameKind::Response, payload: to_raw(&payload) }
}

/// Serialize a value that is statically known to be representable as
/// JSON (our own types, or a `Vec<String>`). Never fails in practice.
#[allow(clippy::expect_used)]
fn to_raw(value: &impl Serialize) -> Box<RawValue> {
    serde_json::value::to_raw_value(value).expect("value is always JSON-serializable")
}
