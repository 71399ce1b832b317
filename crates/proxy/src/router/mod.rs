// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The central router: a single task that owns every connection record
//! and call-waiter entry, and serializes all cross-connection effects.

mod commands;
mod proxy_model;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

pub use commands::{AdmitOutcome, RouterCommand, RouterHandle};
pub use proxy_model::proxy_schema;

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{
    empty_object_value, meta_info_envelope, response_envelope, to_raw_value, CallPayload, Envelope,
    FrameKind, PublishPayload, ResponsePayload,
};
use crate::connection::{ConnectionRecord, SubscriptionSet, WriterSender};
use crate::schema::Schema;

/// Spawn the router task, returning a handle to send it commands.
pub fn spawn(shutdown: CancellationToken) -> RouterHandle {
    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(Router::new().run(rx, shutdown));
    RouterHandle::new(tx)
}

struct Router {
    connections: HashMap<String, ConnectionRecord>,
    /// UUID -> name of the connection awaiting the response.
    call_waiters: HashMap<String, String>,
    /// UUID -> short method name, kept alongside `call_waiters` so a
    /// `response` can be validated against the callee's own method
    /// schema before it's forwarded.
    call_methods: HashMap<String, String>,
}

impl Router {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            call_waiters: HashMap::new(),
            call_methods: HashMap::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RouterCommand>, shutdown: CancellationToken) {
        info!("router started");
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle(cmd);
                }
                _ = shutdown.cancelled() => {
                    debug!("router shutting down");
                    break;
                }
            }
        }
        for (name, conn) in self.connections.drain() {
            debug!(name, "router shutdown: closing connection");
            conn.writer_quit.cancel();
        }
    }

    fn handle(&mut self, cmd: RouterCommand) {
        match cmd {
            RouterCommand::Admit { name, remote_addr, schema, writer, writer_quit, reply } => {
                self.admit(name, remote_addr, schema, writer, writer_quit, reply);
            }
            RouterCommand::Inbound { from, envelope } => {
                self.inbound(&from, envelope);
            }
            RouterCommand::Remove { name, reason } => {
                self.remove(&name, &reason);
            }
            RouterCommand::BroadcastLifecycle { event, remote_addr, reason } => {
                self.broadcast_lifecycle(event, &remote_addr, &reason, None);
            }
        }
    }

    fn admit(
        &mut self,
        name: String,
        remote_addr: String,
        schema: Schema,
        writer: WriterSender,
        writer_quit: CancellationToken,
        reply: oneshot::Sender<AdmitOutcome>,
    ) {
        if self.connections.contains_key(&name) {
            let _ = reply.send(AdmitOutcome::NameCollision);
            return;
        }
        let mut record = ConnectionRecord::new(name.clone(), remote_addr.clone(), schema, writer, writer_quit);

        // Pre-subscribe the new connection to its own declared states and
        // events. Peers must still explicitly subscribe to reach it; see
        // the pre-subscription policy note in the design doc.
        let own_states = record.schema.all_states();
        let own_events = record.schema.all_events();
        record.state_subs = subs_from(own_states);
        record.event_subs = subs_from(own_events);

        self.connections.insert(name.clone(), record);
        info!(name, remote_addr, "connection admitted");
        self.broadcast_lifecycle("online", &remote_addr, "", Some(&name));
        let _ = reply.send(AdmitOutcome::Admitted);
    }

    fn inbound(&mut self, from: &str, envelope: Envelope) {
        match envelope.kind {
            FrameKind::State => self.publish(from, envelope, true),
            FrameKind::Event => self.publish(from, envelope, false),
            k if k.is_state_subscription() || k.is_event_subscription() => {
                self.update_subscription(from, envelope);
            }
            FrameKind::Call => self.dispatch_call(from, envelope),
            FrameKind::Response => self.route_response(from, envelope),
            FrameKind::QueryMeta => self.answer_query_meta(from),
            other => {
                warn!(from, kind = ?other, "inbound frame not valid post-admission, ignoring");
            }
        }
    }

    fn publish(&mut self, from: &str, envelope: Envelope, is_state: bool) {
        let payload: PublishPayload = match serde_json::from_str(envelope.payload.get()) {
            Ok(p) => p,
            Err(e) => {
                warn!(from, err = %e, "dropping malformed publish payload");
                return;
            }
        };
        if payload.name.is_empty() || payload.data.is_null() {
            warn!(from, "dropping publish with empty name or null data");
            return;
        }
        if let Some(conn) = self.connections.get(from) {
            let prefix = format!("{from}/");
            let Some(short_name) = payload.name.strip_prefix(prefix.as_str()) else {
                warn!(from, name = payload.name, "dropping publish for a name the publisher does not own");
                return;
            };
            let result = if is_state {
                conn.schema.verify_state(short_name, &payload.data)
            } else {
                conn.schema.verify_event(short_name, &payload.data)
            };
            if let Err(e) = result {
                warn!(from, err = %e, "dropping publish that failed schema validation");
                return;
            }
        }
        for (peer_name, peer) in self.connections.iter() {
            let subscribed = if is_state {
                peer.state_subs.contains(&payload.name)
            } else {
                peer.event_subs.contains(&payload.name)
            };
            if peer_name == from && !subscribed {
                continue;
            }
            if subscribed {
                peer.enqueue(envelope.clone(), "broadcast");
            }
        }
    }

    fn update_subscription(&mut self, from: &str, envelope: Envelope) {
        let Some(conn) = self.connections.get_mut(from) else { return };
        let Some(op) = envelope.kind.subscription_op() else { return };
        let items: Vec<String> = match serde_json::from_str(envelope.payload.get()) {
            Ok(items) => items,
            Err(e) => {
                warn!(from, err = %e, "dropping malformed subscription payload");
                return;
            }
        };
        if envelope.kind.is_state_subscription() {
            conn.state_subs.apply(op, &items);
        } else {
            conn.event_subs.apply(op, &items);
        }
    }

    fn dispatch_call(&mut self, from: &str, envelope: Envelope) {
        let call: CallPayload = match serde_json::from_str(envelope.payload.get()) {
            Ok(c) => c,
            Err(e) => {
                warn!(from, err = %e, "dropping malformed call payload");
                return;
            }
        };
        if call.uuid.is_empty() || call.args.is_null() {
            self.reply_error(from, &call.uuid, "call requires a non-empty uuid and non-null args");
            return;
        }

        let Some((model, method)) = call.name.rsplit_once('/') else {
            self.reply_error(from, &call.uuid, &format!("invalid method name \"{}\"", call.name));
            return;
        };

        if model == "proxy" {
            let response = proxy_model::invoke(self, method, &call.args);
            if let Some(caller) = self.connections.get(from) {
                caller.enqueue(response_envelope(&call.uuid, "", response), "proxy-call-response");
            }
            return;
        }

        let Some(target) = self.connections.get(model) else {
            self.reply_error(from, &call.uuid, &format!("model \"{model}\" NOT exist"));
            return;
        };

        if let Err(e) = target.schema.verify_method_args(method, &call.args) {
            self.reply_error(from, &call.uuid, &e.to_string());
            return;
        }

        self.call_waiters.insert(call.uuid.clone(), from.to_owned());
        self.call_methods.insert(call.uuid.clone(), method.to_owned());
        if let Some(target) = self.connections.get_mut(model) {
            target.incoming_calls.insert(call.uuid.clone());
            target.enqueue(envelope, "call");
        }
        if let Some(caller) = self.connections.get_mut(from) {
            caller.outgoing_calls.insert(call.uuid);
        }
    }

    fn route_response(&mut self, from: &str, envelope: Envelope) {
        let response: ResponsePayload = match serde_json::from_str(envelope.payload.get()) {
            Ok(r) => r,
            Err(e) => {
                warn!(from, err = %e, "dropping malformed response payload");
                return;
            }
        };
        if let Some(conn) = self.connections.get_mut(from) {
            conn.incoming_calls.remove(&response.uuid);
        }
        let Some(waiter) = self.call_waiters.remove(&response.uuid) else {
            debug!(from, uuid = response.uuid, "response for unknown or stale call, dropping");
            return;
        };
        let method = self.call_methods.remove(&response.uuid);
        if response.error.is_empty() {
            if let (Some(method), Some(conn)) = (method.as_ref(), self.connections.get(from)) {
                if let Err(e) = conn.schema.verify_method_resp(method, &response.response) {
                    warn!(from, err = %e, "callee response failed schema validation");
                    if let Some(caller) = self.connections.get_mut(&waiter) {
                        caller.outgoing_calls.remove(&response.uuid);
                        caller.enqueue(
                            response_envelope(&response.uuid, e.to_string(), empty_object_value()),
                            "response-schema-violation",
                        );
                    }
                    return;
                }
            }
        }
        if let Some(caller) = self.connections.get_mut(&waiter) {
            caller.outgoing_calls.remove(&response.uuid);
            caller.enqueue(envelope, "response");
        }
    }

    fn answer_query_meta(&mut self, from: &str) {
        if let Some(conn) = self.connections.get(from) {
            conn.enqueue(meta_info_envelope(conn.schema.to_canonical_json()), "query-meta-reply");
        }
    }

    fn reply_error(&mut self, from: &str, uuid: &str, message: &str) {
        if let Some(caller) = self.connections.get(from) {
            caller.enqueue(response_envelope(uuid, message, empty_object_value()), "call-error");
        }
    }

    fn remove(&mut self, name: &str, reason: &str) {
        let Some(conn) = self.connections.remove(name) else { return };
        for uuid in &conn.incoming_calls {
            self.call_methods.remove(uuid);
            if let Some(waiter) = self.call_waiters.remove(uuid) {
                if let Some(caller) = self.connections.get(&waiter) {
                    caller.enqueue(
                        response_envelope(
                            uuid,
                            format!("model \"{name}\" have quit"),
                            empty_object_value(),
                        ),
                        "callee-gone",
                    );
                }
            }
        }
        for uuid in &conn.outgoing_calls {
            self.call_waiters.remove(uuid);
            self.call_methods.remove(uuid);
        }
        info!(name, reason, "connection removed");
        self.broadcast_lifecycle("offline", &conn.remote_addr, reason, Some(name));
        conn.writer_quit.cancel();
    }

    /// Fan out a `proxy/<event>` lifecycle event to every connection
    /// subscribed to it. `subject` (if any) is excluded as a recipient —
    /// used when the event is *about* that connection (e.g. its own
    /// `online`/`offline`).
    fn broadcast_lifecycle(&self, event: &str, remote_addr: &str, reason: &str, subject: Option<&str>) {
        let name = format!("proxy/{event}");
        let envelope = Envelope {
            kind: FrameKind::Event,
            payload: to_raw_value(&PublishPayload {
                name: name.clone(),
                data: serde_json::json!({ "address": remote_addr, "reason": reason, "name": subject }),
            }),
        };
        for (peer_name, peer) in self.connections.iter() {
            if Some(peer_name.as_str()) == subject {
                continue;
            }
            if peer.event_subs.contains(&name) {
                peer.enqueue(envelope.clone(), "lifecycle");
            }
        }
    }
}

fn subs_from(items: Vec<String>) -> SubscriptionSet {
    let mut set = SubscriptionSet::new();
    set.apply(crate::codec::SubscriptionOp::Set, &items);
    set
}
