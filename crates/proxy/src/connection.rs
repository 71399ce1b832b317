// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The router-owned connection record and its lifecycle state machine.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{Envelope, SubscriptionOp};
use crate::schema::Schema;

/// Bound on a connection's outbound mailbox. A writer that can't keep up
/// with this many queued frames is treated as a slow consumer: new
/// frames are dropped rather than blocking the router.
pub const WRITER_MAILBOX_CAPACITY: usize = 256;

pub type WriterSender = mpsc::Sender<Envelope>;
pub type WriterReceiver = mpsc::Receiver<Envelope>;

pub fn writer_mailbox() -> (WriterSender, WriterReceiver) {
    mpsc::channel(WRITER_MAILBOX_CAPACITY)
}

/// Enqueue a frame into a writer mailbox, applying the slow-consumer
/// drop policy on a full mailbox instead of blocking the caller.
pub fn try_enqueue(tx: &WriterSender, remote: &str, envelope: Envelope, reason: &'static str) {
    match tx.try_send(envelope) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(remote, reason, "writer mailbox full, dropping frame");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(remote, reason, "writer mailbox closed, dropping frame");
        }
    }
}

/// A name-scoped set of fully-qualified subscriptions, owned exclusively
/// by the router.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet(HashSet<String>);

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn items(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }

    pub fn apply(&mut self, op: SubscriptionOp, items: &[String]) {
        match op {
            SubscriptionOp::Set => {
                self.0 = items.iter().cloned().collect();
            }
            SubscriptionOp::Add => {
                self.0.extend(items.iter().cloned());
            }
            SubscriptionOp::Remove => {
                for item in items {
                    self.0.remove(item);
                }
            }
            SubscriptionOp::Clear => {
                self.0.clear();
            }
        }
    }
}

/// A connection the router knows about. Created on admission success;
/// destroyed on removal.
pub struct ConnectionRecord {
    pub name: String,
    pub remote_addr: String,
    pub schema: Schema,
    pub state_subs: SubscriptionSet,
    pub event_subs: SubscriptionSet,
    /// UUIDs this connection originated and is waiting on a response for.
    pub outgoing_calls: HashSet<String>,
    /// UUIDs this connection must eventually answer.
    pub incoming_calls: HashSet<String>,
    pub writer: WriterSender,
    /// Cancelled by the router once removal bookkeeping has completed,
    /// telling the writer it may stop.
    pub writer_quit: CancellationToken,
}

impl ConnectionRecord {
    /// `writer_quit` is created by whoever spawns the writer task (the
    /// transport layer), before admission even begins, since a rejected
    /// connection's writer still needs to deliver its rejection event
    /// before quitting. The router never creates this token itself; it
    /// only ever cancels the one it's handed.
    pub fn new(
        name: String,
        remote_addr: String,
        schema: Schema,
        writer: WriterSender,
        writer_quit: CancellationToken,
    ) -> Self {
        Self {
            name,
            remote_addr,
            schema,
            state_subs: SubscriptionSet::new(),
            event_subs: SubscriptionSet::new(),
            outgoing_calls: HashSet::new(),
            incoming_calls: HashSet::new(),
            writer,
            writer_quit,
        }
    }

    pub fn enqueue(&self, envelope: Envelope, reason: &'static str) {
        try_enqueue(&self.writer, &self.name, envelope, reason);
    }
}
