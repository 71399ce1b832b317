// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::codec::Envelope;
use crate::connection::WriterSender;
use crate::schema::Schema;

/// Commands accepted by the router task.
pub enum RouterCommand {
    /// Admission succeeded locally; ask the router to claim the name and
    /// create the connection record. Fails with `NameCollision` if the
    /// name is already taken.
    Admit {
        name: String,
        remote_addr: String,
        schema: Schema,
        writer: WriterSender,
        writer_quit: CancellationToken,
        reply: oneshot::Sender<AdmitOutcome>,
    },
    /// A frame from an already-admitted connection.
    Inbound { from: String, envelope: Envelope },
    /// `from`'s reader has ended; tear down its record.
    Remove { name: String, reason: String },
    /// An admission attempt failed before a record existed. Tell
    /// already-connected peers about it (the offender itself is notified
    /// directly by the admission controller, which still holds its
    /// writer mailbox at that point).
    BroadcastLifecycle { event: &'static str, remote_addr: String, reason: String },
}

pub enum AdmitOutcome {
    Admitted,
    NameCollision,
}

/// A cheaply-cloneable handle to the router's command channel.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    pub fn new(tx: mpsc::Sender<RouterCommand>) -> Self {
        Self { tx }
    }

    pub async fn admit(
        &self,
        name: String,
        remote_addr: String,
        schema: Schema,
        writer: WriterSender,
        writer_quit: CancellationToken,
    ) -> AdmitOutcome {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(RouterCommand::Admit { name, remote_addr, schema, writer, writer_quit, reply })
            .await
            .is_err()
        {
            return AdmitOutcome::NameCollision;
        }
        rx.await.unwrap_or(AdmitOutcome::NameCollision)
    }

    pub async fn inbound(&self, from: String, envelope: Envelope) {
        let _ = self.tx.send(RouterCommand::Inbound { from, envelope }).await;
    }

    pub async fn remove(&self, name: String, reason: String) {
        let _ = self.tx.send(RouterCommand::Remove { name, reason }).await;
    }

    pub async fn broadcast_lifecycle(&self, event: &'static str, remote_addr: String, reason: String) {
        let _ = self.tx.send(RouterCommand::BroadcastLifecycle { event, remote_addr, reason }).await;
    }
}
