//! Model listeners that turn model changes into follow-up work on the
//! session queue. They never touch the model themselves.

use anyhow::Context;

use super::event::{EventSender, SessionEvent};
use crate::model::{EventKind, ModelEvent, ModelEventListener};

/// Requests log flushes and account saves.
pub struct PersistenceListener {
    tx: EventSender,
    persist_logs: bool,
}

impl PersistenceListener {
    pub fn new(tx: EventSender, persist_logs: bool) -> Self {
        Self { tx, persist_logs }
    }
}

impl ModelEventListener for PersistenceListener {
    fn handle(&self, event: &ModelEvent) -> anyhow::Result<()> {
        let follow_up = match event.kind {
            EventKind::NewMessage | EventKind::MessageReplaced if self.persist_logs => {
                event.subject.channel().cloned().map(SessionEvent::FlushLog)
            }
            EventKind::AccountAdded
            | EventKind::AccountRemoved
            | EventKind::AccountChannelAdded
            | EventKind::ChannelJoinedChanged => Some(SessionEvent::SaveAccounts),
            _ => None,
        };
        if let Some(follow_up) = follow_up {
            self.tx.send(follow_up).context("session queue closed")?;
        }
        Ok(())
    }
}

/// Asks for auto-join whenever an account changes state; the session only
/// acts on accounts that came online.
pub struct AutoJoinListener {
    tx: EventSender,
}

impl AutoJoinListener {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }
}

impl ModelEventListener for AutoJoinListener {
    fn handle(&self, event: &ModelEvent) -> anyhow::Result<()> {
        if event.kind == EventKind::AccountStateChanged {
            self.tx
                .send(SessionEvent::AutoJoin(event.subject.account()))
                .context("session queue closed")?;
        }
        Ok(())
    }
}
