//! Synchronous model-change notifications.
//!
//! Every mutation of the model that others may care about fires a
//! [`ModelEvent`] on the shared [`EventBus`]. Delivery happens on the calling
//! thread, in subscription order, before the mutating call returns. A listener
//! that fails or panics is logged and skipped; the remaining listeners still
//! run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::error;

use super::account::AccountId;
use super::channel::ChannelRef;
use super::user::UserId;
use crate::transcript::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountAdded,
    AccountRemoved,
    AccountStateChanged,
    ChannelJoinedChanged,
    AccountChannelAdded,
    UserAdded,
    NewMessage,
    MessageReplaced,
    LogStateChanged,
}

/// What an event is about.
#[derive(Debug, Clone)]
pub enum Subject {
    Account(AccountId),
    Channel(ChannelRef),
    User { account: AccountId, user: UserId },
    Message {
        channel: ChannelRef,
        index: usize,
        message: Message,
    },
    Log(ChannelRef),
}

impl Subject {
    pub fn account(&self) -> AccountId {
        match self {
            Subject::Account(id) => *id,
            Subject::User { account, .. } => *account,
            Subject::Channel(channel) | Subject::Log(channel) | Subject::Message { channel, .. } => channel.account,
        }
    }

    pub fn channel(&self) -> Option<&ChannelRef> {
        match self {
            Subject::Channel(channel) | Subject::Log(channel) | Subject::Message { channel, .. } => Some(channel),
            Subject::Account(_) | Subject::User { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelEvent {
    pub kind: EventKind,
    pub subject: Subject,
}

impl ModelEvent {
    pub fn new(kind: EventKind, subject: Subject) -> Self {
        Self { kind, subject }
    }
}

pub trait ModelEventListener: Send + Sync {
    fn handle(&self, event: &ModelEvent) -> anyhow::Result<()>;
}

impl<F> ModelEventListener for F
where
    F: Fn(&ModelEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &ModelEvent) -> anyhow::Result<()> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn ModelEventListener>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn ModelEventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn subscribe_fn<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ModelEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(listener))
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Delivers to a snapshot of the listeners, so a listener may subscribe or
    /// unsubscribe while being called.
    pub fn fire(&self, event: &ModelEvent) {
        let snapshot: Vec<(SubscriptionId, Arc<dyn ModelEventListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(listener = id.0, kind = ?event.kind, "Model listener failed: {:#}", e);
                }
                Err(_) => {
                    error!(listener = id.0, kind = ?event.kind, "Model listener panicked");
                }
            }
        }
    }
}
