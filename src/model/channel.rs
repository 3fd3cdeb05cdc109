//! Channels and direct conversations.

use std::fmt;
use std::sync::Arc;

use super::account::AccountId;
use super::event::{EventBus, EventKind, ModelEvent, Subject};
use super::user::UserId;
use crate::transcript::Log;

/// Identifies a channel within its account. Named channels compare
/// case-insensitively; direct conversations are keyed by the peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKey {
    Named(String),
    Direct(UserId),
}

impl ChannelKey {
    pub fn named(name: &str) -> Self {
        ChannelKey::Named(name.to_lowercase())
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ChannelKey::Direct(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub account: AccountId,
    pub key: ChannelKey,
}

impl ChannelRef {
    pub fn new(account: AccountId, key: ChannelKey) -> Self {
        Self { account, key }
    }

    pub fn named(account: AccountId, name: &str) -> Self {
        Self::new(account, ChannelKey::named(name))
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ChannelKey::Named(name) => write!(f, "{}/{}", self.account, name),
            ChannelKey::Direct(user) => write!(f, "{}/@{}", self.account, user.0),
        }
    }
}

pub struct Channel {
    reference: ChannelRef,
    name: String,
    /// Name the transcript was opened under. Fixed for the channel's lifetime,
    /// so a direct conversation keeps its history across nick changes.
    log_name: String,
    joined: bool,
    pub auto_join: bool,
    /// Persisted with the account even while not joined.
    pub kept: bool,
    listed: bool,
    present: Vec<String>,
    log: Log,
    bus: Arc<EventBus>,
}

impl Channel {
    pub(crate) fn new(reference: ChannelRef, name: &str, log_name: &str, log: Log, bus: Arc<EventBus>) -> Self {
        Self {
            reference,
            name: name.to_string(),
            log_name: log_name.to_string(),
            joined: false,
            auto_join: false,
            kept: false,
            listed: false,
            present: Vec::new(),
            log,
            bus,
        }
    }

    pub fn reference(&self) -> &ChannelRef {
        &self.reference
    }

    pub fn key(&self) -> &ChannelKey {
        &self.reference.key
    }

    /// Channel name, or the peer's nick for a direct conversation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn is_direct(&self) -> bool {
        self.reference.key.is_direct()
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn is_listed(&self) -> bool {
        self.listed
    }

    pub fn present(&self) -> &[String] {
        &self.present
    }

    pub fn is_present(&self, nick: &str) -> bool {
        self.present.iter().any(|n| n.eq_ignore_ascii_case(nick))
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut Log {
        &mut self.log
    }

    pub fn set_joined(&mut self, joined: bool) {
        if self.joined != joined {
            self.joined = joined;
            self.bus.fire(&ModelEvent::new(
                EventKind::ChannelJoinedChanged,
                Subject::Channel(self.reference.clone()),
            ));
        }
    }

    /// Returns `true` if the channel was not listed before.
    pub(crate) fn mark_listed(&mut self) -> bool {
        if self.listed {
            return false;
        }
        self.listed = true;
        self.bus.fire(&ModelEvent::new(
            EventKind::AccountChannelAdded,
            Subject::Channel(self.reference.clone()),
        ));
        true
    }

    pub(crate) fn unlist(&mut self) {
        self.listed = false;
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Our own JOIN was confirmed.
    pub fn joined_as(&mut self, own_nick: &str) {
        self.set_joined(true);
        self.log.append_system(format!("You joined as {}", own_nick));
    }

    /// We left, by PART, KICK or disconnect.
    pub fn left(&mut self) {
        self.present.clear();
        if self.joined {
            self.log.append_system("You left");
        }
        self.set_joined(false);
    }

    /// Returns `true` if the nick was not present yet.
    pub fn add_nick(&mut self, nick: &str) -> bool {
        if self.is_present(nick) {
            return false;
        }
        self.present.push(nick.to_string());
        self.log.append_system(format!("{} joined", nick));
        true
    }

    /// Adds nicks from a NAMES listing without transcript noise.
    pub fn extend_present<I, S>(&mut self, nicks: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for nick in nicks {
            let nick = nick.as_ref();
            if !nick.is_empty() && !self.is_present(nick) {
                self.present.push(nick.to_string());
            }
        }
    }

    /// Returns `true` if the nick was present.
    pub fn remove_nick(&mut self, nick: &str, message: Option<&str>) -> bool {
        let Some(pos) = self.present.iter().position(|n| n.eq_ignore_ascii_case(nick)) else {
            return false;
        };
        self.present.remove(pos);
        match message.filter(|m| !m.is_empty()) {
            Some(message) => self.log.append_system(format!("{} left: {}", nick, message)),
            None => self.log.append_system(format!("{} left", nick)),
        };
        true
    }

    /// Returns `true` if `old` was present.
    pub fn rename_nick(&mut self, old: &str, new: &str) -> bool {
        let Some(slot) = self.present.iter_mut().find(|n| n.eq_ignore_ascii_case(old)) else {
            return false;
        };
        *slot = new.to_string();
        self.log.append_system(format!("{} is known as {}", old, new));
        true
    }

    pub(crate) fn own_nick_changed(&mut self, new: &str) {
        self.log.set_own_nick(Some(new.to_string()));
        if self.joined {
            self.log.append_system(format!("You are known as {}", new));
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("reference", &self.reference)
            .field("name", &self.name)
            .field("joined", &self.joined)
            .field("auto_join", &self.auto_join)
            .field("kept", &self.kept)
            .field("listed", &self.listed)
            .field("present", &self.present)
            .finish()
    }
}
