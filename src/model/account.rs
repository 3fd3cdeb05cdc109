//! Accounts: one configured identity on one server.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::channel::{Channel, ChannelKey, ChannelRef};
use super::event::{EventBus, EventKind, ModelEvent, Subject};
use super::user::{Server, UserId};
use super::ModelError;
use crate::notify::ClassifierContext;
use crate::transcript::{Log, TranscriptStore};

pub type AccountId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccountState {
    #[default]
    Offline,
    Online,
    OfflineAfterError,
}

/// How to reach the server. Stored in the account file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub tls: bool,
    pub preferred_nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nick_password: Option<String>,
    #[serde(default)]
    pub quit_message: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_port() -> u16 {
    6697
}
fn default_true() -> bool {
    true
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16, preferred_nick: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            tls: port == 6697,
            preferred_nick: preferred_nick.into(),
            username: None,
            realname: None,
            password: None,
            nick_password: None,
            quit_message: None,
            accept_invalid_certs: false,
        }
    }
}

pub struct Account {
    id: AccountId,
    label: String,
    created_on: DateTime<Utc>,
    pub params: ConnectionParams,
    pub auto_connect: bool,
    accepted_nick: Option<String>,
    state: AccountState,
    last_error: Option<String>,
    channels: Vec<Channel>,
    server: Server,
    bus: Arc<EventBus>,
    store: Arc<dyn TranscriptStore>,
}

impl Account {
    pub(crate) fn new(
        id: AccountId,
        label: &str,
        params: ConnectionParams,
        bus: Arc<EventBus>,
        store: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            id,
            label: label.to_string(),
            created_on: Utc::now(),
            params,
            auto_connect: false,
            accepted_nick: None,
            state: AccountState::Offline,
            last_error: None,
            channels: Vec::new(),
            server: Server::new(id, Arc::clone(&bus)),
            bus,
            store,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub(crate) fn set_created_on(&mut self, created_on: DateTime<Utc>) {
        self.created_on = created_on;
    }

    pub fn state(&self) -> AccountState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == AccountState::Online
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_state(&mut self, state: AccountState) {
        if state == AccountState::Online {
            self.last_error = None;
        }
        if self.state != state {
            info!(account = %self.label, from = ?self.state, to = ?state, "Account state changed");
            self.state = state;
            self.bus.fire(&ModelEvent::new(
                EventKind::AccountStateChanged,
                Subject::Account(self.id),
            ));
        }
    }

    pub fn set_offline_after_error(&mut self, reason: impl fmt::Display) {
        self.last_error = Some(reason.to_string());
        self.set_state(AccountState::OfflineAfterError);
    }

    /// The nick the server accepted, or the preferred one before that.
    pub fn own_nick(&self) -> &str {
        self.accepted_nick.as_deref().unwrap_or(&self.params.preferred_nick)
    }

    pub fn accepted_nick(&self) -> Option<&str> {
        self.accepted_nick.as_deref()
    }

    pub fn is_own_nick(&self, nick: &str) -> bool {
        self.own_nick().eq_ignore_ascii_case(nick)
    }

    /// Records the nick the server uses for us, without transcript lines.
    pub fn set_accepted_nick(&mut self, nick: Option<String>) {
        self.accepted_nick = nick;
        let own = Some(self.own_nick().to_string());
        for channel in &mut self.channels {
            channel.log_mut().set_own_nick(own.clone());
        }
    }

    /// Our nick changed while connected.
    pub fn change_own_nick(&mut self, new: &str) {
        self.accepted_nick = Some(new.to_string());
        for channel in &mut self.channels {
            channel.own_nick_changed(new);
        }
    }

    /// A peer changed nick: updates the user directory, direct conversation
    /// names and presence in joined channels.
    pub fn rename_peer(&mut self, old: &str, new: &str) {
        let user = self.server.change_nick(old, new);
        for channel in &mut self.channels {
            match channel.key() {
                ChannelKey::Direct(peer) if Some(*peer) == user => channel.set_name(new),
                ChannelKey::Direct(_) => {}
                ChannelKey::Named(_) => {
                    if channel.is_joined() {
                        channel.rename_nick(old, new);
                    }
                }
            }
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    /// Listed channels only.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| c.is_listed())
    }

    pub fn all_channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn all_channels_mut(&mut self) -> &mut [Channel] {
        &mut self.channels
    }

    pub fn channel(&self, key: &ChannelKey) -> Option<&Channel> {
        self.channels.iter().find(|c| c.key() == key)
    }

    pub fn channel_mut(&mut self, key: &ChannelKey) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.key() == key)
    }

    /// Looks up a channel by name, or a direct conversation by peer nick.
    pub fn channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Creates the channel unlisted if it does not exist yet.
    pub fn find_or_create_channel(&mut self, name: &str) -> Result<ChannelKey, ModelError> {
        let key = ChannelKey::named(name);
        if self.channel(&key).is_some() {
            return Ok(key);
        }
        let context = ClassifierContext::channel(Some(self.own_nick().to_string()));
        self.open_channel(key.clone(), name, None, context)?;
        Ok(key)
    }

    /// Creates the direct conversation with `user` unlisted if needed.
    pub fn find_or_create_p2p_channel(&mut self, user: UserId) -> Result<ChannelKey, ModelError> {
        self.open_p2p_channel(user, None)
    }

    /// Like [`Account::find_or_create_p2p_channel`], reopening the transcript
    /// stored under `log_name` when the conversation predates a nick change.
    pub(crate) fn restore_p2p_channel(&mut self, user: UserId, log_name: Option<&str>) -> Result<ChannelKey, ModelError> {
        self.open_p2p_channel(user, log_name)
    }

    fn open_p2p_channel(&mut self, user: UserId, log_name: Option<&str>) -> Result<ChannelKey, ModelError> {
        let key = ChannelKey::Direct(user);
        if self.channel(&key).is_some() {
            return Ok(key);
        }
        let nick = self
            .server
            .user(user)
            .map(|u| u.nick.clone())
            .ok_or(ModelError::UnknownUser(user))?;
        let context = ClassifierContext::direct(Some(self.own_nick().to_string()));
        self.open_channel(key.clone(), &nick, log_name, context)?;
        Ok(key)
    }

    fn open_channel(
        &mut self,
        key: ChannelKey,
        name: &str,
        log_name: Option<&str>,
        context: ClassifierContext,
    ) -> Result<(), ModelError> {
        let reference = ChannelRef::new(self.id, key);
        let log_name = self.unused_log_name(log_name.unwrap_or(name));
        let resource = self.store.open(&self.label, &log_name)?;
        let log = Log::open(reference.clone(), resource, Arc::clone(&self.bus), context)?;
        self.channels
            .push(Channel::new(reference, name, &log_name, log, Arc::clone(&self.bus)));
        Ok(())
    }

    /// A renamed peer keeps its old log name, so a newcomer with that nick
    /// gets `{nick}~2`, `{nick}~3`, ... instead. `~` is not valid in nicks.
    fn unused_log_name(&self, wanted: &str) -> String {
        let taken = |candidate: &str| self.channels.iter().any(|c| c.log_name().eq_ignore_ascii_case(candidate));
        if !taken(wanted) {
            return wanted.to_string();
        }
        (2..)
            .map(|n| format!("{}~{}", wanted, n))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| wanted.to_string())
    }

    /// Makes a channel visible. Returns `false` if it was already listed or
    /// does not exist.
    pub fn ensure_listed(&mut self, key: &ChannelKey) -> bool {
        self.channel_mut(key).is_some_and(Channel::mark_listed)
    }

    /// Forgets a channel entirely.
    pub fn remove_channel(&mut self, key: &ChannelKey) -> Option<Channel> {
        let pos = self.channels.iter().position(|c| c.key() == key)?;
        let mut channel = self.channels.remove(pos);
        channel.unlist();
        Some(channel)
    }

    pub fn has_unread(&self) -> bool {
        self.channels().any(|c| c.log().has_unread())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state)
            .field("own_nick", &self.own_nick())
            .field("channels", &self.channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::testing::record_events;
    use crate::notify::NotificationLevel;
    use crate::transcript::{Message, MemoryTranscriptStore};

    fn account_on(bus: Arc<EventBus>) -> Account {
        let params = ConnectionParams::new("irc.example.net", 6697, "me");
        Account::new(Uuid::new_v4(), "example", params, bus, Arc::new(MemoryTranscriptStore::new()))
    }

    #[test]
    fn test_channel_creation_does_not_list() {
        let bus = Arc::new(EventBus::new());
        let events = record_events(&bus);
        let mut account = account_on(bus);

        let key = account.find_or_create_channel("#Rust").unwrap();
        assert_eq!(account.find_or_create_channel("#rust").unwrap(), key);
        assert_eq!(account.all_channels().len(), 1);
        assert_eq!(account.channels().count(), 0);
        assert!(events.lock().unwrap().is_empty());

        assert!(account.ensure_listed(&key));
        assert!(!account.ensure_listed(&key));
        assert_eq!(account.channels().count(), 1);
        assert_eq!(account.channel_by_name("#RUST").unwrap().name(), "#Rust");
    }

    #[test]
    fn test_p2p_channel_is_keyed_by_user() {
        let mut account = account_on(Arc::new(EventBus::new()));
        let bob = account.server_mut().find_or_create_user("bob", None);
        let key = account.find_or_create_p2p_channel(bob).unwrap();
        assert_eq!(key, ChannelKey::Direct(bob));
        assert!(account.channel(&key).unwrap().is_direct());
        assert_eq!(account.channel(&key).unwrap().name(), "bob");

        let missing = account.find_or_create_p2p_channel(UserId(99));
        assert!(matches!(missing, Err(ModelError::UnknownUser(_))));
    }

    #[test]
    fn test_state_events_only_on_transition() {
        let bus = Arc::new(EventBus::new());
        let events = record_events(&bus);
        let mut account = account_on(bus);

        account.set_state(AccountState::Online);
        account.set_state(AccountState::Online);
        account.set_offline_after_error("connection reset");
        assert_eq!(account.last_error(), Some("connection reset"));
        assert_eq!(account.state(), AccountState::OfflineAfterError);
        account.set_state(AccountState::Online);
        assert_eq!(account.last_error(), None);

        let count = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::AccountStateChanged)
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_accepted_nick_drives_mentions() {
        let mut account = account_on(Arc::new(EventBus::new()));
        let key = account.find_or_create_channel("#x").unwrap();
        account.set_accepted_nick(Some("me_".into()));
        assert!(account.is_own_nick("ME_"));

        let channel = account.channel_mut(&key).unwrap();
        channel.log_mut().append(Message::chat(Some("bob".into()), "hi me_", false));
        let level = channel.log().get(0).unwrap().notification_level();
        assert_eq!(level, NotificationLevel::MeNamed);
    }

    #[test]
    fn test_rename_peer_updates_direct_and_joined_channels() {
        let mut account = account_on(Arc::new(EventBus::new()));
        let bob = account.server_mut().find_or_create_user("bob", None);
        let direct = account.find_or_create_p2p_channel(bob).unwrap();
        let named = account.find_or_create_channel("#x").unwrap();
        {
            let channel = account.channel_mut(&named).unwrap();
            channel.set_joined(true);
            channel.extend_present(["bob"]);
        }

        account.rename_peer("bob", "robert");
        assert_eq!(account.channel(&direct).unwrap().name(), "robert");
        assert_eq!(account.channel(&direct).unwrap().log_name(), "bob");
        assert!(account.channel(&named).unwrap().is_present("robert"));
        assert_eq!(account.server().find_user("robert").unwrap().id, bob);
    }

    #[test]
    fn test_new_peer_with_renamed_nick_gets_own_log() {
        let mut account = account_on(Arc::new(EventBus::new()));
        let bob = account.server_mut().find_or_create_user("bob", None);
        let first = account.find_or_create_p2p_channel(bob).unwrap();
        account.rename_peer("bob", "robert");

        let newcomer = account.server_mut().find_or_create_user("bob", None);
        assert_ne!(newcomer, bob);
        let second = account.find_or_create_p2p_channel(newcomer).unwrap();
        assert_eq!(account.channel(&first).unwrap().log_name(), "bob");
        assert_eq!(account.channel(&second).unwrap().log_name(), "bob~2");
        assert_eq!(account.channel(&second).unwrap().name(), "bob");
    }

    #[test]
    fn test_remove_channel_forgets_it() {
        let mut account = account_on(Arc::new(EventBus::new()));
        let key = account.find_or_create_channel("#x").unwrap();
        account.ensure_listed(&key);
        let removed = account.remove_channel(&key).unwrap();
        assert!(!removed.is_listed());
        assert!(account.channel(&key).is_none());
        assert!(account.remove_channel(&key).is_none());
    }
}
