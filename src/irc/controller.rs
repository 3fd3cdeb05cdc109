//! The session controller: owns the model and one network client per
//! account, and is the only place where user requests and protocol events
//! turn into model changes.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::client::{ClientError, Connector, NetworkClient};
use super::commands::{initial_command, RawCommand};
use crate::model::{AccountId, AccountState, ChannelKey, ChannelRef, Model, ModelError, UserId};
use crate::transcript::{Message, TranscriptError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown account {0}")]
    UnknownAccount(AccountId),

    #[error("Unknown channel {0}")]
    UnknownChannel(ChannelRef),

    #[error("Account {0} is not connected")]
    NotConnected(String),

    #[error("Failed to connect {label}: {source}")]
    Connect { label: String, source: ClientError },

    #[error("{operation} failed on {label}: {source}")]
    Client {
        label: String,
        operation: &'static str,
        source: ClientError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// What [`SessionController::post_message`] did with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Posted {
    Raw(RawCommand),
    Chat,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub command_marker: char,
    pub part_message: Option<String>,
    /// Used when the account has no quit message of its own.
    pub quit_message: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            command_marker: '/',
            part_message: None,
            quit_message: None,
        }
    }
}

pub struct SessionController {
    model: Model,
    clients: HashMap<AccountId, Box<dyn NetworkClient>>,
    connector: Box<dyn Connector>,
    options: ControllerOptions,
}

/// `#`, `&`, `+` and `!` start channel names.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

impl SessionController {
    pub fn new(model: Model, connector: Box<dyn Connector>, options: ControllerOptions) -> Self {
        Self {
            model,
            clients: HashMap::new(),
            connector,
            options,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    pub fn is_connected(&self, account: AccountId) -> bool {
        self.clients.get(&account).is_some_and(|c| c.is_connected())
    }

    fn label(&self, account: AccountId) -> String {
        self.model
            .account(account)
            .map_or_else(|| account.to_string(), |a| a.label().to_string())
    }

    /// Reuses the account's client while it is connected, otherwise opens a
    /// new one. A failed attempt leaves the account offline with the error.
    pub async fn connect(&mut self, account: AccountId) -> Result<(), SessionError> {
        if self.is_connected(account) {
            return Ok(());
        }
        if let Some(stale) = self.clients.remove(&account) {
            debug!(%account, "Closing stale client");
            stale.close();
        }

        let (label, params) = {
            let acc = self.model.account(account).ok_or(SessionError::UnknownAccount(account))?;
            (acc.label().to_string(), acc.params.clone())
        };
        info!(account = %label, host = %params.host, "Connecting account");

        match self.connector.connect(account, params).await {
            Ok(client) => {
                self.clients.insert(account, client);
                if let Some(acc) = self.model.account_mut(account) {
                    acc.set_accepted_nick(None);
                    acc.set_state(AccountState::Online);
                }
                Ok(())
            }
            Err(source) => {
                warn!(account = %label, error = %source, "Connection failed");
                if let Some(acc) = self.model.account_mut(account) {
                    acc.set_offline_after_error(&source);
                }
                Err(SessionError::Connect { label, source })
            }
        }
    }

    /// Runs one call on the account's client. A failing client is dropped
    /// and the account goes offline with the error.
    fn client_call<F>(&mut self, account: AccountId, operation: &'static str, call: F) -> Result<(), SessionError>
    where
        F: FnOnce(&dyn NetworkClient) -> Result<(), ClientError>,
    {
        let client = self
            .clients
            .get(&account)
            .ok_or_else(|| SessionError::NotConnected(self.label(account)))?;
        let result = call(client.as_ref());
        let Err(source) = result else {
            return Ok(());
        };

        if let Some(client) = self.clients.remove(&account) {
            client.close();
        }
        let label = self.label(account);
        warn!(account = %label, operation, error = %source, "Client call failed");
        if let Some(acc) = self.model.account_mut(account) {
            acc.set_offline_after_error(&source);
        }
        Err(SessionError::Client {
            label,
            operation,
            source,
        })
    }

    fn channel_name(&self, channel: &ChannelRef) -> Result<(String, bool), SessionError> {
        let ch = self
            .model
            .channel(channel)
            .ok_or_else(|| SessionError::UnknownChannel(channel.clone()))?;
        Ok((ch.name().to_string(), ch.is_direct()))
    }

    /// Finds or creates the channel and makes sure it is listed.
    pub fn find_or_create_channel(&mut self, account: AccountId, name: &str) -> Result<ChannelRef, SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        let key = acc.find_or_create_channel(name)?;
        acc.ensure_listed(&key);
        Ok(ChannelRef::new(account, key))
    }

    /// Finds or creates the direct conversation with `user` and lists it.
    pub fn find_or_create_p2p_channel(&mut self, account: AccountId, user: UserId) -> Result<ChannelRef, SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        let key = acc.find_or_create_p2p_channel(user)?;
        acc.ensure_listed(&key);
        Ok(ChannelRef::new(account, key))
    }

    pub fn find_or_create_user(
        &mut self,
        account: AccountId,
        nick: &str,
        username: Option<&str>,
    ) -> Result<UserId, SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        Ok(acc.server_mut().find_or_create_user(nick, username))
    }

    /// Joins unless already joined, connecting first when needed. Direct
    /// conversations need no server round trip.
    pub async fn join_channel(&mut self, channel: &ChannelRef) -> Result<(), SessionError> {
        let joined = self
            .model
            .channel(channel)
            .ok_or_else(|| SessionError::UnknownChannel(channel.clone()))?
            .is_joined();
        if joined {
            return Ok(());
        }

        self.connect(channel.account).await?;
        let (name, direct) = self.channel_name(channel)?;
        if !direct {
            self.client_call(channel.account, "join", |c| c.join_channel(&name))?;
        }
        if let Some(ch) = self.model.channel_mut(channel) {
            ch.set_joined(true);
        }
        Ok(())
    }

    /// Parts a joined channel. A direct conversation is forgotten instead;
    /// a network channel stays joined until the server confirms.
    pub async fn part_channel(&mut self, channel: &ChannelRef) -> Result<(), SessionError> {
        let joined = self
            .model
            .channel(channel)
            .ok_or_else(|| SessionError::UnknownChannel(channel.clone()))?
            .is_joined();
        if !joined {
            return Ok(());
        }

        let (name, direct) = self.channel_name(channel)?;
        if direct {
            if let Some(acc) = self.model.account_mut(channel.account) {
                if let Some(ch) = acc.channel_mut(&channel.key) {
                    ch.set_joined(false);
                }
                acc.remove_channel(&channel.key);
            }
            return Ok(());
        }

        self.connect(channel.account).await?;
        let message = self.options.part_message.clone();
        self.client_call(channel.account, "part", |c| c.part_channel(&name, message.as_deref()))
    }

    /// Sends user input to a channel. Input starting with the command marker
    /// and a known command goes out as a raw protocol line; anything else is
    /// chat, echoed into the channel's log.
    pub async fn post_message(&mut self, channel: &ChannelRef, text: &str) -> Result<Posted, SessionError> {
        let (target, _) = self.channel_name(channel)?;
        self.connect(channel.account).await?;

        if let Some(command) = initial_command(text, self.options.command_marker) {
            self.client_call(channel.account, "raw", |c| c.post_raw(&command.line))?;
            if let Some(ch) = self.model.channel_mut(channel) {
                let echo = Message::system(format!("Sent {}", command.name)).with_raw_input(text);
                ch.log_mut().append(echo);
            }
            return Ok(Posted::Raw(command));
        }

        self.client_call(channel.account, "message", |c| c.post_message(&target, text))?;
        let own = self.own_nick(channel.account);
        if let Some(ch) = self.model.channel_mut(channel) {
            ch.log_mut().append(Message::chat(Some(own), text, true));
        }
        Ok(Posted::Chat)
    }

    fn own_nick(&self, account: AccountId) -> String {
        self.model
            .account(account)
            .map(|a| a.own_nick().to_string())
            .unwrap_or_default()
    }

    pub async fn list_channels(&mut self, account: AccountId) -> Result<(), SessionError> {
        self.connect(account).await?;
        self.client_call(account, "list", |c| c.list_channels())
    }

    /// Asks the server for a new nick, or just changes the preferred nick
    /// while offline.
    pub fn change_nick(&mut self, account: AccountId, nick: &str) -> Result<(), SessionError> {
        if self.is_connected(account) {
            return self.client_call(account, "nick", |c| c.change_nick(nick));
        }
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        acc.params.preferred_nick = nick.to_string();
        Ok(())
    }

    /// Looking up unknown nicks is not done yet; the names are only logged.
    pub fn resolve_nicks(&mut self, account: AccountId, nicks: &[String]) {
        debug!(%account, count = nicks.len(), "Nick resolution requested");
    }

    pub fn quit(&mut self, account: AccountId) {
        let Some(client) = self.clients.remove(&account) else {
            return;
        };
        if client.is_connected() {
            let message = self.quit_message(account);
            if let Err(e) = client.quit_and_close(message.as_deref()) {
                warn!(%account, error = %e, "Quit failed");
            }
        }
        client.close();
        if let Some(acc) = self.model.account_mut(account) {
            acc.set_state(AccountState::Offline);
        }
    }

    /// Quits every connected client. Failures are logged and do not stop
    /// the others.
    pub fn quit_all(&mut self) {
        let accounts: Vec<AccountId> = self.clients.keys().copied().collect();
        for account in accounts {
            self.quit(account);
        }
    }

    fn quit_message(&self, account: AccountId) -> Option<String> {
        self.model
            .account(account)
            .and_then(|a| a.params.quit_message.clone())
            .or_else(|| self.options.quit_message.clone())
    }

    /// The server welcomed us under `nick`.
    pub fn account_online(&mut self, account: AccountId, nick: &str) {
        if let Some(acc) = self.model.account_mut(account) {
            acc.set_accepted_nick(Some(nick.to_string()));
            acc.set_state(AccountState::Online);
        }
    }

    /// The connection ended. Ignored if the account already has a newer
    /// live client.
    pub fn connection_lost(&mut self, account: AccountId, reason: &str) {
        if self.is_connected(account) {
            debug!(%account, reason, "Ignoring loss of a replaced connection");
            return;
        }
        if let Some(client) = self.clients.remove(&account) {
            client.close();
        }
        let Some(acc) = self.model.account_mut(account) else {
            return;
        };
        if acc.is_online() {
            acc.set_offline_after_error(reason);
        }
        for channel in acc.all_channels_mut() {
            if channel.is_joined() {
                channel.left();
            }
        }
    }

    pub fn user_joined(&mut self, account: AccountId, channel: &str, nick: &str) -> Result<(), SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        if acc.is_own_nick(nick) {
            let key = acc.find_or_create_channel(channel)?;
            acc.ensure_listed(&key);
            if let Some(ch) = acc.channel_mut(&key) {
                ch.joined_as(nick);
            }
            return Ok(());
        }
        if let Some(ch) = acc.channel_mut(&ChannelKey::named(channel)) {
            if ch.is_joined() {
                ch.add_nick(nick);
            }
        }
        Ok(())
    }

    /// `nick` left `channel`. Our own nick means we are no longer joined.
    pub fn user_left(&mut self, channel: &ChannelRef, nick: &str, message: Option<&str>) -> Result<(), SessionError> {
        let acc = self
            .model
            .account_mut(channel.account)
            .ok_or(SessionError::UnknownAccount(channel.account))?;
        let own = acc.is_own_nick(nick);
        let ch = acc
            .channel_mut(&channel.key)
            .ok_or_else(|| SessionError::UnknownChannel(channel.clone()))?;
        if own {
            ch.left();
        } else if ch.is_present(nick) {
            ch.remove_nick(nick, message);
        }
        Ok(())
    }

    /// `nick` quit the server. Our own quit only takes the account offline;
    /// a peer leaves every joined channel it was present in.
    pub fn user_quit(&mut self, account: AccountId, nick: &str, message: Option<&str>) -> Result<(), SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        if acc.is_own_nick(nick) {
            acc.set_state(AccountState::Offline);
            return Ok(());
        }
        for ch in acc.all_channels_mut() {
            if ch.is_joined() && ch.is_present(nick) {
                ch.remove_nick(nick, message);
            }
        }
        Ok(())
    }

    pub fn users_present(&mut self, account: AccountId, channel: &str, nicks: &[String]) {
        let Some(acc) = self.model.account_mut(account) else {
            return;
        };
        if let Some(ch) = acc.channel_mut(&ChannelKey::named(channel)) {
            ch.extend_present(nicks);
        }
    }

    pub fn nick_changed(&mut self, account: AccountId, old: &str, new: &str) {
        let Some(acc) = self.model.account_mut(account) else {
            return;
        };
        if acc.is_own_nick(old) {
            acc.change_own_nick(new);
        } else {
            acc.rename_peer(old, new);
        }
    }

    /// Appends an incoming chat line. Channel targets go to that channel;
    /// anything else is a direct conversation with the other party.
    pub fn message_arrived(
        &mut self,
        account: AccountId,
        target: &str,
        nick: &str,
        username: Option<&str>,
        text: &str,
    ) -> Result<ChannelRef, SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        let from_me = acc.is_own_nick(nick);

        let key = if is_channel_name(target) {
            acc.find_or_create_channel(target)?
        } else {
            let peer = if from_me { target } else { nick };
            let user = acc.server_mut().find_or_create_user(peer, username.filter(|_| !from_me));
            acc.find_or_create_p2p_channel(user)?
        };
        acc.ensure_listed(&key);

        let ch = acc
            .channel_mut(&key)
            .ok_or_else(|| SessionError::UnknownChannel(ChannelRef::new(account, key.clone())))?;
        if ch.is_direct() {
            ch.set_joined(true);
        }
        let log = ch.log_mut();
        log.append(Message::chat(Some(nick.to_string()), text, from_me));
        log.update_notification_level();
        Ok(ChannelRef::new(account, key))
    }

    /// Notices land in the addressed channel or an existing conversation
    /// with the sender; others are only logged.
    pub fn notice_arrived(&mut self, account: AccountId, target: &str, nick: Option<&str>, text: &str) {
        let Some(acc) = self.model.account_mut(account) else {
            return;
        };
        let label = acc.label().to_string();
        let line = match nick {
            Some(nick) => format!("-{}- {}", nick, text),
            None => text.to_string(),
        };
        let key = if is_channel_name(target) {
            Some(ChannelKey::named(target))
        } else {
            nick.and_then(|n| acc.server().find_user(n)).map(|u| ChannelKey::Direct(u.id))
        };
        match key.and_then(|k| acc.channel_mut(&k)) {
            Some(ch) => {
                ch.log_mut().append_system(line);
            }
            None => info!(account = %label, "{}", line),
        }
    }

    /// A channel reported by LIST. Created unlisted so it can be previewed.
    pub fn channel_listed(&mut self, account: AccountId, channel: &str) -> Result<ChannelRef, SessionError> {
        let acc = self
            .model
            .account_mut(account)
            .ok_or(SessionError::UnknownAccount(account))?;
        let key = acc.find_or_create_channel(channel)?;
        Ok(ChannelRef::new(account, key))
    }

    /// The server refused our JOIN.
    pub fn join_rejected(&mut self, account: AccountId, channel: &str, reason: &str) {
        let Some(acc) = self.model.account_mut(account) else {
            return;
        };
        let label = acc.label().to_string();
        match acc.channel_mut(&ChannelKey::named(channel)) {
            Some(ch) => {
                ch.set_joined(false);
                ch.log_mut().append_error(format!("Cannot join {}: {}", channel, reason));
            }
            None => warn!(account = %label, channel, reason, "Join rejected"),
        }
    }

    /// Joins every auto-join channel of an online account that is not
    /// joined yet. Offline accounts are left alone.
    pub async fn auto_join(&mut self, account: AccountId) -> Result<(), SessionError> {
        let pending: Vec<ChannelRef> = match self.model.account(account) {
            Some(acc) if !acc.is_online() => return Ok(()),
            Some(acc) => acc
                .channels()
                .filter(|c| c.auto_join && !c.is_joined())
                .map(|c| c.reference().clone())
                .collect(),
            None => return Err(SessionError::UnknownAccount(account)),
        };
        for channel in pending {
            self.join_channel(&channel).await?;
        }
        Ok(())
    }

    pub fn flush_log(&mut self, channel: &ChannelRef) -> Result<(), SessionError> {
        let ch = self
            .model
            .channel_mut(channel)
            .ok_or_else(|| SessionError::UnknownChannel(channel.clone()))?;
        ch.log_mut().ensure_all_saved()?;
        Ok(())
    }

    /// Flushes every log, returning the failures.
    pub fn flush_all(&mut self) -> Vec<TranscriptError> {
        let mut failures = Vec::new();
        for acc in self.model.accounts_mut() {
            for ch in acc.all_channels_mut() {
                if let Err(e) = ch.log_mut().ensure_all_saved() {
                    warn!(channel = %ch.name(), error = %e, "Flush failed");
                    failures.push(e);
                }
            }
        }
        failures
    }
}
