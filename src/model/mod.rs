//! In-memory directory of accounts, channels and users.
//!
//! The [`Model`] is owned by the session controller and only mutated from the
//! single event loop. Every observable change is announced on the shared
//! [`EventBus`].

pub mod account;
pub mod channel;
pub mod event;
pub mod storage;
pub mod user;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::notify::NotificationLevel;
use crate::transcript::{TranscriptError, TranscriptStore};

pub use account::{Account, AccountId, AccountState, ConnectionParams};
pub use channel::{Channel, ChannelKey, ChannelRef};
pub use event::{EventBus, EventKind, ModelEvent, ModelEventListener, Subject, SubscriptionId};
pub use user::{Server, User, UserId};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Account label {0:?} is already in use")]
    DuplicateLabel(String),

    #[error("Invalid account label {0:?}")]
    InvalidLabel(String),

    #[error("Unknown user {0:?}")]
    UnknownUser(UserId),

    #[error("I/O error on {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("Failed to parse {path}: {source}")]
    Parse { path: String, source: toml::de::Error },

    #[error("Failed to serialize account {label}: {source}")]
    Serialize { label: String, source: toml::ser::Error },

    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Counts shown in a tray or status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountsStatistics {
    pub online: usize,
    pub offline: usize,
    pub offline_after_error: usize,
    pub channels_with_unread: usize,
    pub channels_naming_me: usize,
}

pub struct Model {
    accounts: BTreeMap<String, Account>,
    bus: Arc<EventBus>,
    store: Arc<dyn TranscriptStore>,
}

impl Model {
    pub fn new(bus: Arc<EventBus>, store: Arc<dyn TranscriptStore>) -> Self {
        Self {
            accounts: BTreeMap::new(),
            bus,
            store,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// A new account that is not part of the model yet.
    pub fn create_account(&self, label: &str, params: ConnectionParams) -> Result<Account, ModelError> {
        self.create_account_with_id(Uuid::new_v4(), label, params)
    }

    pub(crate) fn create_account_with_id(
        &self,
        id: AccountId,
        label: &str,
        params: ConnectionParams,
    ) -> Result<Account, ModelError> {
        validate_label(label)?;
        Ok(Account::new(
            id,
            label,
            params,
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
        ))
    }

    pub fn add_account(&mut self, account: Account) -> Result<AccountId, ModelError> {
        let id = self.insert(account)?;
        self.bus
            .fire(&ModelEvent::new(EventKind::AccountAdded, Subject::Account(id)));
        Ok(id)
    }

    fn insert(&mut self, account: Account) -> Result<AccountId, ModelError> {
        if self.accounts.contains_key(account.label()) {
            return Err(ModelError::DuplicateLabel(account.label().to_string()));
        }
        let id = account.id();
        info!(account = %account.label(), %id, "Account added");
        self.accounts.insert(account.label().to_string(), account);
        Ok(id)
    }

    pub fn remove_account(&mut self, id: AccountId) -> Option<Account> {
        let label = self.account(id)?.label().to_string();
        let account = self.accounts.remove(&label)?;
        self.bus
            .fire(&ModelEvent::new(EventKind::AccountRemoved, Subject::Account(id)));
        Some(account)
    }

    /// Accounts in label order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn accounts_mut(&mut self) -> impl Iterator<Item = &mut Account> {
        self.accounts.values_mut()
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.values().map(Account::id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.values().find(|a| a.id() == id)
    }

    pub fn account_mut(&mut self, id: AccountId) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.id() == id)
    }

    pub fn account_by_label(&self, label: &str) -> Option<&Account> {
        self.accounts.get(label)
    }

    pub fn channel(&self, reference: &ChannelRef) -> Option<&Channel> {
        self.account(reference.account)?.channel(&reference.key)
    }

    pub fn channel_mut(&mut self, reference: &ChannelRef) -> Option<&mut Channel> {
        self.account_mut(reference.account)?.channel_mut(&reference.key)
    }

    pub fn statistics(&self) -> AccountsStatistics {
        let mut stats = AccountsStatistics::default();
        for account in self.accounts.values() {
            match account.state() {
                AccountState::Online => stats.online += 1,
                AccountState::Offline => stats.offline += 1,
                AccountState::OfflineAfterError => stats.offline_after_error += 1,
            }
            for channel in account.channels() {
                let log = channel.log();
                if log.has_unread() {
                    stats.channels_with_unread += 1;
                }
                if log.notification_level() == NotificationLevel::MeNamed {
                    stats.channels_naming_me += 1;
                }
            }
        }
        stats
    }

    /// Suggests the next account: an unused `Account#N` label with the
    /// connection settings of the most recently created account, or
    /// `defaults` if there is none.
    pub fn propose_next_account(&self, defaults: ConnectionParams) -> Result<Account, ModelError> {
        let mut n = self.accounts.len() + 1;
        let label = loop {
            let candidate = format!("Account#{}", n);
            if !self.accounts.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        let params = self
            .accounts
            .values()
            .max_by_key(|a| a.created_on())
            .map_or(defaults, |latest| ConnectionParams {
                password: None,
                nick_password: None,
                ..latest.params.clone()
            });
        self.create_account(&label, params)
    }
}

/// Labels end up in file names.
fn validate_label(label: &str) -> Result<(), ModelError> {
    let valid = !label.trim().is_empty()
        && label != "."
        && label != ".."
        && !label.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidLabel(label.to_string()))
    }
}
