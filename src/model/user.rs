//! Account-scoped user directory.

use std::sync::Arc;

use tracing::debug;

use super::account::AccountId;
use super::event::{EventBus, EventKind, ModelEvent, Subject};

/// Stable within one account for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub(crate) u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub nick: String,
    pub username: Option<String>,
}

/// The users known on one server connection.
pub struct Server {
    account: AccountId,
    users: Vec<User>,
    next_id: u64,
    bus: Arc<EventBus>,
}

impl Server {
    pub fn new(account: AccountId, bus: Arc<EventBus>) -> Self {
        Self {
            account,
            users: Vec::new(),
            next_id: 1,
            bus,
        }
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Nicks compare case-insensitively.
    pub fn find_user(&self, nick: &str) -> Option<&User> {
        self.users.iter().find(|u| u.nick.eq_ignore_ascii_case(nick))
    }

    pub fn find_or_create_user(&mut self, nick: &str, username: Option<&str>) -> UserId {
        if let Some(user) = self.users.iter_mut().find(|u| u.nick.eq_ignore_ascii_case(nick)) {
            if user.username.is_none() {
                user.username = username.map(str::to_string);
            }
            return user.id;
        }
        let id = UserId(self.next_id);
        self.next_id += 1;
        self.users.push(User {
            id,
            nick: nick.to_string(),
            username: username.map(str::to_string),
        });
        debug!(account = %self.account, nick, "User added");
        self.bus.fire(&ModelEvent::new(
            EventKind::UserAdded,
            Subject::User {
                account: self.account,
                user: id,
            },
        ));
        id
    }

    /// Returns the id of the renamed user, if known.
    pub fn change_nick(&mut self, old: &str, new: &str) -> Option<UserId> {
        let user = self.users.iter_mut().find(|u| u.nick.eq_ignore_ascii_case(old))?;
        user.nick = new.to_string();
        Some(user.id)
    }
}
