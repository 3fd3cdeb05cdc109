//! Message urgency classification.
//!
//! Every incoming message is assigned a [`NotificationLevel`] when it is
//! appended to a log. A log's aggregate level is the level of its hottest
//! unread message.

use serde::{Deserialize, Serialize};

use crate::transcript::{Message, MessageKind};

/// Ordered urgency levels. [`NotificationLevel::MeNamed`] is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum NotificationLevel {
    #[default]
    NoNotification,
    UnreadMessages,
    MeNamed,
}

impl NotificationLevel {
    pub const MAX: NotificationLevel = NotificationLevel::MeNamed;

    pub fn is_max(self) -> bool {
        self == Self::MAX
    }
}

/// Per-channel facts the classifier needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifierContext {
    pub own_nick: Option<String>,
    /// Direct conversations notify on every incoming line.
    pub p2p: bool,
}

impl ClassifierContext {
    pub fn channel(own_nick: Option<String>) -> Self {
        Self {
            own_nick,
            p2p: false,
        }
    }

    pub fn direct(own_nick: Option<String>) -> Self {
        Self {
            own_nick,
            p2p: true,
        }
    }
}

pub fn classify(message: &Message, context: &ClassifierContext) -> NotificationLevel {
    if message.kind != MessageKind::Chat || message.from_me {
        return NotificationLevel::NoNotification;
    }
    if context.p2p {
        return NotificationLevel::MeNamed;
    }
    match context.own_nick.as_deref() {
        Some(nick) if names_nick(&message.text, nick) => NotificationLevel::MeNamed,
        _ => NotificationLevel::UnreadMessages,
    }
}

/// Characters allowed in an IRC nickname (RFC 2812 section 2.3.1).
fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-[]\\`^{}|_".contains(c)
}

/// Whether `text` mentions `nick` as a whole word, ignoring ASCII case.
pub fn names_nick(text: &str, nick: &str) -> bool {
    if nick.is_empty() || text.len() < nick.len() {
        return false;
    }
    let haystack = text.to_ascii_lowercase();
    let needle = nick.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(&needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !is_nick_char(c));
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !is_nick_char(c));
        if before_ok && after_ok {
            return true;
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}
