//! Per-channel transcripts with incremental persistence.
//!
//! A [`Log`] keeps every record of a channel in memory together with its byte
//! and line position in the backing resource. Appends and in-place
//! replacements only touch memory; [`Log::ensure_all_saved`] later writes the
//! changed suffix to the resource.

pub mod cursor;
pub mod reader;
pub mod record;
pub mod resource;

use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::channel::ChannelRef;
use crate::model::event::{EventBus, EventKind, ModelEvent, Subject};
use crate::notify::{classify, ClassifierContext, NotificationLevel};

pub use cursor::LogCursor;
pub use reader::{LogReader, ReadError};
pub use record::{Message, MessageKind};
pub use resource::{
    FileLogResource, FileTranscriptStore, LogResource, MemoryLogResource, MemoryTranscriptStore,
    SharedResource, TranscriptStore,
};

#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("Failed to open transcript {resource}: {source}")]
    Open { resource: String, source: io::Error },

    #[error("Failed to load transcript {resource}: {source}")]
    Load { resource: String, source: io::Error },

    #[error("Failed to flush transcript {resource}: {source}")]
    Flush { resource: String, source: io::Error },

    #[error("Message index {index} out of range (log has {len} messages)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Answer of a matcher during a tail-to-head scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMatch {
    Match,
    Continue,
    /// Older records are not candidates.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseSearch {
    Found(usize),
    Stopped { at: usize },
    Exhausted,
}

impl ReverseSearch {
    pub fn found(self) -> Option<usize> {
        match self {
            ReverseSearch::Found(index) => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced(usize),
    Appended(usize),
}

/// Drives [`Log::replace_or_append`].
pub trait MessageReplacer {
    fn matches(&self, candidate: &Message) -> ReplaceMatch;
    /// The record that takes the place of a matched one.
    fn replacement(&self, replaced: &Message) -> Message;
    /// The record appended when nothing matched.
    fn new_message(&self) -> Message;
}

pub struct Log {
    owner: ChannelRef,
    resource: SharedResource,
    resource_name: String,
    bus: Arc<EventBus>,
    context: ClassifierContext,
    messages: Vec<Message>,
    byte_length: usize,
    line_count: usize,
    last_chat_message_index: Option<usize>,
    last_read_index: Option<usize>,
    /// `None` until the first successful flush.
    last_saved_index: Option<usize>,
    first_updated_index: Option<usize>,
    notification_level: NotificationLevel,
}

impl Log {
    /// Replays `resource` into a new log. Nothing is fired while replaying.
    pub fn open(
        owner: ChannelRef,
        resource: SharedResource,
        bus: Arc<EventBus>,
        context: ClassifierContext,
    ) -> Result<Self, TranscriptError> {
        let (resource_name, bytes) = {
            let mut guard = resource.lock().unwrap_or_else(PoisonError::into_inner);
            let name = guard.name().to_string();
            let bytes = guard.read_all().map_err(|source| TranscriptError::Load {
                resource: name.clone(),
                source,
            })?;
            (name, bytes)
        };
        let contents = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(e) => {
                let valid = e.valid_up_to();
                warn!(
                    resource = %resource_name,
                    skipped_bytes = bytes.len() - valid,
                    "Transcript contains invalid UTF-8, replaying the valid prefix"
                );
                std::str::from_utf8(&bytes[..valid]).unwrap_or_default()
            }
        };

        let mut log = Self {
            owner,
            resource,
            resource_name,
            bus,
            context,
            messages: Vec::new(),
            byte_length: 0,
            line_count: 0,
            last_chat_message_index: None,
            last_read_index: None,
            last_saved_index: None,
            first_updated_index: None,
            notification_level: NotificationLevel::NoNotification,
        };

        for item in LogReader::new(contents) {
            match item {
                Ok(message) => {
                    log.push(message);
                }
                Err(e) => {
                    warn!(
                        resource = %log.resource_name,
                        error = %e,
                        skipped_bytes = contents.len() - e.offset,
                        "Skipping malformed transcript tail"
                    );
                    break;
                }
            }
        }
        log.last_saved_index = log.messages.len().checked_sub(1);
        log.all_read();
        Ok(log)
    }

    fn push(&mut self, mut message: Message) -> usize {
        let index = self.messages.len();
        message.measure();
        message.place(self.byte_length, self.line_count);
        message.set_notification_level(classify(&message, &self.context));
        self.byte_length += message.record_length();
        self.line_count += message.line_count();
        if message.is_incoming_chat() {
            self.last_chat_message_index = Some(index);
        }
        self.messages.push(message);
        index
    }

    /// Appends to the tail and fires [`EventKind::NewMessage`].
    pub fn append(&mut self, message: Message) -> usize {
        let index = self.push(message);
        self.fire_message(EventKind::NewMessage, index);
        index
    }

    /// Appends without notifying anyone, for bulk imports.
    pub fn append_silently(&mut self, message: Message) -> usize {
        self.push(message)
    }

    pub fn append_system(&mut self, text: impl Into<String>) -> usize {
        self.append(Message::system(text))
    }

    pub fn append_error(&mut self, text: impl Into<String>) -> usize {
        self.append(Message::error(text))
    }

    /// Scans tail to head until `matcher` answers `Match` or `Stop`.
    pub fn rfind<F>(&self, mut matcher: F) -> ReverseSearch
    where
        F: FnMut(&Message) -> ReplaceMatch,
    {
        for (index, message) in self.messages.iter().enumerate().rev() {
            match matcher(message) {
                ReplaceMatch::Match => return ReverseSearch::Found(index),
                ReplaceMatch::Stop => return ReverseSearch::Stopped { at: index },
                ReplaceMatch::Continue => {}
            }
        }
        ReverseSearch::Exhausted
    }

    pub fn replace_or_append<R: MessageReplacer + ?Sized>(&mut self, replacer: &R) -> ReplaceOutcome {
        match self.rfind(|m| replacer.matches(m)) {
            ReverseSearch::Found(index) => {
                let replacement = replacer.replacement(&self.messages[index]);
                self.splice(index, replacement);
                ReplaceOutcome::Replaced(index)
            }
            ReverseSearch::Stopped { .. } | ReverseSearch::Exhausted => {
                ReplaceOutcome::Appended(self.append(replacer.new_message()))
            }
        }
    }

    pub fn replace_message(&mut self, index: usize, replacement: Message) -> Result<(), TranscriptError> {
        if index >= self.messages.len() {
            return Err(TranscriptError::IndexOutOfRange {
                index,
                len: self.messages.len(),
            });
        }
        self.splice(index, replacement);
        Ok(())
    }

    fn splice(&mut self, index: usize, mut replacement: Message) {
        let (mut offset, mut line) = {
            let old = &self.messages[index];
            (old.offset(), old.line_index())
        };
        replacement.measure();
        replacement.set_notification_level(classify(&replacement, &self.context));
        self.messages[index] = replacement;
        for message in &mut self.messages[index..] {
            message.place(offset, line);
            offset += message.record_length();
            line += message.line_count();
        }
        self.byte_length = offset;
        self.line_count = line;
        self.first_updated_index = Some(self.first_updated_index.map_or(index, |f| f.min(index)));
        self.last_chat_message_index = self.messages.iter().rposition(Message::is_incoming_chat);
        self.fire_message(EventKind::MessageReplaced, index);
    }

    /// Writes everything not yet stored. Holds the resource lock for the whole
    /// read-modify-write; on error nothing in memory changes.
    pub fn ensure_all_saved(&mut self) -> Result<(), TranscriptError> {
        let resource = Arc::clone(&self.resource);
        let mut guard = resource.lock().unwrap_or_else(PoisonError::into_inner);

        let size = self.messages.len();
        if self.last_saved_index == size.checked_sub(1) && self.first_updated_index.is_none() {
            return Ok(());
        }

        let mut start_index = self.last_saved_index.map_or(0, |i| i + 1);
        if let (Some(first), Some(saved)) = (self.first_updated_index, self.last_saved_index) {
            if first <= saved {
                start_index = first;
            }
        }
        let mut start_offset = self
            .messages
            .get(start_index)
            .map_or(self.byte_length, Message::offset);

        let current = guard.current_length().map_err(|e| self.flush_error(e))?;
        if current < start_offset {
            warn!(
                resource = %self.resource_name,
                expected = start_offset,
                found = current,
                "Transcript is shorter than its saved records, rewriting"
            );
            start_index = 0;
            start_offset = 0;
        }
        if current > start_offset {
            guard
                .truncate_from(start_offset)
                .map_err(|e| self.flush_error(e))?;
        }

        let mut text = String::with_capacity(self.byte_length - start_offset);
        for message in &self.messages[start_index..] {
            message.write_record(&mut text);
        }
        if !text.is_empty() {
            guard.append_text(&text).map_err(|e| self.flush_error(e))?;
        }
        guard.flush_to_stable().map_err(|e| self.flush_error(e))?;

        debug!(
            resource = %self.resource_name,
            from = start_index,
            bytes = text.len(),
            "Transcript flushed"
        );
        self.last_saved_index = size.checked_sub(1);
        self.first_updated_index = None;
        Ok(())
    }

    fn flush_error(&self, source: io::Error) -> TranscriptError {
        TranscriptError::Flush {
            resource: self.resource_name.clone(),
            source,
        }
    }

    /// The most urgent unread incoming chat message, newest first on ties.
    pub fn hottest_message(&self) -> Option<&Message> {
        let last_chat = self.last_chat_message_index?;
        let unread_from = self.last_read_index.map_or(0, |i| i + 1);
        if last_chat < unread_from {
            return None;
        }
        let mut hottest: Option<&Message> = None;
        for message in self.messages[unread_from..=last_chat].iter().rev() {
            if !message.is_incoming_chat() {
                continue;
            }
            if hottest.map_or(true, |h| message.notification_level() > h.notification_level()) {
                hottest = Some(message);
                if message.notification_level().is_max() {
                    break;
                }
            }
        }
        hottest
    }

    pub fn has_unread(&self) -> bool {
        match (self.last_chat_message_index, self.last_read_index) {
            (Some(chat), Some(read)) => read < chat,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    pub fn all_read(&mut self) {
        self.last_read_index = self.messages.len().checked_sub(1);
        self.set_notification_level(NotificationLevel::NoNotification);
    }

    pub fn mark_read_until(&mut self, index: usize) {
        let Some(last) = self.messages.len().checked_sub(1) else {
            return;
        };
        let index = index.min(last);
        if self.last_read_index.map_or(true, |r| r < index) {
            self.last_read_index = Some(index);
        }
        self.update_notification_level();
    }

    pub fn update_notification_level(&mut self) {
        let level = self
            .hottest_message()
            .map_or(NotificationLevel::NoNotification, Message::notification_level);
        self.set_notification_level(level);
    }

    pub fn set_notification_level(&mut self, level: NotificationLevel) {
        if self.notification_level != level {
            self.notification_level = level;
            self.bus.fire(&ModelEvent::new(
                EventKind::LogStateChanged,
                Subject::Log(self.owner.clone()),
            ));
        }
    }

    /// Applies to messages appended from now on.
    pub fn set_own_nick(&mut self, nick: Option<String>) {
        self.context.own_nick = nick;
    }

    fn fire_message(&self, kind: EventKind, index: usize) {
        self.bus.fire(&ModelEvent::new(
            kind,
            Subject::Message {
                channel: self.owner.clone(),
                index,
                message: self.messages[index].clone(),
            },
        ));
    }

    pub fn owner(&self) -> &ChannelRef {
        &self.owner
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn context(&self) -> &ClassifierContext {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn last_chat_message_index(&self) -> Option<usize> {
        self.last_chat_message_index
    }

    pub fn last_read_index(&self) -> Option<usize> {
        self.last_read_index
    }

    pub fn last_saved_index(&self) -> Option<usize> {
        self.last_saved_index
    }

    pub fn first_updated_index(&self) -> Option<usize> {
        self.first_updated_index
    }

    pub fn notification_level(&self) -> NotificationLevel {
        self.notification_level
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("owner", &self.owner)
            .field("resource", &self.resource_name)
            .field("messages", &self.messages.len())
            .field("last_saved_index", &self.last_saved_index)
            .field("first_updated_index", &self.first_updated_index)
            .field("last_read_index", &self.last_read_index)
            .field("notification_level", &self.notification_level)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::testing::*;
    use super::*;
    use crate::model::event::testing::record_events;

    fn chat(author: &str, text: &str) -> Message {
        Message::chat(Some(author.to_string()), text, false)
    }

    fn assert_contiguous(log: &Log) {
        let mut expected = 0;
        let mut line = 0;
        for message in log.messages() {
            assert_eq!(message.offset(), expected);
            assert_eq!(message.line_index(), line);
            expected += message.record_length();
            line += message.line_count();
        }
        assert_eq!(log.byte_length(), expected);
        assert_eq!(log.line_count(), line);
    }

    /// Edits the newest line of `author`; error lines bound the search.
    struct EditLast {
        author: &'static str,
        text: &'static str,
    }

    impl MessageReplacer for EditLast {
        fn matches(&self, candidate: &Message) -> ReplaceMatch {
            if candidate.author.as_deref() == Some(self.author) {
                ReplaceMatch::Match
            } else if candidate.kind == MessageKind::Error {
                ReplaceMatch::Stop
            } else {
                ReplaceMatch::Continue
            }
        }

        fn replacement(&self, replaced: &Message) -> Message {
            Message::chat(replaced.author.clone(), self.text, replaced.from_me)
                .with_timestamp(replaced.timestamp)
        }

        fn new_message(&self) -> Message {
            chat(self.author, self.text)
        }
    }

    #[test]
    fn test_append_keeps_offsets_contiguous() {
        let (mut log, _) = memory_log();
        log.append(chat("bob", "one"));
        log.append(Message::system("two\nlines"));
        log.append(Message::chat(Some("me".into()), "three", true));
        assert_contiguous(&log);
        assert_eq!(log.last_chat_message_index(), Some(0));
        assert_eq!(log.get(1).unwrap().line_index(), 1);
        assert_eq!(log.get(2).unwrap().line_index(), 3);
    }

    #[test]
    fn test_flush_writes_everything_and_is_idempotent() {
        let (mut log, resource) = memory_log();
        log.append(chat("bob", "a"));
        log.append(chat("carol", "b"));
        log.ensure_all_saved().unwrap();

        let writes = resource.lock().unwrap().write_count();
        assert_eq!(log.last_saved_index(), Some(1));
        assert_eq!(log.first_updated_index(), None);
        assert_eq!(resource.lock().unwrap().contents().len(), log.byte_length());

        log.ensure_all_saved().unwrap();
        assert_eq!(resource.lock().unwrap().write_count(), writes);
    }

    #[test]
    fn test_incremental_flush_appends_only_suffix() {
        let (mut log, resource) = memory_log();
        log.append(chat("bob", "a"));
        log.ensure_all_saved().unwrap();
        let before = resource.lock().unwrap().contents().to_string();

        log.append(chat("bob", "b"));
        log.ensure_all_saved().unwrap();
        let after = resource.lock().unwrap().contents().to_string();
        assert!(after.starts_with(&before));
        assert_eq!(&after[before.len()..], log.get(1).unwrap().encode());
    }

    #[test]
    fn test_first_flush_resets_resource() {
        let resource = Arc::new(Mutex::new(MemoryLogResource::with_contents("junk", "not a record")));
        let shared: SharedResource = resource.clone();
        let mut log = Log::open(owner(), shared, Arc::new(EventBus::new()), ClassifierContext::default()).unwrap();
        assert!(log.is_empty());
        log.append(chat("bob", "fresh"));
        log.ensure_all_saved().unwrap();
        assert_eq!(resource.lock().unwrap().contents(), log.get(0).unwrap().encode());
    }

    #[test]
    fn test_reload_round_trip() {
        let (mut log, resource) = memory_log();
        log.append(chat("bob", "hello"));
        log.append(Message::system("bob joined"));
        log.append(Message::error("oops").with_raw_input("BAD"));
        log.append(Message::chat(Some("me".into()), "multi\nline", true));
        log.ensure_all_saved().unwrap();

        let shared: SharedResource = resource.clone();
        let reloaded = Log::open(owner(), shared, Arc::new(EventBus::new()), ClassifierContext::default()).unwrap();
        assert_eq!(reloaded.len(), 4);
        for (a, b) in log.messages().iter().zip(reloaded.messages()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.author, b.author);
            assert_eq!(a.from_me, b.from_me);
            assert_eq!(a.raw_input, b.raw_input);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.offset(), b.offset());
        }
        assert_eq!(reloaded.last_saved_index(), Some(3));
        assert_eq!(reloaded.last_chat_message_index(), Some(0));
        assert!(!reloaded.has_unread());
    }

    #[test]
    fn test_reload_skips_malformed_tail() {
        let good = chat("bob", "fine");
        let text = format!("{}garbage without newline", good.encode());
        let resource = Arc::new(Mutex::new(MemoryLogResource::with_contents("tail", text)));
        let shared: SharedResource = resource.clone();
        let mut log = Log::open(owner(), shared, Arc::new(EventBus::new()), ClassifierContext::default()).unwrap();
        assert_eq!(log.len(), 1);

        log.append(chat("bob", "next"));
        log.ensure_all_saved().unwrap();
        let expected = format!("{}{}", log.get(0).unwrap().encode(), log.get(1).unwrap().encode());
        assert_eq!(resource.lock().unwrap().contents(), expected);
    }

    #[test]
    fn test_reload_skips_torn_utf8_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("#x.log");
        let good = chat("bob", "fine");
        let mut bytes = good.encode().into_bytes();
        bytes.extend_from_slice(b"2024-01-01T00:00:00.000+00:00 C bob caf\xc3");
        std::fs::write(&path, &bytes).unwrap();

        let shared = resource::share(FileLogResource::open(&path).unwrap());
        let mut log = Log::open(owner(), shared, Arc::new(EventBus::new()), ClassifierContext::default()).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(0).unwrap().text, "fine");

        log.append(chat("bob", "caf\u{e9}"));
        log.ensure_all_saved().unwrap();
        let stored = std::fs::read_to_string(&path).unwrap();
        assert_eq!(stored.len(), log.byte_length());
        assert_eq!(stored, format!("{}{}", log.get(0).unwrap().encode(), log.get(1).unwrap().encode()));
    }

    #[test]
    fn test_conversations_with_similar_nicks_keep_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTranscriptStore::new(dir.path());
        let bus = Arc::new(EventBus::new());
        let mut first = Log::open(owner(), store.open("a", "bob[").unwrap(), Arc::clone(&bus), ClassifierContext::default()).unwrap();
        let mut second = Log::open(owner(), store.open("a", "bob]").unwrap(), bus, ClassifierContext::default()).unwrap();

        first.append(chat("me", "to a"));
        first.ensure_all_saved().unwrap();
        second.append(chat("me", "to b"));
        second.ensure_all_saved().unwrap();

        let stored_first = std::fs::read_to_string(store.path_for("a", "bob[")).unwrap();
        let stored_second = std::fs::read_to_string(store.path_for("a", "bob]")).unwrap();
        assert_eq!(stored_first, first.get(0).unwrap().encode());
        assert_eq!(stored_second, second.get(0).unwrap().encode());
    }

    #[test]
    fn test_fields_edited_after_construction_are_measured() {
        let (mut log, resource) = memory_log();
        let mut edited = chat("bob", "short");
        edited.text = "a much longer text\nthat now spans two lines".into();
        edited.raw_input = Some("typed".into());
        log.append(chat("carol", "before"));
        log.append(edited);
        log.append(chat("carol", "after"));
        assert_contiguous(&log);
        assert_eq!(log.get(1).unwrap().line_count(), 3);

        log.ensure_all_saved().unwrap();
        assert_eq!(resource.lock().unwrap().contents().len(), log.byte_length());

        let mut replacement = chat("bob", "x");
        replacement.author = Some("robert".into());
        log.replace_message(1, replacement).unwrap();
        assert_contiguous(&log);
        log.ensure_all_saved().unwrap();
        let stored = resource.lock().unwrap().contents().to_string();
        assert_eq!(stored.len(), log.byte_length());
        assert_eq!(&stored[log.get(2).unwrap().offset()..], log.get(2).unwrap().encode());
    }

    #[test]
    fn test_replace_last_recomputes_offsets_and_truncates_from_it() {
        let (mut log, resource) = memory_log();
        log.append(chat("a", "first"));
        log.append(chat("b", "second"));
        log.append(chat("c", "third"));
        log.ensure_all_saved().unwrap();
        let prefix: Vec<(usize, usize)> = log.messages()[..2]
            .iter()
            .map(|m| (m.offset(), m.record_length()))
            .collect();
        let c_offset = log.get(2).unwrap().offset();

        log.replace_message(2, chat("c", "third, but much longer than before")).unwrap();
        assert_contiguous(&log);
        let kept: Vec<(usize, usize)> = log.messages()[..2]
            .iter()
            .map(|m| (m.offset(), m.record_length()))
            .collect();
        assert_eq!(prefix, kept);
        assert_eq!(log.get(2).unwrap().offset(), log.get(1).unwrap().end_offset());
        assert_eq!(log.first_updated_index(), Some(2));

        log.ensure_all_saved().unwrap();
        let contents = resource.lock().unwrap().contents().to_string();
        assert_eq!(contents.len(), log.byte_length());
        assert_eq!(&contents[c_offset..], log.get(2).unwrap().encode());
        assert!(contents.ends_with("third, but much longer than before\n"));
    }

    #[test]
    fn test_replace_in_saved_middle_rewrites_tail() {
        let (mut log, resource) = memory_log();
        for text in ["one", "two", "three", "four"] {
            log.append(chat("bob", text));
        }
        log.ensure_all_saved().unwrap();
        log.append(chat("bob", "five"));

        log.replace_message(1, chat("bob", "2")).unwrap();
        log.replace_message(3, chat("bob", "4")).unwrap();
        assert_eq!(log.first_updated_index(), Some(1));

        log.ensure_all_saved().unwrap();
        let expected: String = log.messages().iter().map(Message::encode).collect();
        assert_eq!(resource.lock().unwrap().contents(), expected);
        assert_eq!(log.last_saved_index(), Some(4));
    }

    #[test]
    fn test_replace_or_append_matches_from_tail() {
        let (mut log, _) = memory_log();
        log.append(chat("bob", "old bob"));
        log.append(chat("carol", "hi"));
        log.append(chat("bob", "recent bob"));

        let outcome = log.replace_or_append(&EditLast {
            author: "bob",
            text: "edited",
        });
        assert_eq!(outcome, ReplaceOutcome::Replaced(2));
        assert_eq!(log.get(2).unwrap().text, "edited");
        assert_eq!(log.get(0).unwrap().text, "old bob");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_replace_or_append_stop_appends() {
        let (mut log, _) = memory_log();
        log.append(chat("bob", "out of window"));
        log.append(Message::error("boundary"));
        log.append(chat("carol", "hi"));

        let outcome = log.replace_or_append(&EditLast {
            author: "bob",
            text: "new",
        });
        assert_eq!(outcome, ReplaceOutcome::Appended(3));
        assert_eq!(log.get(0).unwrap().text, "out of window");
        assert_eq!(log.get(3).unwrap().text, "new");
    }

    #[test]
    fn test_rfind_reports_reason() {
        let (mut log, _) = memory_log();
        log.append(chat("a", "x"));
        log.append(chat("b", "y"));
        assert_eq!(log.rfind(|_| ReplaceMatch::Continue), ReverseSearch::Exhausted);
        assert_eq!(log.rfind(|_| ReplaceMatch::Stop), ReverseSearch::Stopped { at: 1 });
        let found = log.rfind(|m| {
            if m.author.as_deref() == Some("a") {
                ReplaceMatch::Match
            } else {
                ReplaceMatch::Continue
            }
        });
        assert_eq!(found.found(), Some(0));
    }

    #[test]
    fn test_replace_message_out_of_range() {
        let (mut log, _) = memory_log();
        let err = log.replace_message(0, chat("a", "x")).unwrap_err();
        assert!(matches!(err, TranscriptError::IndexOutOfRange { index: 0, len: 0 }));
    }

    #[test]
    fn test_hottest_message_prefers_mention_and_stops_early() {
        let (mut log, _) = memory_log();
        log.append(chat("bob", "morning"));
        log.append(chat("bob", "hey me, look"));
        log.append(chat("carol", "noise"));
        log.append(Message::chat(Some("me".into()), "my own line", true));

        let hottest = log.hottest_message().unwrap();
        assert_eq!(hottest.text, "hey me, look");
        assert!(hottest.notification_level().is_max());

        log.update_notification_level();
        assert_eq!(log.notification_level(), NotificationLevel::MeNamed);
    }

    #[test]
    fn test_hottest_message_only_considers_unread() {
        let (mut log, _) = memory_log();
        log.append(chat("bob", "me: old mention"));
        log.all_read();
        assert!(log.hottest_message().is_none());

        log.append(chat("bob", "plain"));
        log.append(Message::system("system line"));
        let hottest = log.hottest_message().unwrap();
        assert_eq!(hottest.text, "plain");
        assert_eq!(hottest.notification_level(), NotificationLevel::UnreadMessages);

        log.mark_read_until(1);
        assert!(log.hottest_message().is_none());
        assert_eq!(log.notification_level(), NotificationLevel::NoNotification);
    }

    #[test]
    fn test_log_state_changed_only_on_transition() {
        let bus = Arc::new(EventBus::new());
        let events = record_events(&bus);
        let (mut log, _) = memory_log_on(bus);

        log.append(chat("bob", "hi"));
        log.update_notification_level();
        log.update_notification_level();
        log.all_read();
        log.all_read();

        let states = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == EventKind::LogStateChanged)
            .count();
        assert_eq!(states, 2);
    }

    #[test]
    fn test_append_fires_and_silent_append_does_not() {
        let bus = Arc::new(EventBus::new());
        let events = record_events(&bus);
        let (mut log, _) = memory_log_on(bus);

        log.append_silently(chat("bob", "quiet"));
        log.append_system("loud");
        log.replace_message(0, chat("bob", "edited")).unwrap();

        let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::NewMessage, EventKind::MessageReplaced]);
    }

    #[test]
    fn test_failed_flush_leaves_state_for_retry() {
        let fail = Arc::new(AtomicBool::new(false));
        let resource = Arc::new(Mutex::new(FailingResource {
            inner: MemoryLogResource::new("flaky"),
            fail: Arc::clone(&fail),
        }));
        let shared: SharedResource = resource.clone();
        let mut log = Log::open(owner(), shared, Arc::new(EventBus::new()), ClassifierContext::default()).unwrap();
        log.append(chat("bob", "a"));
        log.ensure_all_saved().unwrap();
        log.append(chat("bob", "b"));

        fail.store(true, Ordering::SeqCst);
        let err = log.ensure_all_saved().unwrap_err();
        assert!(matches!(err, TranscriptError::Flush { ref resource, .. } if resource == "flaky"));
        assert_eq!(log.last_saved_index(), Some(0));

        fail.store(false, Ordering::SeqCst);
        log.ensure_all_saved().unwrap();
        assert_eq!(log.last_saved_index(), Some(1));
        let expected: String = log.messages().iter().map(Message::encode).collect();
        assert_eq!(resource.lock().unwrap().inner.contents(), expected);
    }
}
