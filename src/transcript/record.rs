//! One transcript line and its serialized form.
//!
//! A record is a header line
//! `{timestamp} {tag} {author|-} {first text line}` followed by
//! `"  "`-prefixed continuation lines of the text and `" >"`-prefixed lines of
//! the raw input echo, each terminated by `\n`.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};

use crate::notify::NotificationLevel;

pub(crate) const TEXT_CONTINUATION: &str = "  ";
pub(crate) const RAW_INPUT_PREFIX: &str = " >";
pub(crate) const NO_AUTHOR: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Chat,
    System,
    Error,
}

impl MessageKind {
    pub(crate) fn tag(self, from_me: bool) -> char {
        match (self, from_me) {
            (MessageKind::Chat, false) => 'C',
            (MessageKind::Chat, true) => 'M',
            (MessageKind::System, _) => 'S',
            (MessageKind::Error, _) => 'E',
        }
    }

    pub(crate) fn from_tag(tag: &str) -> Option<(MessageKind, bool)> {
        match tag {
            "C" => Some((MessageKind::Chat, false)),
            "M" => Some((MessageKind::Chat, true)),
            "S" => Some((MessageKind::System, false)),
            "E" => Some((MessageKind::Error, false)),
            _ => None,
        }
    }
}

/// A transcript entry. Position fields are assigned by the owning log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub timestamp: DateTime<FixedOffset>,
    pub author: Option<String>,
    pub text: String,
    pub kind: MessageKind,
    pub from_me: bool,
    pub raw_input: Option<String>,
    pub(crate) level: NotificationLevel,
    pub(crate) offset: usize,
    pub(crate) record_length: usize,
    pub(crate) line_index: usize,
    pub(crate) line_count: usize,
}

impl Message {
    fn new(kind: MessageKind, author: Option<String>, text: impl Into<String>, from_me: bool) -> Self {
        let mut message = Self {
            timestamp: now(),
            author: author.filter(|a| !a.is_empty()),
            text: text.into(),
            kind,
            from_me,
            raw_input: None,
            level: NotificationLevel::NoNotification,
            offset: 0,
            record_length: 0,
            line_index: 0,
            line_count: 0,
        };
        message.measure();
        message
    }

    pub fn chat(author: Option<String>, text: impl Into<String>, from_me: bool) -> Self {
        Self::new(MessageKind::Chat, author, text, from_me)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageKind::System, None, text, false)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, None, text, false)
    }

    /// Timestamps are kept at millisecond precision so that a record reads
    /// back exactly as it was written.
    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = truncate_to_millis(timestamp);
        self.measure();
        self
    }

    pub fn with_raw_input(mut self, raw_input: impl Into<String>) -> Self {
        let raw = raw_input.into();
        self.raw_input = if raw.is_empty() { None } else { Some(raw) };
        self.measure();
        self
    }

    pub fn is_incoming_chat(&self) -> bool {
        self.kind == MessageKind::Chat && !self.from_me
    }

    pub fn notification_level(&self) -> NotificationLevel {
        self.level
    }

    pub(crate) fn set_notification_level(&mut self, level: NotificationLevel) {
        self.level = level;
    }

    /// Byte offset of this record in the backing resource.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn record_length(&self) -> usize {
        self.record_length
    }

    pub fn end_offset(&self) -> usize {
        self.offset + self.record_length
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub(crate) fn place(&mut self, offset: usize, line_index: usize) {
        self.offset = offset;
        self.line_index = line_index;
    }

    /// Recomputes the cached record length and line count from the fields.
    pub(crate) fn measure(&mut self) {
        let encoded = self.encode();
        self.record_length = encoded.len();
        self.line_count = encoded.matches('\n').count();
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.write_record(&mut out);
        out
    }

    pub(crate) fn write_record(&self, out: &mut String) {
        let mut lines = split_lines(&self.text);
        let first = lines.next().unwrap_or("");
        out.push_str(&self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false));
        out.push(' ');
        out.push(self.kind.tag(self.from_me));
        out.push(' ');
        out.push_str(self.author.as_deref().map(sanitize_author).as_deref().unwrap_or(NO_AUTHOR));
        out.push(' ');
        out.push_str(first);
        out.push('\n');
        for line in lines {
            out.push_str(TEXT_CONTINUATION);
            out.push_str(line);
            out.push('\n');
        }
        if let Some(raw) = &self.raw_input {
            for line in split_lines(raw) {
                out.push_str(RAW_INPUT_PREFIX);
                out.push_str(line);
                out.push('\n');
            }
        }
    }
}

fn now() -> DateTime<FixedOffset> {
    truncate_to_millis(Local::now().fixed_offset())
}

fn truncate_to_millis(ts: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let nanos = ts.timestamp_subsec_nanos();
    ts - chrono::Duration::nanoseconds(i64::from(nanos % 1_000_000))
}

/// Splits on `\n`, dropping a trailing `\r` so records stay line-oriented.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Authors are single header tokens.
fn sanitize_author(author: &str) -> String {
    author
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
