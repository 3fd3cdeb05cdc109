//! Forward replay of a serialized transcript.

use chrono::DateTime;
use std::fmt;

use super::record::{Message, MessageKind, NO_AUTHOR, RAW_INPUT_PREFIX, TEXT_CONTINUATION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    pub offset: usize,
    pub reason: String,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed record at byte {}: {}", self.offset, self.reason)
    }
}

impl std::error::Error for ReadError {}

/// Yields records in order. Stops for good after the first malformed one.
pub struct LogReader<'a> {
    input: &'a str,
    position: usize,
    failed: bool,
}

impl<'a> LogReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            position: 0,
            failed: false,
        }
    }

    /// Byte offset just past the last record returned so far.
    pub fn position(&self) -> usize {
        self.position
    }

    fn peek_line(&self, at: usize) -> Option<Result<&'a str, ReadError>> {
        if at >= self.input.len() {
            return None;
        }
        let rest = &self.input[at..];
        Some(match rest.find('\n') {
            Some(end) => Ok(&rest[..end]),
            None => Err(ReadError {
                offset: at,
                reason: "record is not terminated by a newline".to_string(),
            }),
        })
    }

    fn read_record(&mut self) -> Option<Result<Message, ReadError>> {
        let start = self.position;
        let header = match self.peek_line(start)? {
            Ok(line) => line,
            Err(e) => return Some(Err(e)),
        };
        let mut cursor = start + header.len() + 1;

        let mut fields = header.splitn(4, ' ');
        let (Some(ts), Some(tag), Some(author), Some(first)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Some(Err(self.error(start, "incomplete header")));
        };
        let timestamp = match DateTime::parse_from_rfc3339(ts) {
            Ok(t) => t,
            Err(e) => return Some(Err(self.error(start, format!("bad timestamp {ts:?}: {e}")))),
        };
        let Some((kind, from_me)) = MessageKind::from_tag(tag) else {
            return Some(Err(self.error(start, format!("unknown record tag {tag:?}"))));
        };

        let mut text = first.to_string();
        let mut raw_lines: Vec<&str> = Vec::new();
        while let Some(Ok(line)) = self.peek_line(cursor) {
            if let Some(cont) = line.strip_prefix(TEXT_CONTINUATION) {
                if !raw_lines.is_empty() {
                    break;
                }
                text.push('\n');
                text.push_str(cont);
            } else if let Some(raw) = line.strip_prefix(RAW_INPUT_PREFIX) {
                raw_lines.push(raw);
            } else {
                break;
            }
            cursor += line.len() + 1;
        }

        let author = (author != NO_AUTHOR).then(|| author.to_string());
        let mut message = match kind {
            MessageKind::Chat => Message::chat(author, text, from_me),
            MessageKind::System => Message::system(text),
            MessageKind::Error => Message::error(text),
        }
        .with_timestamp(timestamp);
        if !raw_lines.is_empty() {
            message = message.with_raw_input(raw_lines.join("\n"));
        }

        let consumed = &self.input[start..cursor];
        if message.encode() != consumed {
            return Some(Err(self.error(start, "record is not in canonical form")));
        }
        self.position = cursor;
        Some(Ok(message))
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> ReadError {
        ReadError {
            offset,
            reason: reason.into(),
        }
    }
}

impl Iterator for LogReader<'_> {
    type Item = Result<Message, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_record();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
