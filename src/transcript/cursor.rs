//! Two-way cursor over a growing log.
//!
//! The cursor sits between records, like a text caret: position `0` is before
//! the first record and `log.len()` after the last. It holds no borrow, so the
//! log can keep growing; records appended later are reached by stepping
//! forward.

use super::{Log, Message};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogCursor {
    position: usize,
}

impl LogCursor {
    pub fn at_start() -> Self {
        Self { position: 0 }
    }

    pub fn at_end(log: &Log) -> Self {
        Self { position: log.len() }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves to `position`, clamped to the log bounds.
    pub fn seek(&mut self, log: &Log, position: usize) {
        self.position = position.min(log.len());
    }

    pub fn has_next(&self, log: &Log) -> bool {
        self.position < log.len()
    }

    pub fn has_previous(&self) -> bool {
        self.position > 0
    }

    pub fn next_index(&self) -> usize {
        self.position
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.position.checked_sub(1)
    }

    pub fn forward<'a>(&mut self, log: &'a Log) -> Option<&'a Message> {
        let message = log.get(self.position)?;
        self.position += 1;
        Some(message)
    }

    pub fn backward<'a>(&mut self, log: &'a Log) -> Option<&'a Message> {
        let index = self.previous_index()?;
        let message = log.get(index)?;
        self.position = index;
        Some(message)
    }
}
