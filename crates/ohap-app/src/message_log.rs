//! Bounded log of OHAP messages sent and received

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::Serialize;

use ohap_protocol::OhapMessage;

/// Entries kept by [`MessageLog::default`]
pub const DEFAULT_MESSAGE_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Sent => write!(f, "→"),
            Direction::Received => write!(f, "←"),
        }
    }
}

/// One logged message
#[derive(Debug, Clone, Serialize)]
pub struct LoggedMessage {
    /// Increases by one per logged message, never reused
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub message_type: &'static str,
    pub summary: String,
}

impl std::fmt::Display for LoggedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} #{} {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.sequence,
            self.direction,
            self.summary
        )
    }
}

/// Ring of the most recent messages, oldest evicted first
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<LoggedMessage>,
    capacity: usize,
    next_sequence: u64,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LOG_CAPACITY)
    }
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MESSAGE_LOG_CAPACITY)),
            capacity: capacity.max(1),
            next_sequence: 1,
        }
    }

    pub fn record(&mut self, direction: Direction, message: &OhapMessage) -> &LoggedMessage {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LoggedMessage {
            sequence: self.next_sequence,
            timestamp: Local::now(),
            direction,
            message_type: message.name(),
            summary: message.to_string(),
        });
        self.next_sequence += 1;
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entry at `index`, 0 being the oldest still kept
    pub fn get(&self, index: usize) -> Option<&LoggedMessage> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&LoggedMessage> {
        self.entries.back()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &LoggedMessage> {
        self.entries.iter()
    }

    pub fn count(&self, direction: Direction) -> usize {
        self.entries
            .iter()
            .filter(|e| e.direction == direction)
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
