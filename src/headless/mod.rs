//! Headless mode - JSON event output
//!
//! `ohapc` has no UI. Everything the engine reports to its observer is written
//! to stdout as NDJSON (newline-delimited JSON), one event per line, so the
//! client can be scripted and tested end to end.
//!
//! # Example Output
//!
//! ```json
//! {"event":"status","status":"Connected","timestamp":1704700001000}
//! {"event":"item_added","parent":0,"id":1,"timestamp":1704700001020}
//! {"event":"message","message_type":"container","summary":"container id=1 parent=0 name=\"Room 1\"","timestamp":1704700001020}
//! ```

pub mod runner;

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use ohap_app::{ActivityStatus, ConnectionObserver};
use ohap_core::events::TreeEvent;
use ohap_core::item::ItemId;
use ohap_protocol::OhapMessage;

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Connection status changed
    Status {
        status: ActivityStatus,
        timestamp: i64,
    },

    /// Message received from the central unit
    Message {
        message_type: &'static str,
        summary: String,
        timestamp: i64,
    },

    ItemAdded {
        parent: ItemId,
        id: ItemId,
        timestamp: i64,
    },

    ItemRemoved {
        parent: ItemId,
        id: ItemId,
        timestamp: i64,
    },

    ItemChanged { id: ItemId, timestamp: i64 },

    ListeningChanged {
        id: ItemId,
        listening: bool,
        timestamp: i64,
    },

    /// A frame that could not be decoded or applied
    ProtocolError { message: String, timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },

    /// Final state of the item tree, one line per item
    Tree { lines: Vec<String>, timestamp: i64 },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", json) {
            error!("Failed to write headless event to stdout: {}", e);
            return;
        }

        if let Err(e) = stdout.flush() {
            error!("Failed to flush headless stdout: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn status(status: ActivityStatus) -> Self {
        Self::Status {
            status,
            timestamp: Self::now(),
        }
    }

    pub fn message(message: &OhapMessage) -> Self {
        Self::Message {
            message_type: message.name(),
            summary: message.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn tree_event(event: &TreeEvent) -> Self {
        let timestamp = Self::now();
        match *event {
            TreeEvent::ItemAdded { parent, id } => Self::ItemAdded {
                parent,
                id,
                timestamp,
            },
            TreeEvent::ItemRemoved { parent, id } => Self::ItemRemoved {
                parent,
                id,
                timestamp,
            },
            TreeEvent::ItemChanged { id } => Self::ItemChanged { id, timestamp },
            TreeEvent::ListeningChanged { id, listening } => Self::ListeningChanged {
                id,
                listening,
                timestamp,
            },
        }
    }

    pub fn protocol_error(message: &str) -> Self {
        Self::ProtocolError {
            message: message.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }

    pub fn tree(rendered: &str) -> Self {
        Self::Tree {
            lines: rendered.lines().map(str::to_string).collect(),
            timestamp: Self::now(),
        }
    }
}

/// Observer that prints every notification as a [`HeadlessEvent`]
#[derive(Debug, Default)]
pub struct HeadlessObserver;

impl ConnectionObserver for HeadlessObserver {
    fn handle_message_response(&mut self, message: &OhapMessage) {
        HeadlessEvent::message(message).emit();
    }

    fn handle_activity_response(&mut self, status: ActivityStatus) {
        HeadlessEvent::status(status).emit();
    }

    fn handle_tree_event(&mut self, event: &TreeEvent) {
        HeadlessEvent::tree_event(event).emit();
    }

    fn handle_protocol_error(&mut self, error: &str) {
        HeadlessEvent::protocol_error(error).emit();
    }
}
