//! Observer boundary between the engine and the application
//!
//! All callbacks are invoked from the task that owns the [`Engine`](crate::Engine),
//! after the tree has been updated for the message being reported.

use ohap_core::events::TreeEvent;
use ohap_protocol::OhapMessage;
use serde::{Serialize, Serializer};

/// Human-readable connection status reported to the observer
///
/// Serializes as its display string, e.g. `"No connection"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityStatus {
    Connected,
    /// First failed attempt of a connect cycle
    NoConnection,
    /// Every further failed attempt of the same cycle
    Reconnecting,
    /// An established connection was lost
    ConnectionClosed,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Connected => "Connected",
            ActivityStatus::NoConnection => "No connection",
            ActivityStatus::Reconnecting => "Reconnecting",
            ActivityStatus::ConnectionClosed => "Connection closed",
        }
    }

    /// Status for the `attempt`-th consecutive connect failure
    pub fn for_failed_attempt(attempt: u32) -> Self {
        if attempt <= 1 {
            ActivityStatus::NoConnection
        } else {
            ActivityStatus::Reconnecting
        }
    }
}

impl Serialize for ActivityStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives everything the engine wants the application to know about
pub trait ConnectionObserver: Send {
    /// Every message received from the server, after it was applied to the tree
    fn handle_message_response(&mut self, message: &OhapMessage);

    /// Connection status changes
    fn handle_activity_response(&mut self, status: ActivityStatus);

    /// Items added to or removed from the tree, and value changes
    fn handle_tree_event(&mut self, _event: &TreeEvent) {}

    /// Frames that could not be decoded or applied
    fn handle_protocol_error(&mut self, _error: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NullObserver;

impl ConnectionObserver for NullObserver {
    fn handle_message_response(&mut self, _message: &OhapMessage) {}

    fn handle_activity_response(&mut self, _status: ActivityStatus) {}
}
