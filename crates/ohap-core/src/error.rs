//! Application error types with rich context

use thiserror::Error;

use crate::item::ItemId;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────
    #[error("OHAP protocol error: {message}")]
    Protocol { message: String },

    #[error("Unsupported OHAP message type: 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("Text field too long for the wire: {len} bytes")]
    TextTooLong { len: usize },

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Timed out after {millis} ms while {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Not connected to the central unit")]
    NotConnected,

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid central unit URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Item Tree Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Item id {id} is already present in the tree")]
    DuplicateId { id: ItemId },

    #[error("No item with id {id}")]
    ItemNotFound { id: ItemId },

    #[error("Item {id} is not a container")]
    NotAContainer { id: ItemId },

    #[error("Item {id} is not a device")]
    NotADevice { id: ItemId },

    #[error("Index {index} out of range for container {container} with {len} items")]
    IndexOutOfRange {
        container: ItemId,
        index: usize,
        len: usize,
    },

    #[error("Device {id} does not carry a {expected} value")]
    WrongValueType { id: ItemId, expected: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Channel/Communication Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Network-side failures are retried or reported to the observer; the
    /// connection keeps running.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Protocol { .. }
                | Error::UnknownMessageType(_)
                | Error::Connection { .. }
                | Error::Timeout { .. }
                | Error::NotConnected
        )
    }

    /// Check if this error should stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::InvalidUrl { .. })
    }

    /// Local usage errors against the item tree. These never come from the
    /// network and are reported to the caller instead of the observer.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateId { .. }
                | Error::ItemNotFound { .. }
                | Error::NotAContainer { .. }
                | Error::NotADevice { .. }
                | Error::IndexOutOfRange { .. }
                | Error::WrongValueType { .. }
                | Error::TextTooLong { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
