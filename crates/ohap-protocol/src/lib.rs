//! # ohap-protocol - OHAP Wire Protocol and Connection Engine
//!
//! Encodes and decodes the binary OHAP messages and keeps one TCP connection
//! to a central unit alive.
//!
//! Depends on [`ohap_core`] for the item tree and error handling.
//!
//! ## Public API
//!
//! ### Messages
//! - [`OhapMessage`] - One variant per wire message (tags `0x00`..=`0x0d`)
//! - [`MessageType`] - Tag and protocol name of a message
//!
//! ### Codec
//! - [`encode()`] / [`encode_to_bytes()`] - Append a frame to a buffer
//! - [`decode()`] - Incrementally decode the next frame from a buffer
//!
//! ### Connection Engine
//! - [`OhapClient`] - Background connection task with login and reconnect
//! - [`ConnectionEvent`] - Events posted to the dispatch context
//! - [`ClientConfig`] - Connect/read/write timeouts and retry delay

pub mod client;
pub mod codec;
pub mod message;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use client::{
    event_channel, ClientConfig, ConnectionEvent, ConnectionState, Epoch, OhapClient,
    DEFAULT_TIMEOUT,
};
pub use codec::{decode, decode_all, encode, encode_to_bytes, MAX_TEXT_LEN};
pub use message::{
    BinaryDeviceInfo, ContainerInfo, DecimalDeviceInfo, MessageType, OhapMessage,
    PROTOCOL_MINOR_VERSION,
};
