//! ohap-app - Central-unit orchestration for the OHAP client
//!
//! This crate owns the dispatch context: the [`Engine`] that applies server
//! messages to the item tree, the reference-counted listening coordinator,
//! the observer boundary, the message log, engine commands and configuration
//! loading.

pub mod command;
pub mod config;
pub mod engine;
pub mod handler;
pub mod listening;
pub mod message_log;
pub mod observer;

// Re-export primary types
pub use command::EngineCommand;
pub use config::Settings;
pub use engine::Engine;
pub use handler::{dispatch, DispatchResult};
pub use listening::{ConnectionAction, ListeningCoordinator};
pub use message_log::{Direction, LoggedMessage, MessageLog};
pub use observer::{ActivityStatus, ConnectionObserver, NullObserver};
