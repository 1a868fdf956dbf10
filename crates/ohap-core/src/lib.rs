//! # ohap-core - Core Domain Types
//!
//! Foundation crate for the OHAP client. Provides the central unit item tree,
//! error handling, tree change events and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tracing, url, dirs).
//!
//! ## Public API
//!
//! ### Item Tree (`tree`, `item`)
//! - [`CentralUnit`] - Root container owning the `id → Item` index
//! - [`Item`] - A tree node: a [`Container`] or a [`Device`]
//! - [`DeviceType`], [`ValueType`] - Sensor/actuator and binary/decimal
//! - [`ServerAddress`], [`Credentials`] - Connection parameters of a central unit
//!
//! ### Events (`events`)
//! - [`TreeEvent`] - Structural and value changes queued by the tree
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use ohap_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod item;
pub mod logging;
pub mod prelude;
pub mod tree;

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::TreeEvent;
pub use item::{
    Container, DecimalValue, Device, DeviceType, DeviceValue, Item, ItemId, ItemKind, ValueType,
    ROOT_ID,
};
pub use tree::{CentralUnit, Credentials, ServerAddress, DEFAULT_CENTRAL_UNIT_NAME};
