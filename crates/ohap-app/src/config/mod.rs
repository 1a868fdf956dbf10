//! Configuration file parsing for the OHAP client
//!
//! Supports:
//! - `<config dir>/ohap-client/config.toml` - Global settings
//! - An explicit file path passed on the command line

pub mod settings;
pub mod types;

pub use settings::{
    default_config_dir, init_config_file, load_settings, load_settings_file, save_settings,
    CONFIG_FILENAME,
};
pub use types::*;
