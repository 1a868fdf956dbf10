//! Settings loading and saving
//!
//! Settings live in `config.toml` inside the client's config directory
//! (`~/.config/ohap-client/` on Linux).

use std::path::{Path, PathBuf};

use ohap_core::prelude::*;

use super::types::Settings;

pub const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "ohap-client";

/// Per-user config directory, `None` if the platform has none
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings Loading
// ─────────────────────────────────────────────────────────────────────────────

/// Load settings from `<config_dir>/config.toml`
///
/// Returns default settings if file doesn't exist or can't be parsed.
pub fn load_settings(config_dir: &Path) -> Settings {
    load_settings_file(&config_dir.join(CONFIG_FILENAME))
}

/// Load settings from an explicit file path, with the same fallbacks as
/// [`load_settings`].
pub fn load_settings_file(config_path: &Path) -> Settings {
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create a commented default config.toml if none exists
pub fn init_config_file(config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)
        .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;

    let config_path = config_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(())
}

/// Save settings to `<config_dir>/config.toml`
///
/// Uses atomic write (temp file + rename).
pub fn save_settings(config_dir: &Path, settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir)
        .map_err(|e| Error::config(format!("Failed to create config dir: {}", e)))?;

    let config_path = config_dir.join(CONFIG_FILENAME);
    let temp_path = config_dir.join(".config.toml.tmp");

    let content = toml::to_string_pretty(settings)
        .map_err(|e| Error::config(format!("Failed to serialize settings: {}", e)))?;
    let full_content = format!("{}{}", CONFIG_HEADER, content);

    std::fs::write(&temp_path, &full_content)
        .map_err(|e| Error::config(format!("Failed to write temp file: {}", e)))?;
    std::fs::rename(&temp_path, &config_path)
        .map_err(|e| Error::config(format!("Failed to rename temp file: {}", e)))?;

    info!("Saved settings to {:?}", config_path);
    Ok(())
}

const CONFIG_HEADER: &str = "# OHAP Client Configuration\n# Written by ohapc\n\n";

const DEFAULT_CONFIG: &str = r#"# OHAP Client Configuration

[server]
url = "http://127.0.0.1:18000/"   # scheme://host:port/ of the central unit
auto_connect = true               # listen to the root container on start

[login]
username = ""
password = ""

[connection]
connect_timeout_ms = 5000
read_timeout_ms = 5000            # a quiet read is not an error, just a poll tick
retry_delay_ms = 5000
ping_interval_secs = 0            # 0 = no keep-alive pings

[behavior]
listen_all = false                # listen to every container once announced
"#;
