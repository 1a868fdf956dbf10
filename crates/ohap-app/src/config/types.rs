//! Configuration types for the OHAP client
//!
//! Defines:
//! - `Settings` - Global application settings
//! - One sub-struct per TOML section

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ohap_protocol::ClientConfig;

/// Central unit URL used when nothing is configured
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:18000/";

/// Global settings from config.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub login: LoginSettings,

    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub behavior: BehaviorSettings,
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Central unit URL, `scheme://host:port/`
    #[serde(default = "default_url")]
    pub url: String,

    /// Listen to the root container (and so connect) when the engine starts
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            auto_connect: true,
        }
    }
}

/// `[login]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoginSettings {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// `[connection]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub retry_delay_ms: u64,

    /// Seconds between keep-alive pings; 0 disables them
    #[serde(default)]
    pub ping_interval_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_timeout_ms(),
            ping_interval_secs: 0,
        }
    }
}

impl ConnectionSettings {
    /// Timeouts for the connection engine
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.connect_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

/// `[behavior]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BehaviorSettings {
    /// Start listening to every container as soon as it is announced
    #[serde(default)]
    pub listen_all: bool,
}

fn default_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.url, DEFAULT_SERVER_URL);
        assert!(settings.server.auto_connect);
        assert_eq!(settings.connection.connect_timeout_ms, 5000);
        assert_eq!(settings.connection.ping_interval(), None);
        assert!(!settings.behavior.listen_all);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[connection]
retry_delay_ms = 250
ping_interval_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(settings.connection.retry_delay_ms, 250);
        assert_eq!(settings.connection.read_timeout_ms, 5000);
        assert_eq!(
            settings.connection.ping_interval(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(settings.server.url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn test_client_config_from_settings() {
        let connection = ConnectionSettings {
            connect_timeout_ms: 100,
            read_timeout_ms: 200,
            retry_delay_ms: 300,
            ping_interval_secs: 0,
        };
        let config = connection.client_config();
        assert_eq!(config.connect_timeout, Duration::from_millis(100));
        assert_eq!(config.read_timeout, Duration::from_millis(200));
        assert_eq!(config.retry_delay, Duration::from_millis(300));
    }
}
