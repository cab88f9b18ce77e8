//! Runtime settings for the MQTT bridge.
//!
//! Device data lives in the INI store; this file only tunes the process:
//! where the bus is, where the store is, and how instances are supervised.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use virtdev_bridge_framework::{
    BridgeConfig, BridgeError, DEFAULT_STORE_PATH, LoggingConfig, TransportSettings, ZenohConfig,
};
use virtdev_common::KEY_PREFIX;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Object-bus key prefix
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Device store location
    #[serde(default)]
    pub store: StoreSettings,

    /// Broker connection tunables
    #[serde(default)]
    pub transport: TransportSettings,

    /// Instance restart policy
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

impl Default for MqttBridgeConfig {
    fn default() -> Self {
        Self {
            zenoh: ZenohConfig::default(),
            logging: LoggingConfig::default(),
            key_prefix: default_key_prefix(),
            store: StoreSettings::default(),
            transport: TransportSettings::default(),
            supervisor: SupervisorSettings::default(),
        }
    }
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

/// Where the device store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}

/// Restart policy applied to failed instances.
///
/// Configuration errors are never restarted. `max_restarts = 0` leaves a
/// failed instance down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Delay before the first restart; doubles on each further restart.
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_secs: u64,

    /// Upper bound for the restart delay.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            restart_backoff_secs: default_restart_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    300
}

impl BridgeConfig for MqttBridgeConfig {
    fn zenoh(&self) -> &ZenohConfig {
        &self.zenoh
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    fn validate(&self) -> virtdev_bridge_framework::Result<()> {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            return Err(BridgeError::validation("key_prefix cannot be empty"));
        }
        if prefix.contains(['*', '$', '?', '#', '@']) {
            return Err(BridgeError::validation(format!(
                "key_prefix '{}' contains wildcard or reserved characters",
                self.key_prefix
            )));
        }
        if self.transport.channel_capacity == 0 {
            return Err(BridgeError::validation(
                "transport.channel_capacity must be at least 1",
            ));
        }
        if self.supervisor.max_backoff_secs < self.supervisor.restart_backoff_secs {
            return Err(BridgeError::validation(
                "supervisor.max_backoff_secs is smaller than restart_backoff_secs",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MqttBridgeConfig::load_or_default(None).unwrap();
        assert_eq!(config.key_prefix, "venus");
        assert_eq!(config.store.path, PathBuf::from(DEFAULT_STORE_PATH));
        assert_eq!(config.transport.max_retries, 12);
        assert_eq!(config.supervisor.max_restarts, 5);
        assert_eq!(config.supervisor.max_backoff_secs, 300);
    }

    #[test]
    fn test_parse_partial_config() {
        let json5 = r#"
        {
            zenoh: { mode: "client", connect: ["tcp/127.0.0.1:7447"] },
            logging: { level: "debug" },
            store: { path: "/tmp/optionsSet" },
            supervisor: { max_restarts: 0 },
        }
        "#;

        let config: MqttBridgeConfig = json5::from_str(json5).unwrap();
        assert_eq!(config.zenoh.mode, virtdev_common::ZenohMode::Client);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.store.path, PathBuf::from("/tmp/optionsSet"));
        assert_eq!(config.supervisor.max_restarts, 0);
        assert_eq!(config.supervisor.restart_backoff_secs, 5);
        assert_eq!(config.key_prefix, "venus");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_wildcard_prefix() {
        let config = MqttBridgeConfig {
            key_prefix: "venus/**".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BridgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json5");
        std::fs::write(&path, "{ key_prefix: 'boat' }").unwrap();

        let config = MqttBridgeConfig::load(&path).unwrap();
        assert_eq!(config.key_prefix, "boat");

        let missing = MqttBridgeConfig::load(dir.path().join("nope.json5"));
        assert!(matches!(missing, Err(BridgeError::ConfigNotFound { .. })));
    }
}
