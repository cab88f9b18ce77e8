//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use virtdev_common::normalize_level;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, ZenohConfig};

/// Trait for bridge runtime settings.
///
/// Implement this trait for the bridge's settings struct to get loading,
/// validation, and access to common fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use virtdev_bridge_framework::{BridgeConfig, LoggingConfig, ZenohConfig};
///
/// #[derive(Debug, Default, Deserialize)]
/// pub struct MySettings {
///     #[serde(default)]
///     pub zenoh: ZenohConfig,
///     #[serde(default)]
///     pub logging: LoggingConfig,
///     pub key_prefix: String,
/// }
///
/// impl BridgeConfig for MySettings {
///     fn zenoh(&self) -> &ZenohConfig {
///         &self.zenoh
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn key_prefix(&self) -> &str {
///         &self.key_prefix
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned + Default {
    /// Get the Zenoh configuration.
    fn zenoh(&self) -> &ZenohConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Get the object-bus key prefix.
    fn key_prefix(&self) -> &str;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults.
    fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }
}

/// MQTT transport tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Pause between connection attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Failed attempts tolerated before the instance gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// MQTT keep-alive interval.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Capacity of the inbound message channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_retry_interval() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    12
}

fn default_keep_alive() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            max_retries: default_max_retries(),
            keep_alive_secs: default_keep_alive(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Pick the effective log level.
///
/// `RUST_LOG` is honoured later by `init_tracing`; here the CLI flag wins over
/// the store's `[Global] LogLevel`, which wins over the runtime settings.
pub fn resolve_logging(
    base: &LoggingConfig,
    cli_level: Option<&str>,
    store_level: Option<&str>,
) -> LoggingConfig {
    let level = cli_level
        .and_then(normalize_level)
        .or_else(|| store_level.and_then(normalize_level));

    match level {
        Some(level) => base.clone().with_level(level),
        None => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
        #[serde(default)]
        key_prefix: String,
        #[serde(default)]
        transport: TransportSettings,
    }

    impl BridgeConfig for TestConfig {
        fn zenoh(&self) -> &ZenohConfig {
            &self.zenoh
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }

        fn key_prefix(&self) -> &str {
            &self.key_prefix
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = TestConfig::load_or_default(None).unwrap();
        assert_eq!(config.zenoh.mode, virtdev_common::ZenohMode::Peer);
        assert_eq!(config.transport, TransportSettings::default());
    }

    #[test]
    fn test_load_partial_transport() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json5");
        std::fs::write(
            &path,
            "{ key_prefix: 'boat', transport: { max_retries: 3 } }",
        )
        .unwrap();

        let config = TestConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.key_prefix, "boat");
        assert_eq!(config.transport.max_retries, 3);
        assert_eq!(config.transport.retry_interval_secs, 5);
        assert_eq!(config.transport.channel_capacity, 64);
    }

    #[test]
    fn test_log_level_precedence() {
        let base = LoggingConfig::default();

        assert_eq!(resolve_logging(&base, None, None).level, "info");
        assert_eq!(resolve_logging(&base, None, Some("WARNING")).level, "warn");
        assert_eq!(
            resolve_logging(&base, Some("debug"), Some("ERROR")).level,
            "debug"
        );
        assert_eq!(
            resolve_logging(&base, Some("bogus"), Some("CRITICAL")).level,
            "error"
        );
    }
}
