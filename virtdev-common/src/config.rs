//! Runtime settings shared by every bridge process: how to reach the object
//! bus and how to log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of the process in the Zenoh network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZenohMode {
    Client,
    /// Local peer; the object bus of a single host.
    #[default]
    Peer,
    Router,
}

impl ZenohMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ZenohMode::Client => "client",
            ZenohMode::Peer => "peer",
            ZenohMode::Router => "router",
        }
    }
}

impl fmt::Display for ZenohMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object bus (Zenoh) connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    #[serde(default)]
    pub mode: ZenohMode,

    /// Endpoints to connect to, e.g. `tcp/127.0.0.1:7447`.
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on.
    #[serde(default)]
    pub listen: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level name; tracing names and store-style names (`WARNING`) both work.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Replace the level, keeping the output format.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Filter directive for the configured level.
    ///
    /// Unknown names are passed through so `EnvFilter` syntax such as
    /// `zenoh=warn,info` keeps working.
    pub fn filter_directive(&self) -> &str {
        normalize_level(&self.level).unwrap_or(self.level.as_str())
    }
}

/// Translate a store-style level name (`DEBUG`, `WARNING`, `CRITICAL`...) to
/// a tracing level.
///
/// Returns `None` for unknown names so callers can fall back to their default.
pub fn normalize_level(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default)]
        zenoh: ZenohConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_parse_zenoh_and_logging() {
        let sample: Sample = json5::from_str(
            r#"{
                zenoh: { mode: "client", connect: ["tcp/localhost:7447"] },
                logging: { level: "WARNING", format: "json" },
            }"#,
        )
        .unwrap();

        assert_eq!(sample.zenoh.mode, ZenohMode::Client);
        assert_eq!(sample.zenoh.connect, vec!["tcp/localhost:7447"]);
        assert_eq!(sample.logging.format, LogFormat::Json);
        assert_eq!(sample.logging.filter_directive(), "warn");
    }

    #[test]
    fn test_defaults() {
        let sample: Sample = json5::from_str("{}").unwrap();
        assert_eq!(sample.zenoh.mode, ZenohMode::Peer);
        assert!(sample.zenoh.listen.is_empty());
        assert_eq!(sample.logging, LoggingConfig::default());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let result: Result<Sample, _> = json5::from_str(r#"{ zenoh: { mode: "broker" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_store_levels() {
        assert_eq!(normalize_level("DEBUG"), Some("debug"));
        assert_eq!(normalize_level("Warning"), Some("warn"));
        assert_eq!(normalize_level("CRITICAL"), Some("error"));
        assert_eq!(normalize_level(" info "), Some("info"));
        assert_eq!(normalize_level("verbose"), None);
    }

    #[test]
    fn test_filter_directive_passes_through_env_filter_syntax() {
        let logging = LoggingConfig::default().with_level("zenoh=warn,debug");
        assert_eq!(logging.filter_directive(), "zenoh=warn,debug");
    }
}
