//! Error types for the bridge framework.

use thiserror::Error;

use virtdev_common::StoreError;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the bridge runtime.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Settings file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Failed to read settings file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    ConfigParse(#[from] json5::Error),

    #[error("Invalid settings: {0}")]
    ConfigValidation(String),

    /// Logging or object bus session could not be set up.
    #[error(transparent)]
    Setup(#[from] virtdev_common::Error),

    #[error("Failed to encode bus value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    #[error("Failed to subscribe to {key}: {message}")]
    Subscribe { key: String, message: String },

    #[error("Failed to declare liveliness token {key}: {message}")]
    Liveliness { key: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store writer task is gone.
    #[error("Store writer stopped")]
    StoreWriterStopped,
}

impl BridgeError {
    /// Create a settings validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}
