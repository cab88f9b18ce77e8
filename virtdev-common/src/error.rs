use thiserror::Error;

/// Errors from bus session and logging setup.
///
/// Store operations report [`crate::StoreError`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A Zenoh setting could not be applied.
    #[error("invalid Zenoh {field}: {message}")]
    ZenohSetting { field: String, message: String },

    #[error("object bus error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A global subscriber was already installed.
    #[error("logging setup failed: {0}")]
    Tracing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
