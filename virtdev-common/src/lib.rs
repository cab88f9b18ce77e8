//! Shared pieces of the virtual device bridge.
//!
//! - [`value`]: property values as they travel on the object bus
//! - [`store`]: the INI device store written by the configuration wizard
//! - [`keyexpr`]: key layout of a device service
//! - [`config`] and [`session`]: object bus and logging settings

pub mod config;
pub mod error;
pub mod keyexpr;
pub mod session;
pub mod store;
pub mod value;

pub use config::{LogFormat, LoggingConfig, ZenohConfig, ZenohMode, normalize_level};
pub use error::{Error, Result};
pub use keyexpr::{KEY_PREFIX, ServiceKeys, all_alive_wildcard, service_name};
pub use session::connect;
pub use store::{ConfigStore, StoreError, StoreSection};
pub use value::BusValue;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    installed.map_err(|e| Error::Tracing(e.to_string()))
}
