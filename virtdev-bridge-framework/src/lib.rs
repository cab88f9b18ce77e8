//! Virtual device bridge framework
//!
//! Runtime plumbing shared by the bridge engine.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for runtime settings loading and validation
//! - [`BridgeRunner`] for managing the process lifecycle (Zenoh session, signal handling)
//! - [`MqttTransport`] for the per-instance broker connection
//! - [`BusPublisher`], [`subscribe_writes`] and [`AliveGuard`] for the object-bus side of a device
//! - [`StoreHandle`] for serialized, atomic writes to the device store
//! - [`BridgeArgs`] for CLI argument parsing
//! - [`InstanceStatus`] for standardized status reporting

mod args;
mod config;
mod error;
mod liveliness;
mod publisher;
mod runner;
mod status;
mod store_writer;
mod transport;
mod writes;

pub use args::{BridgeArgs, DEFAULT_STORE_PATH};
pub use config::{BridgeConfig, TransportSettings, resolve_logging};
pub use error::{BridgeError, Result};
pub use liveliness::AliveGuard;
pub use publisher::{BusPublisher, PublishStats};
pub use runner::{BridgeRunner, shutdown_signal};
pub use status::{InstanceState, InstanceStatus, report_status};
pub use store_writer::{StoreHandle, StoreUpdate, spawn_store_writer};
pub use transport::{BrokerConfig, InboundMessage, MqttTransport, TransportError};
pub use writes::{WriteRequest, decode_write_payload, subscribe_writes};

// Re-export commonly used types from virtdev-common
pub use virtdev_common::{BusValue, LoggingConfig, ServiceKeys, ZenohConfig};
