//! Side effects requested by a synchronizer.
//!
//! Synchronizers never perform I/O; the instance event loop carries these
//! out in order.

use thiserror::Error;
use virtdev_common::BusValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Publish a changed property on the bus.
    Notify { path: String, value: BusValue },
    /// Publish a command to the broker.
    Publish { topic: String, payload: String },
    /// Persist a setting to the device store.
    Persist {
        section: String,
        key: String,
        value: String,
    },
}

impl Effect {
    pub fn notify(path: impl Into<String>, value: BusValue) -> Self {
        Effect::Notify {
            path: path.into(),
            value,
        }
    }

    pub fn persist(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Effect::Persist {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Why a bus write was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteRejected {
    #[error("{0} is not a property of this device")]
    UnknownPath(String),

    #[error("{0} is read-only")]
    ReadOnly(String),

    #[error("value {value} is not valid for {path}")]
    InvalidValue { path: String, value: String },
}

impl WriteRejected {
    pub fn invalid(path: &str, value: &BusValue) -> Self {
        WriteRejected::InvalidValue {
            path: path.to_string(),
            value: format!("{:?}", value),
        }
    }
}
