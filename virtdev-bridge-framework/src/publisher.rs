//! Object-bus publisher for one device service.

use std::sync::Arc;

use serde::Serialize;
use virtdev_common::{BusValue, ServiceKeys};

use crate::error::{BridgeError, Result};

/// Puts the properties of one service on the bus.
///
/// Every put is one change notification for that property.
#[derive(Clone, Debug)]
pub struct BusPublisher {
    session: Arc<zenoh::Session>,
    keys: ServiceKeys,
}

impl BusPublisher {
    pub fn new(session: Arc<zenoh::Session>, keys: ServiceKeys) -> Self {
        Self { session, keys }
    }

    pub fn keys(&self) -> &ServiceKeys {
        &self.keys
    }

    /// Publish the value of one property path.
    pub async fn publish_value(&self, path: &str, value: &BusValue) -> Result<()> {
        let key = self.keys.property(path);
        tracing::trace!(key = %key, value = ?value, "Bus notify");
        self.put_json(&key, value).await
    }

    /// Publish every `(path, value)` pair; failures are logged and counted.
    pub async fn publish_tree<'a, I>(&self, values: I) -> PublishStats
    where
        I: IntoIterator<Item = (&'a str, &'a BusValue)>,
    {
        let mut stats = PublishStats::default();
        for (path, value) in values {
            match self.publish_value(path, value).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(path = %path, error = %e, "Failed to publish property");
                }
            }
        }
        stats
    }

    /// Put `value` as JSON on an arbitrary key of the service.
    pub(crate) async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.session
            .put(key, payload)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

/// Statistics from a tree publish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub success: usize,
    pub failed: usize,
}

impl PublishStats {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}
