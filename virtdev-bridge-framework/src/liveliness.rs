//! Liveliness tokens for device presence.
//!
//! Each running instance holds one token at `<prefix>/<service>/@/alive`.
//! The token is undeclared when the guard is dropped, so an instance that
//! stops, fails or panics disappears from the bus without extra bookkeeping.
//!
//! Observers subscribe to [`virtdev_common::all_alive_wildcard`] through the
//! Zenoh liveliness API to follow devices coming and going.

use zenoh::Session;
use zenoh::liveliness::LivelinessToken;

use virtdev_common::ServiceKeys;

use crate::error::{BridgeError, Result};

/// Keeps a service's liveliness token declared while alive.
#[derive(Debug)]
pub struct AliveGuard {
    key: String,
    #[allow(dead_code)]
    token: LivelinessToken,
}

impl AliveGuard {
    /// Declare `keys`' service as alive.
    pub async fn declare(session: &Session, keys: &ServiceKeys) -> Result<Self> {
        let key = keys.alive_key();

        let token = session
            .liveliness()
            .declare_token(&key)
            .await
            .map_err(|e| BridgeError::Liveliness {
                key: key.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(key = %key, "Service liveliness token declared");

        Ok(Self { key, token })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        tracing::debug!(key = %self.key, "Service liveliness token undeclared");
    }
}
