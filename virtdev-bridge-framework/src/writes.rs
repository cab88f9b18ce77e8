//! Bus-side write requests.
//!
//! Writes arrive on `<prefix>/<service>/@/set/<path>`. A forwarding task owns
//! the Zenoh subscriber and hands each request to the instance over a bounded
//! channel, so property mutation stays on the instance's event loop.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use zenoh::sample::SampleKind;

use virtdev_common::{BusValue, ServiceKeys};

use crate::error::{BridgeError, Result};

/// A property write requested by a bus client.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    /// Property path, e.g. `/Capacity`.
    pub path: String,
    pub value: BusValue,
}

/// Decode a write payload: JSON scalar, or bare UTF-8 text.
///
/// JSON booleans become `1` and `0`.
pub fn decode_write_payload(payload: &[u8]) -> Option<BusValue> {
    if let Ok(value) = serde_json::from_slice::<BusValue>(payload) {
        return Some(value);
    }
    if let Ok(flag) = serde_json::from_slice::<bool>(payload) {
        return Some(BusValue::Int(i64::from(flag)));
    }
    std::str::from_utf8(payload)
        .ok()
        .map(|s| BusValue::Text(s.trim().to_string()))
}

/// Subscribe to the write space of `keys` and forward requests.
///
/// The forwarding task ends on shutdown or when the receiver is dropped.
pub async fn subscribe_writes(
    session: Arc<zenoh::Session>,
    keys: ServiceKeys,
    capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<mpsc::Receiver<WriteRequest>> {
    let wildcard = keys.set_wildcard();
    let subscriber = session
        .declare_subscriber(&wildcard)
        .await
        .map_err(|e| BridgeError::Subscribe {
            key: wildcard.clone(),
            message: e.to_string(),
        })?;

    tracing::debug!(key = %wildcard, "Listening for property writes");

    let (tx, rx) = mpsc::channel(capacity.max(1));

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tx.closed() => break,
                sample = subscriber.recv_async() => {
                    let sample = match sample {
                        Ok(sample) => sample,
                        Err(_) => break,
                    };
                    if sample.kind() == SampleKind::Delete {
                        continue;
                    }
                    let key = sample.key_expr().as_str();
                    let Some(path) = keys.path_from_set_key(key) else {
                        tracing::debug!(key = %key, "Ignoring write outside service");
                        continue;
                    };
                    let Some(value) = decode_write_payload(&sample.payload().to_bytes()) else {
                        tracing::warn!(path = %path, "Undecodable write payload");
                        continue;
                    };
                    if tx.send(WriteRequest { path, value }).await.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(service = %keys.service(), "Write forwarding stopped");
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_scalars() {
        assert_eq!(decode_write_payload(b"1"), Some(BusValue::Int(1)));
        assert_eq!(decode_write_payload(b"0.25"), Some(BusValue::Float(0.25)));
        assert_eq!(
            decode_write_payload(b"\"Galley\""),
            Some(BusValue::from("Galley"))
        );
    }

    #[test]
    fn test_decode_json_booleans() {
        assert_eq!(decode_write_payload(b"true"), Some(BusValue::Int(1)));
        assert_eq!(decode_write_payload(b" false "), Some(BusValue::Int(0)));
        // Only JSON literals, not words.
        assert_eq!(decode_write_payload(b"True"), Some(BusValue::from("True")));
    }

    #[test]
    fn test_decode_bare_text() {
        assert_eq!(
            decode_write_payload(b"fresh water"),
            Some(BusValue::from("fresh water"))
        );
        assert_eq!(decode_write_payload(&[0xff, 0xfe]), None);
    }
}
