//! Instance status reporting.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::publisher::BusPublisher;

/// Lifecycle state reported for a device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Running,
    Offline,
    Error,
}

/// Status document published on `<prefix>/<service>/@/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatus {
    /// Bus service name.
    pub service: String,
    /// Store section the instance was built from.
    pub section: String,
    /// Bridge version.
    pub version: String,
    pub status: InstanceState,
    /// RFC 3339 time of the report.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceStatus {
    fn new(service: &str, section: &str, status: InstanceState) -> Self {
        Self {
            service: service.to_string(),
            section: section.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            error: None,
        }
    }

    pub fn running(service: &str, section: &str) -> Self {
        Self::new(service, section, InstanceState::Running)
    }

    pub fn offline(service: &str, section: &str) -> Self {
        Self::new(service, section, InstanceState::Offline)
    }

    pub fn error(service: &str, section: &str, error: impl Into<String>) -> Self {
        let mut status = Self::new(service, section, InstanceState::Error);
        status.error = Some(error.into());
        status
    }

    /// Publish to the service's status key.
    pub async fn publish(&self, publisher: &BusPublisher) -> Result<()> {
        let key = publisher.keys().status_key();
        publisher.put_json(&key, self).await
    }
}

/// Publish a status, logging instead of failing.
pub async fn report_status(publisher: &BusPublisher, status: InstanceStatus) {
    if let Err(e) = status.publish(publisher).await {
        tracing::warn!(
            service = %status.service,
            status = ?status.status,
            error = %e,
            "Failed to publish instance status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_running() {
        let status = InstanceStatus::running("com.victronenergy.tank.virtual_1", "Tank_Sensor_1");
        assert_eq!(status.status, InstanceState::Running);
        assert!(status.error.is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(&status.timestamp).is_ok());
    }

    #[test]
    fn test_status_serialization() {
        let status = InstanceStatus::error("svc", "Input_1", "broker unreachable");

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"section\":\"Input_1\""));
        assert!(json.contains("\"error\":\"broker unreachable\""));

        let offline = serde_json::to_string(&InstanceStatus::offline("svc", "Input_1")).unwrap();
        assert!(!offline.contains("\"error\""));
    }
}
