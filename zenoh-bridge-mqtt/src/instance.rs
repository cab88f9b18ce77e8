//! One running device instance.
//!
//! An instance owns its synchronizer, its broker connection and its bus
//! registration. Everything that mutates device state happens on the
//! instance's own task, so no locking is needed.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use virtdev_bridge_framework::{
    AliveGuard, BridgeError, BrokerConfig, BusPublisher, InboundMessage, InstanceStatus, MqttTransport,
    ServiceKeys, StoreHandle, TransportError, TransportSettings, WriteRequest, report_status,
    subscribe_writes,
};

use crate::devices::Device;
use crate::effect::Effect;
use crate::registry::{DeviceConfigError, DeviceEntry, broker_config};

/// Why an instance stopped.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// The store section is unusable. Never restarted.
    #[error("configuration error: {0}")]
    Config(#[from] DeviceConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The broker event loop ended while the instance was running.
    #[error("broker connection closed")]
    TransportClosed,

    #[error("object bus error: {0}")]
    Bus(#[from] BridgeError),

    /// The bus write subscription ended while the instance was running.
    #[error("object bus subscription closed")]
    BusClosed,
}

impl InstanceError {
    /// Whether the supervisor may try again.
    pub fn is_restartable(&self) -> bool {
        !matches!(self, InstanceError::Config(_))
    }
}

/// Everything an instance needs from the process.
#[derive(Clone)]
pub struct InstanceContext {
    pub session: Arc<zenoh::Session>,
    pub key_prefix: String,
    pub store: StoreHandle,
    pub transport: TransportSettings,
    pub shutdown: watch::Receiver<bool>,
}

impl InstanceContext {
    /// Run `entry` until shutdown or failure.
    pub async fn run(&self, entry: &DeviceEntry) -> Result<(), InstanceError> {
        let store = self.store.snapshot().await?;
        let device = Device::build(entry, &store)?;
        let broker = broker_config(&store, &entry.serial);

        let keys = ServiceKeys::with_prefix(&self.key_prefix, device.service_name());
        let publisher = BusPublisher::new(self.session.clone(), keys.clone());

        let instance = Instance {
            device,
            publisher,
            store: self.store.clone(),
            transport: None,
        };
        instance.run(self, keys, broker).await
    }
}

struct Instance {
    device: Device,
    publisher: BusPublisher,
    store: StoreHandle,
    transport: Option<MqttTransport>,
}

impl Instance {
    async fn run(
        mut self,
        ctx: &InstanceContext,
        keys: ServiceKeys,
        broker: BrokerConfig,
    ) -> Result<(), InstanceError> {
        let section = self.device.entry().section.clone();
        let service = keys.service().to_string();

        let result = self.serve(ctx, keys, broker).await;

        let status = match &result {
            Ok(()) => InstanceStatus::offline(&service, &section),
            Err(e) => InstanceStatus::error(&service, &section, e.to_string()),
        };
        report_status(&self.publisher, status).await;

        if let Some(transport) = self.transport.take() {
            transport.disconnect().await;
        }
        result
    }

    async fn serve(
        &mut self,
        ctx: &InstanceContext,
        keys: ServiceKeys,
        broker: BrokerConfig,
    ) -> Result<(), InstanceError> {
        let section = self.device.entry().section.clone();
        let service = keys.service().to_string();

        let stats = self.publisher.publish_tree(self.device.tree().iter()).await;
        tracing::info!(
            section = %section,
            service = %service,
            properties = stats.total(),
            failed = stats.failed,
            "Device registered on the object bus"
        );

        let _alive = AliveGuard::declare(&ctx.session, &keys).await?;
        let mut writes = subscribe_writes(
            ctx.session.clone(),
            keys,
            ctx.transport.channel_capacity,
            ctx.shutdown.clone(),
        )
        .await?;
        report_status(&self.publisher, InstanceStatus::running(&service, &section)).await;

        let topics = self.device.inbound_topics();
        let mut inbound = if topics.is_empty() {
            tracing::info!(section = %section, "No topics configured, broker not used");
            None
        } else {
            tracing::info!(
                section = %section,
                broker = %broker.address(),
                topics = topics.len(),
                "Connecting to broker"
            );
            let (transport, rx) =
                match MqttTransport::connect(&broker, &ctx.transport, topics, ctx.shutdown.clone())
                    .await
                {
                    Ok(connected) => connected,
                    Err(TransportError::Cancelled) => return Ok(()),
                    Err(e) => return Err(e.into()),
                };
            self.transport = Some(transport);
            Some(rx)
        };

        let mut shutdown = ctx.shutdown.clone();
        loop {
            tokio::select! {
                _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => {
                    tracing::info!(section = %section, "Instance stopping");
                    return Ok(());
                }
                message = next_inbound(&mut inbound) => {
                    let Some(message) = message else {
                        return Err(InstanceError::TransportClosed);
                    };
                    let effects = self.device.on_inbound(&message.topic, &message.payload);
                    self.apply(effects).await;
                }
                request = writes.recv() => {
                    let Some(request) = request else {
                        if *shutdown.borrow() {
                            return Ok(());
                        }
                        return Err(InstanceError::BusClosed);
                    };
                    self.handle_write(request).await;
                }
            }
        }
    }

    async fn handle_write(&mut self, request: WriteRequest) {
        match self.device.on_write(&request.path, &request.value) {
            Ok(effects) => {
                tracing::debug!(path = %request.path, value = ?request.value, "Bus write accepted");
                self.apply(effects).await;
            }
            Err(e) => tracing::warn!(
                section = %self.device.entry().section,
                path = %request.path,
                value = ?request.value,
                error = %e,
                "Bus write rejected"
            ),
        }
    }

    /// Carry out effects in order.
    async fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify { path, value } => {
                    if let Err(e) = self.publisher.publish_value(&path, &value).await {
                        tracing::warn!(path = %path, error = %e, "Failed to publish property");
                    }
                }
                Effect::Publish { topic, payload } => match &self.transport {
                    Some(transport) => {
                        if let Err(e) = transport.publish(&topic, payload).await {
                            tracing::warn!(topic = %topic, error = %e, "Failed to publish command");
                        }
                    }
                    None => tracing::warn!(topic = %topic, "No broker connection, command dropped"),
                },
                Effect::Persist {
                    section,
                    key,
                    value,
                } => self.store.persist(section, key, value).await,
            }
        }
    }
}

/// Next inbound message; pends forever when there is no broker connection.
async fn next_inbound(rx: &mut Option<mpsc::Receiver<InboundMessage>>) -> Option<InboundMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restartable_errors() {
        let config = InstanceError::Config(DeviceConfigError::MissingSection("Input_9".into()));
        assert!(!config.is_restartable());
        assert!(InstanceError::TransportClosed.is_restartable());
        assert!(
            InstanceError::Transport(TransportError::RetriesExhausted {
                broker: "localhost:1883".into(),
                attempts: 12,
                last_error: "refused".into(),
            })
            .is_restartable()
        );
    }
}
