//! MQTT transport adapter.
//!
//! One broker connection per device instance. The rumqttc event loop runs on
//! its own task and never touches device state: inbound publishes are handed
//! to the instance over a bounded channel.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS, SubscribeFilter,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::TransportSettings;

/// Capacity of rumqttc's request queue.
const REQUEST_CAPACITY: usize = 10;

/// Errors raised by the transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker stayed unreachable for every allowed attempt.
    #[error("broker {broker} unreachable after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        broker: String,
        attempts: u32,
        last_error: String,
    },

    /// A request could not be queued on the client.
    #[error("MQTT client error: {0}")]
    Client(#[from] ClientError),

    /// Shutdown was requested while connecting.
    #[error("shutdown requested while connecting")]
    Cancelled,
}

/// Broker address and credentials of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Empty or absent means anonymous.
    pub username: Option<String>,
    pub password: Option<String>,
    /// MQTT client id; the device serial.
    pub client_id: String,
}

impl BrokerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the rumqttc options for this broker.
    pub fn mqtt_options(&self, settings: &TransportSettings) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        if let Some(user) = self.username.as_deref().filter(|u| !u.is_empty()) {
            options.set_credentials(user, self.password.as_deref().unwrap_or_default());
        }
        options
    }
}

/// An inbound message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A connected MQTT client plus its event loop task.
#[derive(Debug)]
pub struct MqttTransport {
    client: AsyncClient,
    broker: String,
    poll_task: JoinHandle<()>,
}

impl MqttTransport {
    /// Connect with retry, subscribe to `topics`, and start forwarding
    /// inbound messages.
    ///
    /// Returns [`TransportError::RetriesExhausted`] once `max_retries`
    /// consecutive attempts failed.
    pub async fn connect(
        broker: &BrokerConfig,
        settings: &TransportSettings,
        topics: Vec<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), TransportError> {
        let (client, mut eventloop) =
            AsyncClient::new(broker.mqtt_options(settings), REQUEST_CAPACITY);
        let retry = Duration::from_secs(settings.retry_interval_secs);

        tracing::info!(
            broker = %broker.address(),
            client_id = %broker.client_id,
            topics = topics.len(),
            "Connecting to MQTT broker"
        );

        let mut attempts = 0u32;
        loop {
            let polled = tokio::select! {
                _ = shutdown.changed() => return Err(TransportError::Cancelled),
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => {
                    attempts += 1;
                    if attempts >= settings.max_retries.max(1) {
                        return Err(TransportError::RetriesExhausted {
                            broker: broker.address(),
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    tracing::warn!(
                        broker = %broker.address(),
                        attempt = attempts,
                        max = settings.max_retries,
                        error = %e,
                        "MQTT connection failed, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => return Err(TransportError::Cancelled),
                        _ = tokio::time::sleep(retry) => {}
                    }
                }
            }
        }

        tracing::info!(broker = %broker.address(), "Connected to MQTT broker");
        subscribe_all(&client, &topics)?;

        let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
        let poll_task = tokio::spawn(poll_loop(
            eventloop,
            client.clone(),
            topics,
            tx,
            shutdown,
            retry,
            broker.address(),
        ));

        Ok((
            Self {
                client,
                broker: broker.address(),
                poll_task,
            },
            rx,
        ))
    }

    /// Publish `payload` on `topic` (QoS 0, not retained).
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        let payload = payload.into();
        tracing::debug!(topic = %topic, bytes = payload.len(), "MQTT publish");
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    /// Send DISCONNECT and wait briefly for the event loop to wind down.
    pub async fn disconnect(mut self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(broker = %self.broker, error = %e, "MQTT disconnect not queued");
        }
        if tokio::time::timeout(Duration::from_secs(1), &mut self.poll_task)
            .await
            .is_err()
        {
            tracing::debug!(broker = %self.broker, "MQTT event loop did not stop in time");
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}

fn subscribe_all(client: &AsyncClient, topics: &[String]) -> Result<(), TransportError> {
    if topics.is_empty() {
        return Ok(());
    }
    let filters = topics
        .iter()
        .map(|t| SubscribeFilter::new(t.clone(), QoS::AtMostOnce));
    client.try_subscribe_many(filters)?;
    tracing::debug!(count = topics.len(), "Subscribed to state topics");
    Ok(())
}

/// Hand `message` to the instance without waiting.
///
/// The event loop also drains outgoing publishes, so it must not block on a
/// full inbound channel. Returns `false` once the receiver is gone.
fn forward(tx: &mpsc::Sender<InboundMessage>, message: InboundMessage, broker: &str) -> bool {
    match tx.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(
                broker = %broker,
                topic = %dropped.topic,
                "Inbound channel full, dropping MQTT message"
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn poll_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    tx: mpsc::Sender<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
    retry: Duration,
    broker: String,
) {
    loop {
        let polled = tokio::select! {
            _ = shutdown.changed() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if !forward(&tx, message, &broker) {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!(broker = %broker, "Reconnected to MQTT broker");
                if let Err(e) = subscribe_all(&client, &topics) {
                    tracing::warn!(broker = %broker, error = %e, "Resubscribe failed");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                tracing::warn!(broker = %broker, error = %e, "MQTT connection error");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(retry) => {}
                }
            }
        }
    }
    tracing::debug!(broker = %broker, "MQTT event loop stopped");
}
