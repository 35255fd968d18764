//! MQTT subscriber.
//!
//! Subscribes to the configured topic filter and ingests every publish
//! through the pipeline on its own task. Connection errors are logged and
//! the event loop reconnects after a short pause.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::schema::MqttConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::pipeline::Pipeline;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("invalid MQTT broker address {0:?}")]
    InvalidBroker(String),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Split `tcp://host:port` (scheme and port optional) into host and port.
pub fn parse_broker(broker: &str) -> Result<(String, u16), MqttError> {
    let without_scheme = broker.split_once("://").map(|(_, rest)| rest).unwrap_or(broker);
    let authority = without_scheme.trim_end_matches('/');

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| MqttError::InvalidBroker(broker.to_string()))?;
            (host, port)
        }
        None => (authority, DEFAULT_MQTT_PORT),
    };

    if host.is_empty() {
        return Err(MqttError::InvalidBroker(broker.to_string()));
    }
    Ok((host.to_string(), port))
}

pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: rumqttc::EventLoop,
    topic: String,
    pipeline: Arc<Pipeline>,
}

impl MqttSubscriber {
    pub fn new(config: &MqttConfig, pipeline: Arc<Pipeline>) -> Result<Self, MqttError> {
        let (host, port) = parse_broker(&config.broker)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, eventloop) = AsyncClient::new(options, 64);
        Ok(Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            pipeline,
        })
    }

    /// Drive the connection until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        tracing::info!(topic = %self.topic, "MQTT subscriber starting");

        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        // Subscriptions do not survive a clean-session reconnect.
                        if let Err(e) = self.client.subscribe(self.topic.clone(), QoS::AtLeastOnce).await {
                            tracing::error!(topic = %self.topic, error = %e, "MQTT subscribe failed");
                        } else {
                            tracing::info!(topic = %self.topic, "Subscribed to MQTT topic");
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        metrics::record_mqtt_message();
                        tracing::debug!(topic = %publish.topic, bytes = publish.payload.len(), "Received MQTT message");

                        let pipeline = self.pipeline.clone();
                        tokio::spawn(async move {
                            if let Err(e) = pipeline.ingest_mqtt(&publish.topic, &publish.payload).await {
                                tracing::error!(topic = %publish.topic, error = %e, durable = e.is_durable(), "MQTT ingestion failed");
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "MQTT connection error, reconnecting");
                        tokio::select! {
                            _ = sleep(RECONNECT_DELAY) => {}
                            _ = shutdown.recv() => break,
                        }
                    }
                },
                _ = shutdown.recv() => {
                    let _ = self.client.disconnect().await;
                    break;
                }
            }
        }

        tracing::info!("MQTT subscriber stopped");
    }
}
