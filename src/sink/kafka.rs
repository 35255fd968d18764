//! Kafka publisher.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde_json::Value;

use crate::sink::log::{LogPublisher, PublishError};

/// One shared producer for the whole process.
pub struct KafkaPublisher {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(brokers: &[String], delivery_timeout: Duration) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("message.timeout.ms", delivery_timeout.as_millis().to_string())
            .create()
            .map_err(|e| PublishError::Rejected(e.to_string()))?;

        tracing::info!(brokers = %brokers.join(","), "Kafka producer created");
        Ok(Self {
            producer,
            delivery_timeout,
        })
    }
}

#[async_trait]
impl LogPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, record: &Value) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(record)?;
        let delivery = self
            .producer
            .send(
                FutureRecord::<(), _>::to(topic).payload(&payload),
                Timeout::After(self.delivery_timeout),
            )
            .await;

        match delivery {
            Ok(_) => Ok(()),
            Err((e, _)) => Err(PublishError::Rejected(e.to_string())),
        }
    }

    async fn close(&self) {
        let producer = self.producer.clone();
        let timeout = self.delivery_timeout;
        let flushed = tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await;
        match flushed {
            Ok(Ok(())) => tracing::info!("Kafka producer flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Kafka flush incomplete"),
            Err(e) => tracing::warn!(error = %e, "Kafka flush task failed"),
        }
    }
}
