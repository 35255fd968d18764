//! Merge, persist, publish.
//!
//! Every transport funnels into [`Pipeline`]. Within one record the Store
//! write always precedes the Log publish, and a failed Store write skips the
//! publish entirely. A failed publish leaves the Store row in place.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::observability::metrics;
use crate::pipeline::sanitize::{mqtt_topic, sanitize_topic, snmp_topic};
use crate::sink::{LogPublisher, PublishError, Store, StoreError, StoreRow};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: PublishError,
    },
}

impl IngestError {
    /// True when the record reached the Store before the error.
    pub fn is_durable(&self) -> bool {
        matches!(self, IngestError::Publish { .. })
    }
}

/// Wall clock in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// Body fields win; each variable not already present is added as a string.
pub fn merge_fields(body: Map<String, Value>, vars: &BTreeMap<String, String>) -> Map<String, Value> {
    let mut merged = body;
    for (name, value) in vars {
        merged
            .entry(name.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    merged
}

/// One accepted message, ready to persist and publish.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionRecord {
    pub target: String,
    pub fields: Map<String, Value>,
    pub vars: BTreeMap<String, String>,
    pub received: i64,
}

impl IngestionRecord {
    pub fn new(target: impl Into<String>, body: Map<String, Value>, vars: BTreeMap<String, String>) -> Self {
        Self {
            target: target.into(),
            fields: merge_fields(body, &vars),
            vars,
            received: now_nanos(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineTimeouts {
    pub store: Duration,
    pub publish: Duration,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            store: DEFAULT_STORE_TIMEOUT,
            publish: DEFAULT_PUBLISH_TIMEOUT,
        }
    }
}

/// Shared ingestion path for every transport.
pub struct Pipeline {
    store: Arc<dyn Store>,
    log: Arc<dyn LogPublisher>,
    timeouts: PipelineTimeouts,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, log: Arc<dyn LogPublisher>) -> Self {
        Self {
            store,
            log,
            timeouts: PipelineTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: PipelineTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Ingest a JSON body received on a declarative endpoint.
    pub async fn ingest(
        &self,
        target: &str,
        body: Map<String, Value>,
        vars: BTreeMap<String, String>,
    ) -> Result<(), IngestError> {
        let record = IngestionRecord::new(target, body, vars);

        let data = serde_json::to_string(&record.fields)?;
        let parameters = serde_json::to_string(&record.vars)?;

        self.persist(StoreRow::ClientData {
            url: record.target.clone(),
            data,
            parameters,
            created_at: record.received,
        })
        .await?;

        let message = json!({
            "data": record.fields,
            "params": record.vars,
            "url": record.target,
            "received": record.received,
        });
        self.publish(&sanitize_topic(&record.target), &message).await
    }

    /// Ingest a CoAP request body. `fields` is the parsed body object, or
    /// the raw text wrapped as `coapbody`.
    pub async fn ingest_coap(
        &self,
        path: &str,
        method: &str,
        raw: &str,
        fields: Map<String, Value>,
        vars: BTreeMap<String, String>,
    ) -> Result<(), IngestError> {
        let record = IngestionRecord::new(path, fields, vars);

        self.persist(StoreRow::CoapMessage {
            path: record.target.clone(),
            payload: raw.to_string(),
            method: method.to_string(),
            created_at: record.received,
        })
        .await?;

        let message = json!({
            "path": record.target,
            "method": method,
            "data": record.fields,
            "received": record.received,
        });
        self.publish(&sanitize_topic(&format!("coap{}", path)), &message).await
    }

    /// Ingest one MQTT message.
    pub async fn ingest_mqtt(&self, topic: &str, payload: &[u8]) -> Result<(), IngestError> {
        let payload = String::from_utf8_lossy(payload).into_owned();
        let received = now_nanos();

        self.persist(StoreRow::MqttMessage {
            topic: topic.to_string(),
            payload: payload.clone(),
            created_at: received,
        })
        .await?;

        let message = json!({
            "topic": topic,
            "payload": payload,
            "received": received,
        });
        self.publish(&mqtt_topic(topic), &message).await
    }

    /// Ingest one SNMP result record, persisting it first when `persist`.
    pub async fn ingest_snmp(
        &self,
        operation: &str,
        source: &str,
        record: &Value,
        persist: bool,
    ) -> Result<(), IngestError> {
        if persist {
            let data = serde_json::to_string(record)?;
            self.persist(StoreRow::SnmpData {
                host: source.to_string(),
                data,
                created_at: now_nanos(),
            })
            .await?;
        }

        self.publish(&snmp_topic(operation, source), record).await
    }

    async fn persist(&self, row: StoreRow) -> Result<(), IngestError> {
        let table = row.table();
        let start = Instant::now();
        let result = bounded(self.timeouts.store, self.store.insert(&row))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeouts.store)));

        metrics::record_store(table, result.is_ok(), start);
        if let Err(e) = &result {
            tracing::error!(table, error = %e, "Store write failed, skipping publish");
        }
        result.map_err(IngestError::from)
    }

    async fn publish(&self, topic: &str, message: &Value) -> Result<(), IngestError> {
        let start = Instant::now();
        let result = bounded(self.timeouts.publish, self.log.publish(topic, message))
            .await
            .unwrap_or(Err(PublishError::Timeout(self.timeouts.publish)));

        metrics::record_publish(result.is_ok(), start);
        match result {
            Ok(()) => {
                tracing::debug!(topic, "Record published");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(topic, error = %source, "Publish failed, record remains in store");
                Err(IngestError::Publish {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }
}

/// `None` when `future` does not finish within `limit`.
async fn bounded<F: Future>(limit: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(limit, future).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_merge_adds_missing_vars_as_strings() {
        let merged = merge_fields(object(json!({"temp": 21})), &vars(&[("id", "7")]));
        assert_eq!(Value::Object(merged), json!({"temp": 21, "id": "7"}));
    }

    #[test]
    fn test_merge_body_wins() {
        let merged = merge_fields(object(json!({"id": 99, "x": null})), &vars(&[("id", "7"), ("x", "1")]));
        assert_eq!(merged["id"], json!(99));
        assert_eq!(merged["x"], Value::Null);
    }

    #[test]
    fn test_record_keeps_raw_vars() {
        let record = IngestionRecord::new("/s/1", Map::new(), vars(&[("id", "1")]));
        assert_eq!(record.vars, vars(&[("id", "1")]));
        assert_eq!(record.fields["id"], json!("1"));
        assert!(record.received > 0);
    }

    #[test]
    fn test_only_publish_errors_are_durable() {
        let publish = IngestError::Publish {
            topic: "bz.x".into(),
            source: PublishError::Timeout(DEFAULT_PUBLISH_TIMEOUT),
        };
        assert!(publish.is_durable());
        assert!(!IngestError::Store(StoreError::Timeout(DEFAULT_STORE_TIMEOUT)).is_durable());
    }
}
