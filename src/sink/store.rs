//! Relational store abstraction.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One append-only row. JSON columns carry already-serialized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRow {
    ClientData {
        url: String,
        data: String,
        parameters: String,
        created_at: i64,
    },
    MqttMessage {
        topic: String,
        payload: String,
        created_at: i64,
    },
    CoapMessage {
        path: String,
        payload: String,
        method: String,
        created_at: i64,
    },
    SnmpData {
        host: String,
        data: String,
        created_at: i64,
    },
}

impl StoreRow {
    pub fn table(&self) -> &'static str {
        match self {
            StoreRow::ClientData { .. } => "client_data",
            StoreRow::MqttMessage { .. } => "mqtt_messages",
            StoreRow::CoapMessage { .. } => "coap_messages",
            StoreRow::SnmpData { .. } => "snmp_data",
        }
    }
}

/// Durable destination for ingested records.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert(&self, row: &StoreRow) -> Result<(), StoreError>;
}
