//! PostgreSQL store backed by a bounded sqlx pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::task::JoinHandle;
use tokio::time;

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::sink::store::{Store, StoreError, StoreRow};

pub const MAX_CONNECTIONS: u32 = 25;
pub const MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS client_data (
        id SERIAL PRIMARY KEY,
        url TEXT NOT NULL,
        data JSONB,
        parameters JSONB,
        created_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS mqtt_messages (
        id SERIAL PRIMARY KEY,
        topic TEXT NOT NULL,
        payload TEXT,
        created_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS coap_messages (
        id SERIAL PRIMARY KEY,
        path TEXT NOT NULL,
        payload TEXT,
        method TEXT,
        created_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS snmp_data (
        id SERIAL PRIMARY KEY,
        host TEXT NOT NULL,
        data JSONB,
        created_at BIGINT NOT NULL
    )",
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(connection_string: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .max_lifetime(MAX_LIFETIME)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(connection_string)
            .await?;

        tracing::info!(max_connections = MAX_CONNECTIONS, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create the four ingestion tables if they do not exist.
    pub async fn setup_tables(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(tables = SCHEMA.len(), "Database tables ready");
        Ok(())
    }

    /// Sample pool occupancy into gauges until shutdown.
    pub fn spawn_pool_monitor(&self, mut shutdown: ShutdownSignal) -> JoinHandle<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(POOL_SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        metrics::set_store_pool(pool.size() as f64, pool.num_idle() as f64);
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, row: &StoreRow) -> Result<(), StoreError> {
        let query = match row {
            StoreRow::ClientData {
                url,
                data,
                parameters,
                created_at,
            } => sqlx::query(
                "INSERT INTO client_data (url, data, parameters, created_at) VALUES ($1, $2::jsonb, $3::jsonb, $4)",
            )
            .bind(url.as_str())
            .bind(data.as_str())
            .bind(parameters.as_str())
            .bind(*created_at),
            StoreRow::MqttMessage {
                topic,
                payload,
                created_at,
            } => sqlx::query("INSERT INTO mqtt_messages (topic, payload, created_at) VALUES ($1, $2, $3)")
                .bind(topic.as_str())
                .bind(payload.as_str())
                .bind(*created_at),
            StoreRow::CoapMessage {
                path,
                payload,
                method,
                created_at,
            } => sqlx::query("INSERT INTO coap_messages (path, payload, method, created_at) VALUES ($1, $2, $3, $4)")
                .bind(path.as_str())
                .bind(payload.as_str())
                .bind(method.as_str())
                .bind(*created_at),
            StoreRow::SnmpData { host, data, created_at } => {
                sqlx::query("INSERT INTO snmp_data (host, data, created_at) VALUES ($1, $2::jsonb, $3)")
                    .bind(host.as_str())
                    .bind(data.as_str())
                    .bind(*created_at)
            }
        };

        query.execute(&self.pool).await?;
        Ok(())
    }
}
