//! Append-only log abstraction.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("log rejected message: {0}")]
    Rejected(String),

    #[error("no delivery confirmation after {0:?}")]
    Timeout(Duration),
}

/// Destination for published records. `publish` resolves once the broker
/// confirms delivery.
#[async_trait]
pub trait LogPublisher: Send + Sync {
    async fn publish(&self, topic: &str, record: &Value) -> Result<(), PublishError>;

    /// Flush outstanding messages and release the client.
    async fn close(&self);
}
