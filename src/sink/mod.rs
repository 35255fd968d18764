//! Sinks every accepted message is fanned out to.
//!
//! # Data Flow
//! ```text
//! Pipeline
//!     → store.rs (Store trait)      → postgres.rs (sqlx pool)
//!     → log.rs (LogPublisher trait) → kafka.rs (rdkafka producer)
//! ```
//!
//! # Design Decisions
//! - The pipeline talks to traits, so tests swap in memory fakes
//! - Time bounds are applied by the pipeline, not the drivers

pub mod kafka;
pub mod log;
pub mod postgres;
pub mod store;

pub use kafka::KafkaPublisher;
pub use log::{LogPublisher, PublishError};
pub use postgres::PgStore;
pub use store::{Store, StoreError, StoreRow};
