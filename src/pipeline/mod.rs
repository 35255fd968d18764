//! Ingestion pipeline.
//!
//! # Data Flow
//! ```text
//! listener (HTTP / CoAP / MQTT / SNMP)
//!     → ingest.rs (merge body + variables)
//!     → Store write (bounded, 5 s)
//!     → sanitize.rs (target → topic)
//!     → Log publish (bounded, 5 s), only after the Store write succeeded
//! ```

pub mod ingest;
pub mod sanitize;

pub use ingest::{merge_fields, IngestError, IngestionRecord, Pipeline, PipelineTimeouts};
pub use sanitize::{mqtt_topic, sanitize_topic, snmp_topic};
