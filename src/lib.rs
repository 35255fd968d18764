//! Configuration-driven telemetry ingestion gateway.
//!
//! Declarative HTTP and CoAP endpoints, an MQTT subscription and SNMP
//! GET/WALK/TRAP all feed one pipeline that persists every accepted message
//! to PostgreSQL and publishes it to Kafka. Endpoint definitions and SNMP
//! parameters are hot-reloaded from the configuration file.

// Core subsystems
pub mod config;
pub mod pipeline;
pub mod routing;
pub mod template;

// Transports
pub mod coap;
pub mod http;
pub mod mqtt;
pub mod snmp;

// Sinks
pub mod sink;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
pub use routing::Dispatcher;
