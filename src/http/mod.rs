//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → fixed routes: /metrics, snmp_api.rs
//!     → everything else: routing::Dispatcher
//!     → configured headers, status, rendered body
//! ```

pub mod request;
pub mod server;
pub mod snmp_api;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
