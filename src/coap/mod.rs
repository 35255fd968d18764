//! CoAP transport.
//!
//! # Data Flow
//! ```text
//! UDP datagram
//!     → coap-lite decode
//!     → routing::Dispatcher (shared with HTTP)
//!     → configured code, content format, rendered payload
//! ```

pub mod server;

pub use server::{coap_code, handle_datagram, CoapServer};
