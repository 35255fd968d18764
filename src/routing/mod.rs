//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, body)
//!     → dispatcher.rs (load current snapshot)
//!     → router.rs (path trie lookup, variable extraction)
//!     → template cache (render configured body)
//!     → Reply / NotFound / MethodNotAllowed
//!
//! Route Compilation (startup and every reload):
//!     EndpointConfig[]
//!     → Compile path trie
//!     → Pair with a fresh template cache
//!     → Publish as one immutable snapshot
//! ```
//!
//! # Design Decisions
//! - Routes compiled per generation, immutable once published
//! - Deterministic: same input always matches same endpoint
//! - HTTP and CoAP share one dispatcher implementation

pub mod dispatcher;
pub mod router;

pub use dispatcher::{Dispatch, Dispatcher, Reply, RoutingSnapshot, Transport};
pub use router::{EndpointRouter, RouteError, RouteMatch};
