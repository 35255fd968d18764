//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Tracing → Config → Store → Log → Metrics → Dispatchers
//!         → MQTT → SNMP → Watcher → Listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Listeners drain → Watcher, SNMP, MQTT stop
//!         → Log flushed → Store closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then sinks, then listeners
//! - Shutdown reverses startup order

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::run;
