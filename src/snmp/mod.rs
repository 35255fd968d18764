//! SNMP subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler tick / HTTP GET request / received trap
//!     → client.rs or trap.rs (session from current config)
//!     → transport.rs (SnmpTransport / TrapTransport)
//!     → netsnmp.rs (net-snmp tools)
//!     → results.rs (result record)
//!     → Pipeline::ingest_snmp (persist, then publish)
//! ```
//!
//! # Design Decisions
//! - Security parameters resolve fail-open (unknown protocol → none)
//! - Sessions are never cached; credentials follow reloads
//! - Wire access sits behind traits so tests run without agents

pub mod client;
pub mod netsnmp;
pub mod results;
pub mod security;
pub mod transport;
pub mod trap;
pub mod value;

pub use client::SnmpClient;
pub use netsnmp::NetSnmp;
pub use results::{result_record, SnmpOperation};
pub use security::{AuthProtocol, PrivProtocol, SecurityLevel, SecurityParams};
pub use transport::{SnmpError, SnmpSession, SnmpTransport, Trap, TrapTransport};
pub use trap::TrapServer;
pub use value::{SnmpValue, VarBind};
