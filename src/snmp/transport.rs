//! SNMP wire access.
//!
//! The subsystem talks to agents through [`SnmpTransport`] and receives
//! notifications through [`TrapTransport`]. Sessions are built per call from
//! the configuration in force and never cached.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::schema::SnmpConfig;
use crate::lifecycle::ShutdownSignal;
use crate::snmp::security::SecurityParams;
use crate::snmp::value::VarBind;

#[derive(Debug, Error)]
pub enum SnmpError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} against {target} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        target: String,
        timeout: Duration,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("trap listener failed: {0}")]
    Listener(String),

    #[error("cannot prepare SNMP credentials: {0}")]
    Credentials(String),
}

/// Parameters of one GET or WALK exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpSession {
    pub target: String,
    pub port: u16,
    pub timeout: Duration,
    pub retries: u32,
    pub security: SecurityParams,
}

impl SnmpSession {
    pub fn from_config(target: &str, config: &SnmpConfig) -> Self {
        Self {
            target: target.to_string(),
            port: config.port,
            timeout: Duration::from_secs(config.timeout),
            retries: config.retries,
            security: SecurityParams::from_usm(&config.usm),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.target, self.port)
    }
}

/// One received notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trap {
    /// Sender address, `ip:port`.
    pub source: String,
    pub varbinds: Vec<VarBind>,
}

#[async_trait]
pub trait SnmpTransport: Send + Sync {
    async fn get(&self, session: &SnmpSession, oids: &[String]) -> Result<Vec<VarBind>, SnmpError>;

    async fn walk(&self, session: &SnmpSession, root_oid: &str) -> Result<Vec<VarBind>, SnmpError>;
}

#[async_trait]
pub trait TrapTransport: Send + Sync {
    /// Receive notifications on `bind` until `shutdown` fires or the
    /// receiver fails. Each trap is sent to `traps`.
    async fn listen(
        &self,
        bind: &str,
        engine_id: &str,
        security: &SecurityParams,
        traps: mpsc::Sender<Trap>,
        shutdown: ShutdownSignal,
    ) -> Result<(), SnmpError>;
}
