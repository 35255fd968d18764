//! On-demand GET and the periodic WALK scheduler.
//!
//! # Responsibilities
//! - Build a fresh session per call from the configuration in force
//! - Walk every configured target on each tick, one after another
//! - Route results through the shared result routine
//!
//! # Design Decisions
//! - `term <= 0` disables polling entirely; no timer task exists
//! - A failing target is logged and the tick moves on to the next one
//! - Stopping signals the task and waits for it; an in-progress walk finishes
//! - The polling interval is fixed when the scheduler starts. Reloads change
//!   targets, root OID and credentials for the next tick

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::reload::{ReloadError, Reloadable};
use crate::config::schema::{GatewayConfig, SnmpConfig};
use crate::observability::metrics;
use crate::pipeline::Pipeline;
use crate::snmp::results::{process_results, SnmpOperation};
use crate::snmp::transport::{SnmpError, SnmpSession, SnmpTransport};

/// Scheduler lifecycle: Idle → Polling → Stopped (terminal).
enum SchedulerState {
    Idle,
    Polling {
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

pub struct SnmpClient {
    config: ArcSwap<SnmpConfig>,
    transport: Arc<dyn SnmpTransport>,
    pipeline: Arc<Pipeline>,
    scheduler: Mutex<SchedulerState>,
}

impl SnmpClient {
    pub fn new(config: &SnmpConfig, transport: Arc<dyn SnmpTransport>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config: ArcSwap::from_pointee(config.clone()),
            transport,
            pipeline,
            scheduler: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn config(&self) -> Arc<SnmpConfig> {
        self.config.load_full()
    }

    /// GET `oids` from `target`. Returns the number of bindings received.
    pub async fn get(&self, target: &str, oids: &[String]) -> Result<usize, SnmpError> {
        let config = self.config.load_full();
        let session = SnmpSession::from_config(target, &config);

        let result = self.transport.get(&session, oids).await;
        metrics::record_snmp("get", result.is_ok());
        let varbinds = result?;

        tracing::debug!(target = %target, count = varbinds.len(), "SNMP GET completed");
        process_results(&self.pipeline, SnmpOperation::Get, target, &varbinds, config.persist).await;
        Ok(varbinds.len())
    }

    /// WALK `target` from `root_oid`. Returns the number of bindings received.
    pub async fn walk(&self, target: &str, root_oid: &str) -> Result<usize, SnmpError> {
        let config = self.config.load_full();
        let session = SnmpSession::from_config(target, &config);

        let result = self.transport.walk(&session, root_oid).await;
        metrics::record_snmp("walk", result.is_ok());
        let varbinds = result?;

        tracing::debug!(target = %target, root_oid = %root_oid, count = varbinds.len(), "SNMP WALK completed");
        process_results(&self.pipeline, SnmpOperation::Walk, target, &varbinds, config.persist).await;
        Ok(varbinds.len())
    }

    async fn walk_all(&self) {
        let config = self.config.load_full();
        tracing::info!(targets = config.targets.len(), root_oid = %config.root_oid, "Executing scheduled SNMP walk");

        for target in &config.targets {
            if let Err(e) = self.walk(target, &config.root_oid).await {
                tracing::warn!(target = %target, error = %e, "Scheduled SNMP walk failed");
            }
        }
    }

    /// Start periodic walks. Returns whether a polling task is running.
    pub fn start_scheduler(self: &Arc<Self>) -> bool {
        let term = self.config.load().term;
        let mut state = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());

        match *state {
            SchedulerState::Idle => {}
            SchedulerState::Polling { .. } => return true,
            SchedulerState::Stopped => {
                tracing::warn!("SNMP walk scheduler already stopped, not restarting");
                return false;
            }
        }

        if term <= 0 {
            tracing::info!(term, "SNMP walk scheduler is disabled (term is zero or negative)");
            return false;
        }

        let period = Duration::from_secs(term as u64);
        let Some(first_tick) = Instant::now().checked_add(period) else {
            tracing::error!(term, "SNMP walk interval is out of range, polling disabled");
            return false;
        };
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let client = Arc::clone(self);

        let task = tokio::spawn(async move {
            tracing::info!(term_secs = term, "Starting SNMP walk scheduler");
            let mut ticker = time::interval_at(first_tick, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => client.walk_all().await,
                    _ = &mut stop_rx => break,
                }
            }
            tracing::info!("SNMP walk scheduler exited");
        });

        *state = SchedulerState::Polling { stop: stop_tx, task };
        true
    }

    pub fn is_polling(&self) -> bool {
        matches!(
            *self.scheduler.lock().unwrap_or_else(|e| e.into_inner()),
            SchedulerState::Polling { .. }
        )
    }

    /// Stop the scheduler and wait for its task to exit. Terminal.
    pub async fn stop(&self) {
        let previous = {
            let mut state = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        };

        if let SchedulerState::Polling { stop, task } = previous {
            let _ = stop.send(());
            if let Err(e) = task.await {
                tracing::error!(error = %e, "SNMP walk scheduler task failed");
            }
        }
        tracing::info!("SNMP client stopped");
    }
}

impl Reloadable for SnmpClient {
    fn name(&self) -> &'static str {
        "snmp"
    }

    fn reload(&self, config: Arc<GatewayConfig>) -> Result<(), ReloadError> {
        let previous = self.config.load();
        if previous.term != config.snmp.term && self.is_polling() {
            tracing::info!(
                old_term = previous.term,
                new_term = config.snmp.term,
                "SNMP polling interval changes take effect on restart"
            );
        }
        self.config.store(Arc::new(config.snmp.clone()));
        tracing::info!(
            targets = config.snmp.targets.len(),
            generation = config.generation,
            "SNMP configuration swapped"
        );
        Ok(())
    }
}
