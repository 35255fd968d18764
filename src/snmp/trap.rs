//! Passive SNMP trap receiver.
//!
//! Each notification is processed through the shared result routine with
//! the sender's address as the source. Listener failures are logged and the
//! listener is not restarted. The bind address is read once at start.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::schema::GatewayConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::Pipeline;
use crate::snmp::results::{process_results, SnmpOperation};
use crate::snmp::security::SecurityParams;
use crate::snmp::transport::{Trap, TrapTransport};

const TRAP_QUEUE: usize = 256;

struct Running {
    shutdown: Shutdown,
    listener: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

pub struct TrapServer {
    enabled: bool,
    bind: String,
    engine_id: String,
    security: SecurityParams,
    persist: bool,
    transport: Arc<dyn TrapTransport>,
    pipeline: Arc<Pipeline>,
    running: Mutex<Option<Running>>,
}

impl TrapServer {
    pub fn new(config: &GatewayConfig, transport: Arc<dyn TrapTransport>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            enabled: config.snmp_trap.enabled,
            bind: config.snmp_trap.bind_address(),
            engine_id: config.snmp_trap.engine_id.clone(),
            security: SecurityParams::from_usm(&config.snmp_trap.usm),
            persist: config.snmp.persist,
            transport,
            pipeline,
            running: Mutex::new(None),
        }
    }

    /// Start the listener. Returns false when the receiver is disabled.
    pub fn start(&self) -> bool {
        if !self.enabled {
            tracing::info!("SNMP trap server is disabled");
            return false;
        }

        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return true;
        }

        let shutdown = Shutdown::new();
        let (trap_tx, trap_rx) = mpsc::channel(TRAP_QUEUE);

        let transport = self.transport.clone();
        let bind = self.bind.clone();
        let engine_id = self.engine_id.clone();
        let security = self.security.clone();
        let signal = shutdown.subscribe();
        let listener = tokio::spawn(async move {
            tracing::info!(bind = %bind, "Starting SNMP trap listener");
            if let Err(e) = transport.listen(&bind, &engine_id, &security, trap_tx, signal).await {
                tracing::error!(bind = %bind, error = %e, "SNMP trap listener error");
            }
        });

        let consumer = tokio::spawn(consume(trap_rx, self.pipeline.clone(), self.persist));

        *running = Some(Running {
            shutdown,
            listener,
            consumer,
        });
        true
    }

    /// Stop the listener and wait for queued traps to be handed off.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(running) = running {
            running.shutdown.trigger();
            let _ = running.listener.await;
            let _ = running.consumer.await;
            tracing::info!("SNMP trap listener stopped");
        }
    }
}

async fn consume(mut traps: mpsc::Receiver<Trap>, pipeline: Arc<Pipeline>, persist: bool) {
    while let Some(trap) = traps.recv().await {
        tracing::info!(source = %trap.source, bindings = trap.varbinds.len(), "Received SNMP trap");
        metrics::record_snmp("trap", true);

        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            process_results(&pipeline, SnmpOperation::Trap, &trap.source, &trap.varbinds, persist).await;
        });
    }
}
