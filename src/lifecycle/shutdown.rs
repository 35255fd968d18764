//! Shutdown coordination for the gateway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Every long-running task holds a [`ShutdownSignal`]. A signal obtained
/// after the trigger resolves immediately.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
            triggered: self.triggered.clone(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Number of tasks still holding a signal.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// One task's view of the shutdown signal.
pub struct ShutdownSignal {
    rx: broadcast::Receiver<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown has been triggered (or the coordinator is gone).
    pub async fn recv(&mut self) {
        if self.triggered.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.rx.recv().await;
    }
}
