//! Configuration file watcher for hot reload.
//!
//! Change notifications are debounced: every qualifying event re-arms a
//! single 500 ms timer and only the timer firing triggers a reload. Reloads
//! are serialized, so at most one is in flight.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::loader::{load_config, ConfigError};
use crate::config::reload::{propagate, Reloadable};
use crate::config::schema::GatewayConfig;
use crate::observability::metrics;

/// Quiet period after the last change event before reloading.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the configuration file and pushes validated documents to every
/// registered [`Reloadable`].
pub struct ConfigWatcher {
    inner: Arc<WatcherInner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct WatcherInner {
    path: PathBuf,
    current: ArcSwap<GatewayConfig>,
    reloadables: Vec<Arc<dyn Reloadable>>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, seeded with the configuration already in
    /// force.
    pub fn new(path: &Path, initial: Arc<GatewayConfig>, reloadables: Vec<Arc<dyn Reloadable>>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                path: path.to_path_buf(),
                current: ArcSwap::new(initial),
                reloadables,
                reload_lock: tokio::sync::Mutex::new(()),
            }),
            watcher: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Start watching the file's directory. Must be called inside a Tokio
    /// runtime.
    pub fn start(&self) -> Result<(), notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let file_name = self.inner.path.file_name().map(|name| name.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_config {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        // Editors replace files by rename, so watch the directory rather
        // than the file itself.
        let dir = watch_dir(&self.inner.path);
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let task = tokio::spawn(debounce_loop(self.inner.clone(), event_rx));

        *self.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(watcher);
        if let Some(old) = self.task.lock().unwrap_or_else(|e| e.into_inner()).replace(task) {
            old.abort();
        }

        tracing::info!(path = ?self.inner.path, dir = ?dir, "Config watcher started");
        Ok(())
    }

    /// Stop watching and cancel any pending reload timer.
    pub fn stop(&self) {
        self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        tracing::info!(path = ?self.inner.path, "Config watcher stopped");
    }

    /// The configuration currently in force.
    pub fn current(&self) -> Arc<GatewayConfig> {
        self.inner.current.load_full()
    }

    /// Reload immediately, bypassing the debounce timer.
    pub async fn reload_now(&self) -> Result<Arc<GatewayConfig>, ConfigError> {
        self.inner.reload().await
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

impl WatcherInner {
    async fn reload(&self) -> Result<Arc<GatewayConfig>, ConfigError> {
        let _guard = self.reload_lock.lock().await;

        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || load_config(&path))
            .await
            .map_err(|e| ConfigError::Io(std::io::Error::other(e)))
            .and_then(|result| result);

        let config = match loaded {
            Ok(config) => Arc::new(config),
            Err(e) => {
                metrics::record_config_reload(false);
                tracing::error!(
                    path = ?self.path,
                    error = %e,
                    "Failed to reload config. Keeping current configuration."
                );
                return Err(e);
            }
        };

        self.current.store(config.clone());
        let failures = propagate(&self.reloadables, &config);
        metrics::record_config_reload(failures == 0);

        tracing::info!(
            generation = config.generation,
            components = self.reloadables.len(),
            failures,
            "Configuration reloaded"
        );
        Ok(config)
    }
}

async fn debounce_loop(inner: Arc<WatcherInner>, mut events: mpsc::UnboundedReceiver<()>) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(()) => deadline = Some(Instant::now() + DEBOUNCE),
                None => break,
            },
            _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                tracing::info!(path = ?inner.path, "Config file change detected, reloading...");
                let _ = inner.reload().await;
            }
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_watch_dir_of_bare_file_name() {
        assert_eq!(watch_dir(Path::new("config.yaml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/etc/gw/config.yaml")), PathBuf::from("/etc/gw"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_coalesce_into_one_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "rest:\n  port: 9001\n").unwrap();

        let inner = Arc::new(WatcherInner {
            path: path.clone(),
            current: ArcSwap::new(Arc::new(GatewayConfig::default())),
            reloadables: Vec::new(),
            reload_lock: tokio::sync::Mutex::new(()),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(inner.clone(), rx));

        for _ in 0..5 {
            tx.send(()).unwrap();
            time::sleep(Duration::from_millis(100)).await;
        }
        // Still inside the quiet period of the last event.
        assert_eq!(inner.current.load().rest.port, 8080);

        drop(tx);
        task.await.unwrap();
        // The channel closed before the timer fired, so nothing reloaded.
        assert_eq!(inner.current.load().rest.port, 8080);
    }

    struct Counter(AtomicUsize);

    impl Reloadable for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn reload(&self, _config: Arc<GatewayConfig>) -> Result<(), crate::config::reload::ReloadError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_burst_triggers_single_reload_after_quiet_period() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "rest:\n  port: 9002\n").unwrap();

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let inner = Arc::new(WatcherInner {
            path: path.clone(),
            current: ArcSwap::new(Arc::new(GatewayConfig::default())),
            reloadables: vec![counter.clone() as Arc<dyn Reloadable>],
            reload_lock: tokio::sync::Mutex::new(()),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(inner.clone(), rx));

        for _ in 0..5 {
            tx.send(()).unwrap();
            time::sleep(Duration::from_millis(50)).await;
        }
        time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(inner.current.load().rest.port, 9002);

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "rest:\n  port: 9003\n").unwrap();

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let initial = Arc::new(GatewayConfig::default());
        let watcher = ConfigWatcher::new(&path, initial.clone(), vec![counter.clone() as Arc<dyn Reloadable>]);

        let (tx, rx) = mpsc::unbounded_channel();
        *watcher.task.lock().unwrap() = Some(tokio::spawn(debounce_loop(watcher.inner.clone(), rx)));

        tx.send(()).unwrap();
        time::sleep(Duration::from_millis(100)).await;
        watcher.stop();

        // Well past the quiet period the aborted timer would have used.
        time::sleep(DEBOUNCE * 3).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
        assert_eq!(watcher.current().generation, initial.generation);
        assert_eq!(watcher.current().rest.port, 8080);
        assert!(tx.send(()).is_err());
    }
}
