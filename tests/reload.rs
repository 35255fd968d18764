//! Hot reload of declarative endpoints.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use ingest_gateway::config::watcher::DEBOUNCE;
use ingest_gateway::config::{load_config, ConfigWatcher, Reloadable};
use ingest_gateway::routing::{Dispatch, Dispatcher, Transport};

mod common;

fn endpoint_yaml(path: &str, marker: &str) -> String {
    format!(
        r#"
rest:
  endpoints:
    - path: {path}
      method: GET
      response:
        headers:
          X-Marker: "{marker}"
        body: "marker {marker}"
"#
    )
}

fn setup(dir: &Path, yaml: &str) -> (Arc<Dispatcher>, ConfigWatcher, std::path::PathBuf) {
    let path = dir.join("gateway.yaml");
    std::fs::write(&path, yaml).unwrap();

    let config = Arc::new(load_config(&path).unwrap());
    let h = common::harness();
    let dispatcher = Arc::new(Dispatcher::new(Transport::Http, &config, h.pipeline).unwrap());
    let watcher = ConfigWatcher::new(&path, config, vec![dispatcher.clone() as Arc<dyn Reloadable>]);
    (dispatcher, watcher, path)
}

fn matches(dispatcher: &Dispatcher, path: &str) -> bool {
    matches!(dispatcher.dispatch("GET", path, &Bytes::new()), Dispatch::Reply(_))
}

#[tokio::test]
async fn test_reload_swaps_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/old", "1"));
    let first = watcher.current().generation;
    assert!(matches(&dispatcher, "/old"));

    std::fs::write(&path, endpoint_yaml("/new/{id}", "2")).unwrap();
    let reloaded = watcher.reload_now().await.unwrap();

    assert!(reloaded.generation > first);
    assert_eq!(dispatcher.snapshot().generation, reloaded.generation);
    assert!(matches(&dispatcher, "/new/5"));
    assert!(!matches(&dispatcher, "/old"));
}

#[tokio::test]
async fn test_unparsable_document_keeps_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/stable", "1"));
    let generation = dispatcher.snapshot().generation;

    std::fs::write(&path, "rest: [endpoints: {").unwrap();
    assert!(watcher.reload_now().await.is_err());

    assert!(matches(&dispatcher, "/stable"));
    assert_eq!(dispatcher.snapshot().generation, generation);
    assert_eq!(watcher.current().generation, generation);
}

#[tokio::test]
async fn test_invalid_document_keeps_routes() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/stable", "1"));

    let duplicated = r#"
rest:
  endpoints:
    - path: /dup
      method: GET
    - path: /dup
      method: get
"#;
    std::fs::write(&path, duplicated).unwrap();
    assert!(watcher.reload_now().await.is_err());

    assert!(matches(&dispatcher, "/stable"));
    assert!(!matches(&dispatcher, "/dup"));
}

#[tokio::test]
async fn test_file_change_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/before", "1"));
    watcher.start().unwrap();

    // Let the watcher settle before editing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(&path, endpoint_yaml("/after", "2")).unwrap();

    let d = dispatcher.clone();
    assert!(common::eventually(Duration::from_secs(5), || matches(&d, "/after")).await);
    assert!(!matches(&dispatcher, "/before"));
    watcher.stop();
}

#[tokio::test]
async fn test_stop_discards_pending_change() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/before", "1"));
    let generation = watcher.current().generation;
    watcher.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    std::fs::write(&path, endpoint_yaml("/after", "2")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    watcher.stop();

    tokio::time::sleep(DEBOUNCE * 3).await;
    assert_eq!(watcher.current().generation, generation);
    assert_eq!(dispatcher.snapshot().generation, generation);
    assert!(matches(&dispatcher, "/before"));
    assert!(!matches(&dispatcher, "/after"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_requests_see_a_single_generation_during_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, watcher, path) = setup(dir.path(), &endpoint_yaml("/gen", "0"));
    let watcher = Arc::new(watcher);
    let done = Arc::new(AtomicBool::new(false));

    let reloader = {
        let watcher = watcher.clone();
        let done = done.clone();
        tokio::spawn(async move {
            for i in 1..=40 {
                std::fs::write(&path, endpoint_yaml("/gen", &i.to_string())).unwrap();
                watcher.reload_now().await.unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let dispatcher = dispatcher.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut checked = 0usize;
            loop {
                match dispatcher.dispatch("GET", "/gen", &Bytes::new()) {
                    Dispatch::Reply(reply) => {
                        let marker = &reply.headers["X-Marker"];
                        assert_eq!(reply.body, format!("marker {marker}"));
                        checked += 1;
                    }
                    other => panic!("route vanished during reload: {other:?}"),
                }
                if done.load(Ordering::SeqCst) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            checked
        }));
    }

    reloader.await.unwrap();
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(dispatcher.snapshot().generation, watcher.current().generation);
}
