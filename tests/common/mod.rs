//! Shared fakes and helpers for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ingest_gateway::config::loader::{parse_config, ConfigFormat};
use ingest_gateway::config::GatewayConfig;
use ingest_gateway::pipeline::Pipeline;
use ingest_gateway::sink::{LogPublisher, PublishError, Store, StoreError, StoreRow};
use ingest_gateway::snmp::{SnmpError, SnmpSession, SnmpTransport, SnmpValue, VarBind};
use serde_json::Value;

/// In-memory Store that records every row.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoreRow>>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn rows(&self) -> Vec<StoreRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, row: &StoreRow) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}

/// In-memory Log that records every publish, optionally stalling or failing.
#[derive(Default)]
pub struct MemoryLog {
    published: Mutex<Vec<(String, Value)>>,
    delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl MemoryLog {
    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogPublisher for MemoryLog {
    async fn publish(&self, topic: &str, record: &Value) -> Result<(), PublishError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected("broker down".into()));
        }
        self.published.lock().unwrap().push((topic.to_string(), record.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// SNMP transport that answers from memory and counts calls.
#[derive(Default)]
pub struct FakeSnmp {
    pub gets: AtomicUsize,
    pub walks: AtomicUsize,
    walked: Mutex<Vec<(String, String)>>,
    sessions: Mutex<Vec<SnmpSession>>,
    fail_targets: Mutex<Vec<String>>,
}

impl FakeSnmp {
    pub fn walked(&self) -> Vec<(String, String)> {
        self.walked.lock().unwrap().clone()
    }

    pub fn sessions(&self) -> Vec<SnmpSession> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn fail_target(&self, target: &str) {
        self.fail_targets.lock().unwrap().push(target.to_string());
    }

    fn check(&self, session: &SnmpSession, operation: &'static str) -> Result<(), SnmpError> {
        self.sessions.lock().unwrap().push(session.clone());
        if self.fail_targets.lock().unwrap().contains(&session.target) {
            return Err(SnmpError::Timeout {
                operation,
                target: session.target.clone(),
                timeout: session.timeout,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SnmpTransport for FakeSnmp {
    async fn get(&self, session: &SnmpSession, oids: &[String]) -> Result<Vec<VarBind>, SnmpError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(session, "get")?;
        Ok(oids
            .iter()
            .map(|oid| VarBind::new(oid.clone(), SnmpValue::OctetString(b"router-1".to_vec())))
            .collect())
    }

    async fn walk(&self, session: &SnmpSession, root_oid: &str) -> Result<Vec<VarBind>, SnmpError> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        self.walked
            .lock()
            .unwrap()
            .push((session.target.clone(), root_oid.to_string()));
        self.check(session, "walk")?;
        Ok(vec![VarBind::new(format!("{}.1.3.0", root_oid), SnmpValue::TimeTicks(4200))])
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub log: Arc<MemoryLog>,
    pub pipeline: Arc<Pipeline>,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let log = Arc::new(MemoryLog::default());
    let pipeline = Arc::new(Pipeline::new(
        store.clone() as Arc<dyn Store>,
        log.clone() as Arc<dyn LogPublisher>,
    ));
    Harness { store, log, pipeline }
}

pub fn config(yaml: &str) -> GatewayConfig {
    parse_config(yaml, ConfigFormat::Yaml).unwrap()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
