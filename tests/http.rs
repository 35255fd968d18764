//! Black-box tests of the HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ingest_gateway::http::{AppState, HttpServer};
use ingest_gateway::lifecycle::Shutdown;
use ingest_gateway::routing::{Dispatcher, Transport};
use ingest_gateway::sink::StoreRow;
use ingest_gateway::snmp::{SnmpClient, SnmpTransport};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;

const CONFIG: &str = r#"
rest:
  endpoints:
    - path: /device/{id}
      method: GET
      response:
        status: 200
        headers:
          Content-Type: application/json
        body: '{"id": {{.id}}, "name": "{{.name}}"}'
    - path: /sensor/{id}
      method: POST
      response:
        status: 201
        body: accepted {{.id}}
snmp:
  username: monitor
  auth_protocol: SHA
  auth_passphrase: secret-auth
"#;

struct Gateway {
    addr: SocketAddr,
    harness: common::Harness,
    snmp: Arc<common::FakeSnmp>,
    shutdown: Shutdown,
}

async fn start_gateway(with_snmp: bool) -> Gateway {
    let harness = common::harness();
    let config = common::config(CONFIG);
    let dispatcher = Arc::new(Dispatcher::new(Transport::Http, &config, harness.pipeline.clone()).unwrap());

    let fake = Arc::new(common::FakeSnmp::default());
    let snmp = with_snmp.then(|| {
        Arc::new(SnmpClient::new(
            &config.snmp,
            fake.clone() as Arc<dyn SnmpTransport>,
            harness.pipeline.clone(),
        ))
    });

    let server = HttpServer::new(AppState {
        dispatcher,
        snmp,
        metrics: PrometheusBuilder::new().build_recorder().handle(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    Gateway {
        addr,
        harness,
        snmp: fake,
        shutdown,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_numeric_path_variable_renders_as_number() {
    let gw = start_gateway(true).await;

    let res = client()
        .get(format!("http://{}/device/123", gw.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"id": 123, "name": "<no value>"}));

    // GET never ingests.
    assert!(gw.harness.store.rows().is_empty());
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_post_replies_and_ingests() {
    let gw = start_gateway(true).await;

    let res = client()
        .post(format!("http://{}/sensor/7", gw.addr))
        .json(&json!({"temp": 21}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "accepted 7");

    let store = gw.harness.store.clone();
    assert!(common::eventually(Duration::from_secs(2), || store.rows().len() == 1).await);
    let StoreRow::ClientData { url, data, .. } = &store.rows()[0] else {
        panic!("expected client data row");
    };
    assert_eq!(url, "/sensor/7");
    assert_eq!(serde_json::from_str::<Value>(data).unwrap(), json!({"temp": 21, "id": "7"}));

    let log = gw.harness.log.clone();
    assert!(common::eventually(Duration::from_secs(2), || log.published().len() == 1).await);
    assert_eq!(log.published()[0].0, "bz.sensor.7");
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_encoded_path_variable_is_decoded() {
    let gw = start_gateway(true).await;

    let res = client()
        .post(format!("http://{}/sensor/a%20b", gw.addr))
        .json(&json!({"t": 1}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "accepted a b");

    let store = gw.harness.store.clone();
    assert!(common::eventually(Duration::from_secs(2), || store.rows().len() == 1).await);
    let StoreRow::ClientData { data, parameters, .. } = &store.rows()[0] else {
        panic!("expected client data row");
    };
    assert_eq!(serde_json::from_str::<Value>(data).unwrap(), json!({"t": 1, "id": "a b"}));
    assert_eq!(serde_json::from_str::<Value>(parameters).unwrap(), json!({"id": "a b"}));
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_post_with_non_object_body_is_not_ingested() {
    let gw = start_gateway(true).await;

    let res = client()
        .post(format!("http://{}/sensor/8", gw.addr))
        .body("[1, 2, 3]")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(gw.harness.store.rows().is_empty());
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let gw = start_gateway(true).await;
    let client = client();

    let res = client.get(format!("http://{}/nope", gw.addr)).send().await.unwrap();
    assert_eq!(res.status(), 404);

    let res = client
        .delete(format!("http://{}/device/1", gw.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let gw = start_gateway(true).await;

    let res = client()
        .get(format!("http://{}/metrics", gw.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert!(res.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_snmp_get_success() {
    let gw = start_gateway(true).await;

    let res = client()
        .post(format!("http://{}/api/snmp/get", gw.addr))
        .json(&json!({"target": "10.0.0.1", "oids": [".1.3.6.1.2.1.1.5.0"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({
            "status": "success",
            "message": "SNMP GET operation completed",
            "target": "10.0.0.1",
            "oids": [".1.3.6.1.2.1.1.5.0"],
        })
    );

    let sessions = gw.snmp.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].target, "10.0.0.1");
    assert_eq!(sessions[0].security.level().as_str(), "authNoPriv");

    let published = gw.harness.log.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "snmp.get.bz.10.0.0.1");
    assert_eq!(published[0].1["results"][0]["type"], json!("OctetString"));
    assert_eq!(published[0].1["results"][0]["value"], json!("router-1"));
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_snmp_get_bad_requests() {
    let gw = start_gateway(true).await;
    let client = client();
    let url = format!("http://{}/api/snmp/get", gw.addr);

    let res = client.post(&url).body("not json").send().await.unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Invalid request body");

    let res = client
        .post(&url)
        .json(&json!({"target": "10.0.0.1", "oids": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert_eq!(res.text().await.unwrap(), "Target and OIDs are required");

    assert_eq!(gw.snmp.gets.load(std::sync::atomic::Ordering::SeqCst), 0);
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_snmp_get_agent_failure() {
    let gw = start_gateway(true).await;
    gw.snmp.fail_target("10.9.9.9");

    let res = client()
        .post(format!("http://{}/api/snmp/get", gw.addr))
        .json(&json!({"target": "10.9.9.9", "oids": [".1.3.6.1.2.1.1.5.0"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], json!("error"));
    assert!(body["error"].as_str().unwrap().contains("10.9.9.9"));
    assert!(gw.harness.log.published().is_empty());
    gw.shutdown.trigger();
}

#[tokio::test]
async fn test_snmp_get_without_client() {
    let gw = start_gateway(false).await;

    let res = client()
        .post(format!("http://{}/api/snmp/get", gw.addr))
        .json(&json!({"target": "10.0.0.1", "oids": [".1.3.6.1.2.1.1.5.0"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], json!("error"));
    gw.shutdown.trigger();
}
