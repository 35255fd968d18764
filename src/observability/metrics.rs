//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): HTTP/CoAP requests by transport, method, status
//! - `gateway_request_duration_seconds` (histogram): dispatch latency
//! - `gateway_store_writes_total` / `gateway_store_write_duration_seconds`: per table and outcome
//! - `gateway_publishes_total` / `gateway_publish_duration_seconds`: Log publishes by outcome
//! - `gateway_mqtt_messages_total` (counter): MQTT messages received
//! - `gateway_snmp_operations_total` (counter): GET/WALK/TRAP by outcome
//! - `gateway_config_reloads_total` (counter): reloads by outcome
//! - `gateway_store_pool_connections` / `gateway_store_pool_idle` (gauges)

use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. The handle renders `GET /metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Record a dispatched HTTP or CoAP request.
pub fn record_request(transport: &'static str, method: &str, status: u16, start: Instant) {
    let latency = start.elapsed().as_secs_f64();

    counter!(
        "gateway_requests_total",
        "transport" => transport,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        "gateway_request_duration_seconds",
        "transport" => transport
    )
    .record(latency);
}

pub fn record_store(table: &'static str, ok: bool, start: Instant) {
    counter!("gateway_store_writes_total", "table" => table, "status" => outcome(ok)).increment(1);
    histogram!("gateway_store_write_duration_seconds", "table" => table).record(start.elapsed().as_secs_f64());
}

pub fn record_publish(ok: bool, start: Instant) {
    counter!("gateway_publishes_total", "status" => outcome(ok)).increment(1);
    histogram!("gateway_publish_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_mqtt_message() {
    counter!("gateway_mqtt_messages_total").increment(1);
}

pub fn record_snmp(operation: &'static str, ok: bool) {
    counter!("gateway_snmp_operations_total", "operation" => operation, "status" => outcome(ok)).increment(1);
}

pub fn record_config_reload(ok: bool) {
    counter!("gateway_config_reloads_total", "status" => outcome(ok)).increment(1);
}

pub fn set_store_pool(connections: f64, idle: f64) {
    gauge!("gateway_store_pool_connections").set(connections);
    gauge!("gateway_store_pool_idle").set(idle);
}
