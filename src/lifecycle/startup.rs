//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration, then install tracing from it
//! - Connect the Store and the Log, install the metrics recorder
//! - Build both dispatchers, the MQTT subscriber and the SNMP subsystem
//! - Start the config watcher and bind the HTTP and CoAP listeners
//! - Tear everything down in reverse once shutdown is triggered
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, UdpSocket};

use crate::coap::CoapServer;
use crate::config::{load_config, ConfigWatcher, Reloadable};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::mqtt::MqttSubscriber;
use crate::observability::{logging, metrics};
use crate::pipeline::{Pipeline, PipelineTimeouts};
use crate::routing::{Dispatcher, Transport};
use crate::sink::{KafkaPublisher, LogPublisher, PgStore, Store};
use crate::snmp::{NetSnmp, SnmpClient, TrapServer};

/// Run the gateway from the configuration file at `config_path` until a
/// shutdown signal arrives.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Arc::new(
        load_config(config_path).with_context(|| format!("loading configuration from {}", config_path.display()))?,
    );

    logging::init_tracing(&config.observability).context("installing tracing subscriber")?;
    tracing::info!(
        path = %config_path.display(),
        generation = config.generation,
        http_endpoints = config.rest.endpoints.len(),
        coap_endpoints = config.coap.endpoints.len(),
        "Configuration loaded"
    );

    // Sinks
    let store = Arc::new(
        PgStore::connect(&config.database.connection_string)
            .await
            .context("connecting to database")?,
    );
    store.setup_tables().await.context("creating database tables")?;

    let timeouts = PipelineTimeouts::default();
    let log = Arc::new(KafkaPublisher::new(&config.kafka.brokers, timeouts.publish).context("creating Kafka producer")?);

    let prometheus = metrics::install_recorder().context("installing metrics recorder")?;

    let shutdown = Shutdown::new();
    let pool_monitor = store.spawn_pool_monitor(shutdown.subscribe());

    let pipeline = Arc::new(
        Pipeline::new(store.clone() as Arc<dyn Store>, log.clone() as Arc<dyn LogPublisher>).with_timeouts(timeouts),
    );

    // Dispatchers
    let http_dispatcher = Arc::new(Dispatcher::new(Transport::Http, &config, pipeline.clone()).context("building HTTP routes")?);
    let coap_dispatcher = Arc::new(Dispatcher::new(Transport::Coap, &config, pipeline.clone()).context("building CoAP routes")?);

    // MQTT
    let mqtt_task = if config.mqtt.broker.is_empty() {
        tracing::info!("MQTT broker not configured, subscriber disabled");
        None
    } else {
        let subscriber = MqttSubscriber::new(&config.mqtt, pipeline.clone()).context("configuring MQTT subscriber")?;
        Some(tokio::spawn(subscriber.run(shutdown.subscribe())))
    };

    // SNMP
    let net_snmp = Arc::new(NetSnmp::new());
    let snmp = Arc::new(SnmpClient::new(&config.snmp, net_snmp.clone(), pipeline.clone()));
    snmp.start_scheduler();
    let traps = TrapServer::new(&config, net_snmp, pipeline.clone());
    traps.start();

    // Hot reload
    let reloadables: Vec<Arc<dyn Reloadable>> = vec![
        http_dispatcher.clone() as Arc<dyn Reloadable>,
        coap_dispatcher.clone() as Arc<dyn Reloadable>,
        snmp.clone() as Arc<dyn Reloadable>,
    ];
    let watcher = ConfigWatcher::new(config_path, config.clone(), reloadables);
    watcher.start().context("starting config watcher")?;

    // Listeners
    let http_listener = TcpListener::bind(config.rest.bind_address())
        .await
        .with_context(|| format!("binding HTTP listener on {}", config.rest.bind_address()))?;
    let coap_socket = UdpSocket::bind(config.coap.bind_address())
        .await
        .with_context(|| format!("binding CoAP socket on {}", config.coap.bind_address()))?;

    let http = HttpServer::new(AppState {
        dispatcher: http_dispatcher,
        snmp: Some(snmp.clone()),
        metrics: prometheus,
    });
    let http_task = tokio::spawn(http.run(http_listener, shutdown.subscribe()));
    let coap_task = tokio::spawn(CoapServer::new(coap_dispatcher).run(coap_socket, shutdown.subscribe()));

    signals::spawn_signal_listener(shutdown.clone());
    let mut stopped = shutdown.subscribe();
    stopped.recv().await;

    // Shutdown runs in reverse.
    match http_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }
    match coap_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "CoAP server error"),
        Err(e) => tracing::error!(error = %e, "CoAP server task failed"),
        Ok(Ok(())) => {}
    }

    watcher.stop();
    traps.stop().await;
    snmp.stop().await;
    if let Some(task) = mqtt_task {
        let _ = task.await;
    }

    log.close().await;
    let _ = pool_monitor.await;
    store.close().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
