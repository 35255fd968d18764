//! Telemetry ingestion gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP ──┐                                    ┌──▶ PostgreSQL (Store)
//!   CoAP ──┼─▶ Dispatcher ─┐                    │
//!   MQTT ──┼───────────────┼─▶ Pipeline ─ merge ┤
//!   SNMP ──┴───────────────┘                    └──▶ Kafka (Log)
//!
//!   config file ─▶ ConfigWatcher ─▶ dispatchers, SNMP (hot reload)
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ingest-gateway", version, about = "Telemetry ingestion gateway")]
struct Args {
    /// Path to the YAML or TOML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    ingest_gateway::lifecycle::run(&args.config).await
}
