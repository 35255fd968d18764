//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: &str) -> String {
    format!("ingest_gateway={},tower_http=info", level)
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init(),
        _ => registry.with(fmt::layer()).try_init(),
    }
}
