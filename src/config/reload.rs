//! Components that accept a new configuration at runtime.

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::routing::router::RouteError;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to rebuild routing table: {0}")]
    Routing(#[from] RouteError),

    #[error("{0}")]
    Rejected(String),
}

/// A subsystem that swaps its live state when the configuration changes.
///
/// `reload` may run concurrently with traffic. Implementations build the new
/// state off to the side and publish it with a single atomic swap.
pub trait Reloadable: Send + Sync {
    fn name(&self) -> &'static str;

    fn reload(&self, config: Arc<GatewayConfig>) -> Result<(), ReloadError>;
}

/// Push `config` to every component. Returns how many rejected it.
///
/// A failure in one component is logged and does not stop the rest.
pub fn propagate(reloadables: &[Arc<dyn Reloadable>], config: &Arc<GatewayConfig>) -> usize {
    let mut failures = 0;
    for component in reloadables {
        match component.reload(config.clone()) {
            Ok(()) => {
                tracing::debug!(component = component.name(), generation = config.generation, "Component reloaded");
            }
            Err(e) => {
                failures += 1;
                tracing::error!(
                    component = component.name(),
                    generation = config.generation,
                    error = %e,
                    "Component rejected new configuration"
                );
            }
        }
    }
    failures
}
