//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse & deserialize, stamp generation)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change, debounces 500 ms
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → reload.rs pushes Arc<GatewayConfig> to every Reloadable
//!     → each subsystem swaps its live state atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A failed reload keeps the previous configuration in force

pub mod loader;
pub mod reload;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use reload::{ReloadError, Reloadable};
pub use schema::{
    CoapConfig, EndpointConfig, GatewayConfig, KafkaConfig, MqttConfig, ObservabilityConfig, ResponseConfig,
    RestConfig, SnmpConfig, SnmpTrapConfig, UsmConfig,
};
pub use watcher::ConfigWatcher;
