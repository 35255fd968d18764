//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Generation handed to the next successfully loaded document.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Toml(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML parse error: {}", e),
            ConfigError::Toml(e) => write!(f, "TOML parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Document syntax, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Load and validate configuration from a YAML or TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Parse and validate an in-memory document, stamping a fresh generation.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(ConfigError::Yaml)?,
        ConfigFormat::Toml => toml::from_str(content).map_err(ConfigError::Toml)?,
    };

    validate_config(&config).map_err(ConfigError::Validation)?;

    config.generation = NEXT_GENERATION.fetch_add(1, Ordering::SeqCst);
    Ok(config)
}
