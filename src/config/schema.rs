//! Configuration schema definitions.
//!
//! This module defines the complete configuration document for the gateway.
//! All types derive Serde traits for deserialization from YAML or TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the ingestion gateway.
///
/// Loaded wholesale and never mutated afterwards; a reload replaces the
/// whole value.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Load generation, stamped by the loader. Not part of the document.
    #[serde(skip)]
    pub generation: u64,

    /// Relational store connection settings.
    pub database: DatabaseConfig,

    /// HTTP listener and its declarative endpoints.
    pub rest: RestConfig,

    /// CoAP listener and its declarative endpoints.
    pub coap: CoapConfig,

    /// Durable log (Kafka) brokers.
    pub kafka: KafkaConfig,

    /// MQTT subscription settings.
    pub mqtt: MqttConfig,

    /// SNMP polling (GET/WALK) settings.
    pub snmp: SnmpConfig,

    /// SNMP trap receiver settings.
    pub snmp_trap: SnmpTrapConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string (URL or key/value form).
    pub connection_string: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestConfig {
    pub host: String,
    pub port: u16,

    /// Declarative endpoints served by the HTTP dispatcher.
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            endpoints: Vec::new(),
        }
    }
}

impl RestConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// CoAP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoapConfig {
    pub host: String,
    pub port: u16,

    /// Declarative endpoints served by the CoAP dispatcher.
    pub endpoints: Vec<EndpointConfig>,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5683,
            endpoints: Vec::new(),
        }
    }
}

impl CoapConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One declarative route.
///
/// The unique key is transport + path + method.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Path pattern, e.g. `/sensor/{id}`.
    pub path: String,

    /// Request method (case-insensitive in the document).
    pub method: String,

    /// Response returned for every matching request.
    #[serde(default)]
    pub response: ResponseConfig,
}

/// Response returned by a declarative endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status code. HTTP status for REST endpoints; for CoAP either a raw
    /// CoAP code byte (e.g. 69 = 2.05) or an HTTP status that gets mapped.
    pub status: u16,

    /// Body template. `{{.name}}` expands path variables and `{{.timestamp}}`.
    pub body: String,

    /// Headers written before the status line.
    pub headers: BTreeMap<String, String>,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
}

/// MQTT subscription configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address, e.g. `tcp://localhost:1883`. Empty disables MQTT.
    pub broker: String,

    pub client_id: String,

    /// Topic filter to subscribe to.
    pub topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            client_id: "ingest-gateway".to_string(),
            topic: "#".to_string(),
        }
    }
}

/// SNMPv3 USM credentials, shared by the poller and the trap receiver.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct UsmConfig {
    pub username: String,
    pub auth_protocol: String,
    pub auth_passphrase: String,
    pub priv_protocol: String,
    pub priv_passphrase: String,
}

/// SNMP GET/WALK configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnmpConfig {
    /// Agent port used for every target.
    pub port: u16,

    /// Per-request timeout in seconds.
    pub timeout: u64,

    pub retries: u32,

    #[serde(flatten)]
    pub usm: UsmConfig,

    /// WALK polling interval in seconds. Zero or negative disables polling.
    pub term: i64,

    /// Agents walked on every tick.
    pub targets: Vec<String>,

    /// Root OID of the scheduled walk.
    pub root_oid: String,

    /// Persist SNMP results to the store as well as the log.
    pub persist: bool,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: 161,
            timeout: 5,
            retries: 1,
            usm: UsmConfig::default(),
            term: 0,
            targets: Vec::new(),
            root_oid: "1.3.6.1.2.1".to_string(),
            persist: true,
        }
    }
}

/// SNMP trap receiver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnmpTrapConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,

    /// Engine ID of the sending agents. SNMPv3 notifications that are not
    /// informs are only accepted when it is set.
    pub engine_id: String,

    #[serde(flatten)]
    pub usm: UsmConfig,
}

impl Default for SnmpTrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "0.0.0.0".to_string(),
            port: 162,
            engine_id: String::new(),
            usm: UsmConfig::default(),
        }
    }
}

impl SnmpTrapConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `pretty` or `json`.
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}
