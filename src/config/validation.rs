//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject malformed or conflicting endpoint definitions
//! - Validate value ranges (status codes, ports)
//! - Keep user endpoints off the gateway's fixed HTTP routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{EndpointConfig, GatewayConfig};
use crate::routing::router::EndpointRouter;

/// HTTP paths served by the gateway itself.
pub const RESERVED_HTTP_PATHS: &[&str] = &["/metrics", "/api/snmp/get"];

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];
const COAP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];

/// Upper bounds for SNMP timing values.
pub const MAX_SNMP_TIMEOUT_SECS: u64 = 300;
pub const MAX_SNMP_RETRIES: u32 = 10;
pub const MAX_SNMP_TERM_SECS: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{transport} endpoint path {path:?} must start with '/'")]
    InvalidPath { transport: &'static str, path: String },

    #[error("{transport} endpoint {path} uses unsupported method {method:?}")]
    InvalidMethod {
        transport: &'static str,
        path: String,
        method: String,
    },

    #[error("duplicate {transport} endpoint {method} {path}")]
    DuplicateEndpoint {
        transport: &'static str,
        path: String,
        method: String,
    },

    #[error("{transport} endpoint {method} {path} has invalid status {status}")]
    InvalidStatus {
        transport: &'static str,
        path: String,
        method: String,
        status: u16,
    },

    #[error("rest endpoint path {0} is reserved by the gateway")]
    ReservedPath(String),

    #[error("{transport} routing table rejected: {reason}")]
    RouteConflict { transport: &'static str, reason: String },

    #[error("snmp.root_oid must be set when snmp.term > 0")]
    MissingRootOid,

    #[error("snmp.timeout {0}s exceeds the maximum of {max}s", max = MAX_SNMP_TIMEOUT_SECS)]
    SnmpTimeoutTooLarge(u64),

    #[error("snmp.retries {0} exceeds the maximum of {max}", max = MAX_SNMP_RETRIES)]
    SnmpRetriesTooLarge(u32),

    #[error("snmp.term {0}s exceeds the maximum of {max}s", max = MAX_SNMP_TERM_SECS)]
    SnmpTermTooLarge(i64),

    #[error("snmp_trap.port must be non-zero when the trap receiver is enabled")]
    TrapPortZero,

    #[error("unknown log format {0:?} (expected \"pretty\" or \"json\")")]
    UnknownLogFormat(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_endpoints("rest", &config.rest.endpoints, HTTP_METHODS, http_status_ok, &mut errors);
    validate_endpoints("coap", &config.coap.endpoints, COAP_METHODS, coap_status_ok, &mut errors);

    for endpoint in &config.rest.endpoints {
        if RESERVED_HTTP_PATHS.contains(&endpoint.path.as_str()) {
            errors.push(ValidationError::ReservedPath(endpoint.path.clone()));
        }
    }

    if config.snmp.term > 0 && config.snmp.root_oid.trim().is_empty() {
        errors.push(ValidationError::MissingRootOid);
    }

    if config.snmp.timeout > MAX_SNMP_TIMEOUT_SECS {
        errors.push(ValidationError::SnmpTimeoutTooLarge(config.snmp.timeout));
    }
    if config.snmp.retries > MAX_SNMP_RETRIES {
        errors.push(ValidationError::SnmpRetriesTooLarge(config.snmp.retries));
    }
    if config.snmp.term > MAX_SNMP_TERM_SECS {
        errors.push(ValidationError::SnmpTermTooLarge(config.snmp.term));
    }

    if config.snmp_trap.enabled && config.snmp_trap.port == 0 {
        errors.push(ValidationError::TrapPortZero);
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::UnknownLogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_endpoints(
    transport: &'static str,
    endpoints: &[EndpointConfig],
    methods: &[&str],
    status_ok: fn(u16) -> bool,
    errors: &mut Vec<ValidationError>,
) {
    let before = errors.len();
    let mut seen = HashSet::new();

    for endpoint in endpoints {
        let method = endpoint.method.to_ascii_uppercase();

        if !endpoint.path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                transport,
                path: endpoint.path.clone(),
            });
        }

        if !methods.contains(&method.as_str()) {
            errors.push(ValidationError::InvalidMethod {
                transport,
                path: endpoint.path.clone(),
                method: endpoint.method.clone(),
            });
        }

        if !seen.insert((endpoint.path.clone(), method.clone())) {
            errors.push(ValidationError::DuplicateEndpoint {
                transport,
                path: endpoint.path.clone(),
                method: method.clone(),
            });
        }

        if !status_ok(endpoint.response.status) {
            errors.push(ValidationError::InvalidStatus {
                transport,
                path: endpoint.path.clone(),
                method,
                status: endpoint.response.status,
            });
        }
    }

    // Pattern conflicts are only meaningful once individual paths are sane.
    if errors.len() == before {
        if let Err(e) = EndpointRouter::build(endpoints) {
            errors.push(ValidationError::RouteConflict {
                transport,
                reason: e.to_string(),
            });
        }
    }
}

fn http_status_ok(status: u16) -> bool {
    (100..=599).contains(&status)
}

/// Raw CoAP codes (2.01 = 65 .. 5.05 = 165) or HTTP statuses mapped later.
fn coap_status_ok(status: u16) -> bool {
    (64..=191).contains(&status) || (200..=599).contains(&status)
}
