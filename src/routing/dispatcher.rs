//! Declarative endpoint dispatch shared by the HTTP and CoAP listeners.
//!
//! The routing table and template cache live together in one snapshot
//! behind an `ArcSwap`. A request loads the snapshot once, so everything it
//! observes comes from a single configuration generation even while a
//! reload swaps in the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Bytes;
use serde_json::{Map, Value};

use crate::config::reload::{ReloadError, Reloadable};
use crate::config::schema::{EndpointConfig, GatewayConfig};
use crate::pipeline::Pipeline;
use crate::routing::router::{EndpointRouter, RouteError, RouteMatch};
use crate::template::TemplateCache;

/// Field used to carry a CoAP body that is not a JSON object.
pub const COAP_RAW_FIELD: &str = "coapbody";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Coap,
}

impl Transport {
    pub fn name(self) -> &'static str {
        match self {
            Transport::Http => "http",
            Transport::Coap => "coap",
        }
    }

    fn endpoints(self, config: &GatewayConfig) -> &[EndpointConfig] {
        match self {
            Transport::Http => &config.rest.endpoints,
            Transport::Coap => &config.coap.endpoints,
        }
    }
}

/// Routing table and template cache of one configuration generation.
#[derive(Debug)]
pub struct RoutingSnapshot {
    pub generation: u64,
    pub router: EndpointRouter,
    pub templates: TemplateCache,
}

impl RoutingSnapshot {
    fn build(transport: Transport, config: &GatewayConfig) -> Result<Self, RouteError> {
        Ok(Self {
            generation: config.generation,
            router: EndpointRouter::build(transport.endpoints(config))?,
            templates: TemplateCache::new(),
        })
    }
}

/// Response produced from an endpoint's configured response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Reply(Reply),
    MethodNotAllowed,
    NotFound,
}

pub struct Dispatcher {
    transport: Transport,
    snapshot: ArcSwap<RoutingSnapshot>,
    pipeline: Arc<Pipeline>,
}

impl Dispatcher {
    pub fn new(transport: Transport, config: &GatewayConfig, pipeline: Arc<Pipeline>) -> Result<Self, RouteError> {
        let snapshot = RoutingSnapshot::build(transport, config)?;
        tracing::info!(
            transport = transport.name(),
            endpoints = snapshot.router.len(),
            generation = snapshot.generation,
            "Endpoint routes registered"
        );
        Ok(Self {
            transport,
            snapshot: ArcSwap::from_pointee(snapshot),
            pipeline,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.snapshot.load_full()
    }

    /// Route one request and render its configured response.
    ///
    /// A POST whose body is accepted for ingestion is handed to the pipeline
    /// on a spawned task; the reply never waits for it.
    pub fn dispatch(&self, method: &str, path: &str, body: &Bytes) -> Dispatch {
        let snapshot = self.snapshot.load_full();

        let (endpoint, vars) = match snapshot.router.lookup(method, path) {
            RouteMatch::Matched { endpoint, vars } => (endpoint, vars),
            RouteMatch::MethodNotAllowed => return Dispatch::MethodNotAllowed,
            RouteMatch::NotFound => return Dispatch::NotFound,
        };

        if method.eq_ignore_ascii_case("POST") {
            self.spawn_ingest(method, path, body, &vars);
        }

        Dispatch::Reply(Reply {
            status: endpoint.response.status,
            headers: endpoint.response.headers.clone(),
            body: snapshot.templates.render(&endpoint.response.body, &vars),
            generation: snapshot.generation,
        })
    }

    fn spawn_ingest(&self, method: &str, path: &str, body: &Bytes, vars: &BTreeMap<String, String>) {
        let pipeline = self.pipeline.clone();
        let path = path.to_string();
        let vars = vars.clone();

        match self.transport {
            Transport::Http => {
                let Some(fields) = json_object(body) else {
                    tracing::debug!(path = %path, "Body is not a JSON object, not ingesting");
                    return;
                };
                tokio::spawn(async move {
                    if let Err(e) = pipeline.ingest(&path, fields, vars).await {
                        tracing::error!(path = %path, error = %e, durable = e.is_durable(), "HTTP ingestion failed");
                    }
                });
            }
            Transport::Coap => {
                let raw = String::from_utf8_lossy(body).into_owned();
                let fields = json_object(body).unwrap_or_else(|| {
                    let mut wrapped = Map::new();
                    wrapped.insert(COAP_RAW_FIELD.to_string(), Value::String(raw.clone()));
                    wrapped
                });
                let method = method.to_ascii_uppercase();
                tokio::spawn(async move {
                    if let Err(e) = pipeline.ingest_coap(&path, &method, &raw, fields, vars).await {
                        tracing::error!(path = %path, error = %e, durable = e.is_durable(), "CoAP ingestion failed");
                    }
                });
            }
        }
    }
}

fn json_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

impl Reloadable for Dispatcher {
    fn name(&self) -> &'static str {
        match self.transport {
            Transport::Http => "http-dispatcher",
            Transport::Coap => "coap-dispatcher",
        }
    }

    fn reload(&self, config: Arc<GatewayConfig>) -> Result<(), ReloadError> {
        let snapshot = RoutingSnapshot::build(self.transport, &config)?;
        tracing::info!(
            transport = self.transport.name(),
            endpoints = snapshot.router.len(),
            generation = snapshot.generation,
            "Endpoint routes swapped"
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }
}
