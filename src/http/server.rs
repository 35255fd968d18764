//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the fixed routes and the endpoint fallback
//! - Wire up middleware (tracing, timeout, request ID)
//! - Read bodies up to 10 MiB and hand requests to the dispatcher
//! - Bind server to listener and drain on shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::http::request::{request_id, UuidRequestId};
use crate::http::snmp_api::{snmp_get_handler, SNMP_GET_PATH};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::{Dispatch, Dispatcher, Reply};
use crate::snmp::SnmpClient;

/// Largest request body read before answering 413.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub snmp: Option<Arc<SnmpClient>>,
    pub metrics: PrometheusHandle,
}

/// HTTP listener for declarative endpoints.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route(SNMP_GET_PATH, post(snmp_get_handler))
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serve a declarative endpoint.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %e, "Request body rejected");
            metrics::record_request("http", &method, 413, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let response = match state.dispatcher.dispatch(&method, &path, &body) {
        Dispatch::Reply(reply) => {
            tracing::debug!(request_id = %request_id, path = %path, generation = reply.generation, "Endpoint matched");
            reply_response(reply)
        }
        Dispatch::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response(),
        Dispatch::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
    };

    metrics::record_request("http", &method, response.status().as_u16(), start);
    response
}

/// Headers first, then status, then the rendered body.
fn reply_response(reply: Reply) -> Response {
    let mut response = Response::new(Body::from(reply.body));

    for (name, value) in &reply.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => tracing::warn!(header = %name, "Skipping invalid configured header"),
        }
    }

    *response.status_mut() = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::schema::GatewayConfig;
    use crate::pipeline::Pipeline;
    use crate::routing::Transport;
    use crate::sink::{LogPublisher, PublishError, Store, StoreError, StoreRow};

    struct Discard;

    #[async_trait]
    impl Store for Discard {
        async fn insert(&self, _row: &StoreRow) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[async_trait]
    impl LogPublisher for Discard {
        async fn publish(&self, _topic: &str, _record: &Value) -> Result<(), PublishError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn router() -> Router {
        let pipeline = Arc::new(Pipeline::new(Arc::new(Discard), Arc::new(Discard)));
        let dispatcher = Dispatcher::new(Transport::Http, &GatewayConfig::default(), pipeline).unwrap();
        HttpServer::build_router(AppState {
            dispatcher: Arc::new(dispatcher),
            snmp: None,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        })
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/anything")
            .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_body_at_limit_is_read() {
        let request = Request::builder()
            .method("POST")
            .uri("/anything")
            .body(Body::from(vec![b'x'; MAX_BODY_BYTES]))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_reply_response_applies_headers_and_status() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("bad header".to_string(), "x".to_string());

        let response = reply_response(Reply {
            status: 201,
            headers,
            body: "{}".into(),
            generation: 1,
        });

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers().len(), 1);
    }
}
