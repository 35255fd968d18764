//! `POST /api/snmp/get`: on-demand SNMP GET.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::http::server::AppState;

pub const SNMP_GET_PATH: &str = "/api/snmp/get";

#[derive(Debug, Deserialize)]
pub struct SnmpGetRequest {
    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub oids: Vec<String>,
}

pub async fn snmp_get_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(snmp) = state.snmp.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "error": "SNMP client not initialized"})),
        )
            .into_response();
    };

    let request: SnmpGetRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid request body").into_response(),
    };

    if request.target.is_empty() || request.oids.is_empty() {
        return (StatusCode::BAD_REQUEST, "Target and OIDs are required").into_response();
    }

    match snmp.get(&request.target, &request.oids).await {
        Ok(_) => Json(json!({
            "status": "success",
            "message": "SNMP GET operation completed",
            "target": request.target,
            "oids": request.oids,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(target = %request.target, error = %e, "SNMP GET error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "error": e.to_string()})),
            )
                .into_response()
        }
    }
}
