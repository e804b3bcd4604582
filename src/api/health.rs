use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: reports how many app services are provisioned.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let response = HealthResponse { status: "ok".to_string(), services: state.registry.len() };
    (StatusCode::OK, Json(response))
}
