//! REST read-API and WebSocket upgrade, composed into one `axum::Router`
//! over a shared `Arc<CoordinatorState>`.

pub mod clients;
pub mod detections;
pub mod health;
pub mod iocs;
pub mod report;
pub mod status;
pub mod sync;
pub mod trust;
pub mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::CoordinatorError;
use crate::state::CoordinatorState;

pub fn build_router(state: Arc<CoordinatorState>) -> Router {
    Router::new()
        .route("/api/status", get(status::get_status))
        .route("/api/clients", get(clients::list_clients))
        .route("/api/clients/:id", get(clients::get_client))
        .route("/api/iocs", get(iocs::list_iocs))
        .route("/api/iocs/:id", get(iocs::get_ioc))
        .route("/api/trust_scores", get(trust::list_trust_scores))
        .route("/api/trust_scores/:id", get(trust::get_trust_score))
        .route("/api/detections", get(detections::list_detections))
        .route("/api/intel/statistics", get(status::get_intel_statistics))
        .route("/api/report_threat", post(report::report_threat))
        .route("/api/sync_intel", get(sync::sync_intel))
        .route("/api/health", get(health::get_health))
        .route("/ws", get(ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Maps the coordinator's error taxonomy onto HTTP status codes for the
/// REST layer.
impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordinatorError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::UnregisteredClient(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::SessionClosed => StatusCode::BAD_REQUEST,
            CoordinatorError::Serialization(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::Config(_) | CoordinatorError::Store(_) | CoordinatorError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
