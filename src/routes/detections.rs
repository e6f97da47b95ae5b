use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::protocol::DetectionEventPayload;
use crate::state::CoordinatorState;

#[derive(Debug, Deserialize)]
pub struct DetectionsQuery {
    pub limit: Option<usize>,
}

pub async fn list_detections(
    State(state): State<Arc<CoordinatorState>>,
    Query(query): Query<DetectionsQuery>,
) -> Json<Vec<DetectionEventPayload>> {
    Json(state.detections(query.limit.unwrap_or(50)))
}
