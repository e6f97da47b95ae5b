use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::TrustScore;

pub async fn list_trust_scores(State(state): State<Arc<CoordinatorState>>) -> Json<Vec<TrustScore>> {
    Json(state.trust_scores())
}

pub async fn get_trust_score(
    State(state): State<Arc<CoordinatorState>>,
    Path(id): Path<String>,
) -> Result<Json<TrustScore>, StatusCode> {
    state.trust_score(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}
