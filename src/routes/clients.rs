use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::ClientProfile;

pub async fn list_clients(State(state): State<Arc<CoordinatorState>>) -> Json<Vec<ClientProfile>> {
    Json(state.profiles())
}

pub async fn get_client(
    State(state): State<Arc<CoordinatorState>>,
    Path(id): Path<String>,
) -> Result<Json<ClientProfile>, StatusCode> {
    state.profile(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}
