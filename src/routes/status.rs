use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::SystemStats;

pub async fn get_status(State(state): State<Arc<CoordinatorState>>) -> Json<SystemStats> {
    Json(state.system_stats())
}

pub async fn get_intel_statistics(
    State(state): State<Arc<CoordinatorState>>,
) -> Json<crate::aggregator::AggregatorStatistics> {
    Json(state.aggregator_statistics())
}
