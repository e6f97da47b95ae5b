use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::ThreatIntel;

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[allow(dead_code)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncIntelResponse {
    pub iocs: Vec<ThreatIntel>,
    pub server_time: DateTime<Utc>,
}

pub async fn sync_intel(
    State(state): State<Arc<CoordinatorState>>,
    Query(_query): Query<SyncQuery>,
) -> Json<SyncIntelResponse> {
    Json(SyncIntelResponse {
        iocs: state.verified_iocs(),
        server_time: Utc::now(),
    })
}
