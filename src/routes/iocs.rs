use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::{IntelStatus, IocType, ThreatIntel, ThreatLevel};

#[derive(Debug, Deserialize)]
pub struct IocQuery {
    pub status: Option<IntelStatus>,
    #[serde(rename = "type")]
    pub ioc_type: Option<IocType>,
    pub threat_level: Option<ThreatLevel>,
}

pub async fn list_iocs(
    State(state): State<Arc<CoordinatorState>>,
    Query(query): Query<IocQuery>,
) -> Json<Vec<ThreatIntel>> {
    let mut rows = state.list_iocs(query.status);
    if let Some(ioc_type) = query.ioc_type {
        rows.retain(|intel| intel.ioc.ioc_type == ioc_type);
    }
    if let Some(threat_level) = query.threat_level {
        rows.retain(|intel| intel.ioc.threat_level == threat_level);
    }
    Json(rows)
}

pub async fn get_ioc(
    State(state): State<Arc<CoordinatorState>>,
    Path(id): Path<String>,
) -> Result<Json<ThreatIntel>, StatusCode> {
    state.ioc_by_id(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}
