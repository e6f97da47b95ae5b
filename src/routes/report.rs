use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::CoordinatorState;
use crate::{Ioc, IocType, ThreatIntel, ThreatLevel};

#[derive(Debug, Deserialize)]
pub struct IocInput {
    pub ioc_type: IocType,
    pub value: String,
    pub threat_level: ThreatLevel,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportThreatRequest {
    pub client_id: String,
    pub ioc: IocInput,
}

#[derive(Debug, Serialize)]
pub struct ReportThreatResponse {
    pub status: &'static str,
    pub intel: ThreatIntel,
}

pub async fn report_threat(
    State(state): State<Arc<CoordinatorState>>,
    Json(request): Json<ReportThreatRequest>,
) -> Result<(StatusCode, Json<ReportThreatResponse>), StatusCode> {
    let ioc = Ioc::new(
        request.ioc.ioc_type,
        request.ioc.value,
        request.ioc.threat_level,
        request.client_id,
        request.ioc.metadata,
    );
    let ioc_id = ioc.ioc_id.clone();

    let promoted = state.report_ioc(ioc).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let (status, intel) = match promoted {
        Some(intel) => ("verified", intel),
        None => {
            let pending = state.ioc_by_id(&ioc_id).ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
            ("pending", pending)
        }
    };

    Ok((StatusCode::OK, Json(ReportThreatResponse { status, intel })))
}
