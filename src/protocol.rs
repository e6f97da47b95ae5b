//! Wire protocol: the `{ "event": ..., "data": ... }` envelope shared by
//! the WebSocket session layer, tagged by event name so one `serde_json`
//! call decodes or encodes either direction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClientStatus, Ioc, ThreatIntel};

/// A message sent by a client to the coordinator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    ClientRegister(ClientRegisterPayload),
    ClientHeartbeat(ClientHeartbeatPayload),
    IocReport(Ioc),
    DetectionEvent(DetectionEventPayload),
    SyncRequest(SyncRequestPayload),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegisterPayload {
    pub client_id: String,
    pub hostname: String,
    #[serde(default)]
    pub watch_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientHeartbeatPayload {
    pub client_id: String,
    pub status: ClientStatus,
    #[serde(default)]
    pub detections_local: Option<u32>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionEventPayload {
    pub client_id: String,
    pub ioc_id: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequestPayload {
    pub client_id: String,
}

/// A message sent by the coordinator to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum CoordinatorMessage {
    Registered { client_id: String, trust: f64 },
    SyncResponse { iocs: Vec<ThreatIntel>, server_time: DateTime<Utc> },
    IocBroadcast(ThreatIntel),
    TrustUpdate { client_id: String, trust: f64 },
    Error { message: String },
}
