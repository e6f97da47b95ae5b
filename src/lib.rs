//! Federated threat-intelligence coordinator.
//!
//! Aggregates IOC reports from many monitoring clients, decides which
//! reports are trustworthy enough to promote to verified indicators of
//! compromise, and fans verified IOCs back out to every connected client.

pub mod config;
pub mod error;
pub mod store;
pub mod trust;
pub mod aggregator;
pub mod protocol;
pub mod hub;
pub mod stats;
pub mod state;
pub mod routes;

pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, Result};
pub use trust::TrustManager;
pub use aggregator::IntelligenceAggregator;
pub use hub::Hub;
pub use stats::StatisticsProjector;
pub use state::CoordinatorState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Indicator type, closed per the federation's shared taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IocType {
    FileHash,
    IpAddress,
    Domain,
    Url,
    FileSignature,
    BehaviorPattern,
    RegistryKey,
    ProcessName,
}

impl IocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IocType::FileHash => "file_hash",
            IocType::IpAddress => "ip_address",
            IocType::Domain => "domain",
            IocType::Url => "url",
            IocType::FileSignature => "file_signature",
            IocType::BehaviorPattern => "behavior_pattern",
            IocType::RegistryKey => "registry_key",
            IocType::ProcessName => "process_name",
        }
    }
}

/// Severity, ordered info < low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Info => "info",
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

/// Lifecycle state of a `ThreatIntel` record. Monotone: pending can move to
/// verified or rejected; verified can move to expired; nothing regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelStatus {
    Pending,
    Verified,
    Rejected,
    Expired,
}

/// Live session state of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Online,
    Offline,
    Scanning,
    Syncing,
    Idle,
    Error,
}

/// Kind of trust-history event, for the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEventType {
    Initialized,
    Increased,
    Decreased,
    Decayed,
    Reset,
}

/// Kind of detection-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionAction {
    Reported,
    Replayed,
}

/// An indicator of compromise. `ioc_id` is a pure function of
/// `(ioc_type, value)`, so two clients reporting the same indicator
/// collide by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ioc {
    pub ioc_id: String,
    pub ioc_type: IocType,
    pub value: String,
    pub threat_level: ThreatLevel,
    pub source_client: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Ioc {
    /// Stable content address for `(ioc_type, value)`.
    pub fn compute_id(ioc_type: IocType, value: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ioc_type.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Build a new IOC, deriving `ioc_id` from type+value.
    pub fn new(
        ioc_type: IocType,
        value: String,
        threat_level: ThreatLevel,
        source_client: String,
        metadata: HashMap<String, String>,
    ) -> Self {
        let ioc_id = Self::compute_id(ioc_type, &value);
        Self {
            ioc_id,
            ioc_type,
            value,
            threat_level,
            source_client,
            metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Coordinator-side record wrapping an `Ioc` with consensus state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIntel {
    pub ioc: Ioc,
    pub verified_by: Vec<String>,
    pub trust_weight: f64,
    pub status: IntelStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub detection_count: u32,
}

/// Per-client reputation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustScore {
    pub client_id: String,
    pub trust_score: f64,
    pub accuracy_rate: f64,
    pub total_reports: u32,
    pub verified_reports: u32,
    pub rejected_reports: u32,
    pub false_positive_count: u32,
    pub contribution_count: u32,
    pub response_time_avg: f64,
    pub last_updated: DateTime<Utc>,
}

impl TrustScore {
    pub fn new(client_id: String, initial_trust: f64, now: DateTime<Utc>) -> Self {
        Self {
            client_id,
            trust_score: initial_trust,
            accuracy_rate: 0.0,
            total_reports: 0,
            verified_reports: 0,
            rejected_reports: 0,
            false_positive_count: 0,
            contribution_count: 0,
            response_time_avg: 0.0,
            last_updated: now,
        }
    }
}

/// Append-only trust-history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustHistoryEntry {
    pub client_id: String,
    pub trust_score: f64,
    pub event_type: TrustEventType,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only detection-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionLogEntry {
    pub ioc_id: String,
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: DetectionAction,
}

/// Session-scoped view of a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    pub hostname: String,
    #[serde(default)]
    pub watch_list: Vec<String>,
    pub status: ClientStatus,
    pub iocs_reported: u32,
    pub iocs_verified: u32,
    pub detections_local: u32,
    pub last_heartbeat: DateTime<Utc>,
}

impl ClientProfile {
    pub fn new(client_id: String, hostname: String, watch_list: Vec<String>) -> Self {
        Self {
            client_id,
            hostname,
            watch_list,
            status: ClientStatus::Online,
            iocs_reported: 0,
            iocs_verified: 0,
            detections_local: 0,
            last_heartbeat: Utc::now(),
        }
    }
}

/// Read-only aggregate view consumed by the REST status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_clients: usize,
    pub online_clients: usize,
    pub offline_clients: usize,
    pub total_iocs: usize,
    pub verified_iocs: usize,
    pub pending_iocs: usize,
    pub critical_iocs: usize,
    pub total_detections: usize,
    pub detections_today: usize,
    pub average_trust: f64,
    pub high_trust_clients: usize,
    pub low_trust_clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioc_id_is_pure_function_of_type_and_value() {
        let a = Ioc::compute_id(IocType::FileHash, "abc");
        let b = Ioc::compute_id(IocType::FileHash, "abc");
        let c = Ioc::compute_id(IocType::FileHash, "abd");
        let d = Ioc::compute_id(IocType::IpAddress, "abc");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn threat_level_orders_info_below_critical() {
        assert!(ThreatLevel::Info < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }
}
