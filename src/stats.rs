//! Statistics Projector: a pure read aggregation over the Trust Manager,
//! Aggregator, and Hub — no state of its own.

use chrono::Utc;

use crate::aggregator::IntelligenceAggregator;
use crate::hub::Hub;
use crate::trust::TrustManager;
use crate::{ClientStatus, IntelStatus, SystemStats, ThreatLevel};

pub struct StatisticsProjector<'a> {
    trust: &'a TrustManager,
    aggregator: &'a IntelligenceAggregator,
    hub: &'a Hub,
}

impl<'a> StatisticsProjector<'a> {
    pub fn new(trust: &'a TrustManager, aggregator: &'a IntelligenceAggregator, hub: &'a Hub) -> Self {
        Self { trust, aggregator, hub }
    }

    pub fn project(&self) -> SystemStats {
        let profiles = self.hub.profiles();
        let total_clients = profiles.len();
        let online_clients = profiles.iter().filter(|p| p.status != ClientStatus::Offline).count();
        let offline_clients = total_clients - online_clients;

        let all_iocs = self.aggregator.list(None);
        let total_iocs = all_iocs.len();
        let verified_iocs = all_iocs.iter().filter(|i| i.status == IntelStatus::Verified).count();
        let pending_iocs = all_iocs.iter().filter(|i| i.status == IntelStatus::Pending).count();
        let critical_iocs = all_iocs
            .iter()
            .filter(|i| i.status == IntelStatus::Verified && i.ioc.threat_level == ThreatLevel::Critical)
            .count();

        let today = Utc::now().date_naive();
        let detections = self.hub.detections(usize::MAX);
        let total_detections = detections.len();
        let detections_today = detections.iter().filter(|d| d.ts.date_naive() == today).count();

        let trust_stats = self.trust.statistics();

        SystemStats {
            total_clients,
            online_clients,
            offline_clients,
            total_iocs,
            verified_iocs,
            pending_iocs,
            critical_iocs,
            total_detections,
            detections_today,
            average_trust: trust_stats.mean_trust,
            high_trust_clients: trust_stats.high_trust_count,
            low_trust_clients: trust_stats.low_trust_count,
        }
    }
}
