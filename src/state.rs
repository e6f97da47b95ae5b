//! Shared application state: the one place that owns the Trust Manager,
//! Aggregator, Hub, and Store, and the single code path both the REST
//! layer and the WebSocket session layer call to report an IOC.

use std::sync::Arc;

use crate::aggregator::IntelligenceAggregator;
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::hub::Hub;
use crate::protocol::{ClientHeartbeatPayload, ClientRegisterPayload, CoordinatorMessage, DetectionEventPayload};
use crate::stats::StatisticsProjector;
use crate::store::Store;
use crate::trust::TrustManager;
use crate::{ClientProfile, Ioc, SystemStats, ThreatIntel};

pub struct CoordinatorState {
    pub config: CoordinatorConfig,
    store: Arc<Store>,
    trust: Arc<TrustManager>,
    aggregator: Arc<IntelligenceAggregator>,
    hub: Arc<Hub>,
}

impl CoordinatorState {
    pub fn new(config: CoordinatorConfig) -> Result<Arc<Self>> {
        let store = Arc::new(Store::open(&config.data_dir)?);
        let trust = Arc::new(TrustManager::new(
            Arc::clone(&store),
            config.initial_trust,
            config.max_trust,
            config.min_trust,
            config.trust_decay_rate,
            config.decay_interval_hours,
        ));
        let aggregator = Arc::new(IntelligenceAggregator::new(
            Arc::clone(&store),
            config.consensus_threshold,
            config.consensus_trust_avg,
        ));
        let hub = Arc::new(Hub::new(Arc::clone(&trust), Arc::clone(&aggregator), config.session_send_buffer));

        Ok(Arc::new(Self { config, store: store.clone(), trust, aggregator, hub }))
    }

    /// Single entry point for an IOC report, shared by the REST route and
    /// the `ioc_report` WebSocket event (`POST /api/report_threat` does not
    /// require a registered session; the WebSocket event does).
    pub fn report_ioc(&self, ioc: Ioc) -> Result<Option<ThreatIntel>> {
        self.hub.report_ioc(ioc)
    }

    pub fn ws_report_ioc(&self, ioc: Ioc) -> Result<Option<ThreatIntel>> {
        self.hub.handle_ws_ioc_report(ioc)
    }

    pub fn register(self: &Arc<Self>, payload: ClientRegisterPayload) -> Result<(tokio::sync::mpsc::Receiver<CoordinatorMessage>, CoordinatorMessage)> {
        self.hub.register(payload)
    }

    pub fn heartbeat(&self, payload: ClientHeartbeatPayload) {
        self.hub.heartbeat(payload)
    }

    pub fn detection_event(&self, payload: DetectionEventPayload) {
        self.hub.detection_event(payload)
    }

    pub fn sync_response(&self) -> CoordinatorMessage {
        self.hub.sync_response()
    }

    pub fn disconnect(&self, client_id: &str) {
        self.hub.disconnect(client_id)
    }

    pub fn profile(&self, client_id: &str) -> Option<ClientProfile> {
        self.hub.profile(client_id)
    }

    pub fn profiles(&self) -> Vec<ClientProfile> {
        self.hub.profiles()
    }

    pub fn ioc_by_id(&self, ioc_id: &str) -> Option<ThreatIntel> {
        self.aggregator.get_by_id(ioc_id)
    }

    pub fn list_iocs(&self, status: Option<crate::IntelStatus>) -> Vec<ThreatIntel> {
        self.aggregator.list(status)
    }

    pub fn verified_iocs(&self) -> Vec<ThreatIntel> {
        self.aggregator.list(Some(crate::IntelStatus::Verified))
    }

    pub fn trust_score(&self, client_id: &str) -> Option<crate::TrustScore> {
        self.store.get_trust(client_id)
    }

    pub fn trust_scores(&self) -> Vec<crate::TrustScore> {
        self.store.all_trust_scores()
    }

    pub fn detections(&self, limit: usize) -> Vec<DetectionEventPayload> {
        self.hub.detections(limit)
    }

    pub fn aggregator_statistics(&self) -> crate::aggregator::AggregatorStatistics {
        self.aggregator.statistics()
    }

    pub fn system_stats(&self) -> SystemStats {
        StatisticsProjector::new(&self.trust, &self.aggregator, &self.hub).project()
    }

    /// Periodic maintenance: sweep timed-out sessions and expire stale
    /// verified IOCs. Spawned as a background task from `main`.
    pub fn run_maintenance(&self) -> Result<()> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(self.config.client_timeout_sec as i64);
        self.hub.sweep_timeouts(cutoff);
        self.aggregator.sweep_expired(self.config.expiry_days)?;
        Ok(())
    }
}
