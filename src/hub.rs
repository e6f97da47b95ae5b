//! Session Layer / Hub: registers client sessions, routes inbound wire
//! events to the Trust Manager and Aggregator, and fans verified IOCs
//! back out without letting one slow client stall the others.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::aggregator::IntelligenceAggregator;
use crate::error::{CoordinatorError, Result};
use crate::protocol::{
    ClientHeartbeatPayload, ClientRegisterPayload, CoordinatorMessage, DetectionEventPayload,
};
use crate::trust::TrustManager;
use crate::{ClientProfile, ClientStatus, Ioc, ThreatIntel};

const DETECTION_FEED_CAPACITY: usize = 1000;

/// One connected (or recently connected) client's routing handle.
struct Session {
    outbound: mpsc::Sender<CoordinatorMessage>,
    relay: tokio::task::JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

pub struct Hub {
    trust: Arc<TrustManager>,
    aggregator: Arc<IntelligenceAggregator>,
    profiles: DashMap<String, ClientProfile>,
    sessions: DashMap<String, Session>,
    broadcast: broadcast::Sender<ThreatIntel>,
    detection_feed: Mutex<VecDeque<DetectionEventPayload>>,
    session_send_buffer: usize,
}

impl Hub {
    pub fn new(trust: Arc<TrustManager>, aggregator: Arc<IntelligenceAggregator>, session_send_buffer: usize) -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(256);
        Self {
            trust,
            aggregator,
            profiles: DashMap::new(),
            sessions: DashMap::new(),
            broadcast: broadcast_tx,
            detection_feed: Mutex::new(VecDeque::with_capacity(DETECTION_FEED_CAPACITY)),
            session_send_buffer,
        }
    }

    /// Register (or re-register) a client session. Returns the receiving
    /// end of its outbound queue for the transport handler to drain, plus
    /// the reply the caller should send immediately.
    pub fn register(
        self: &Arc<Self>,
        payload: ClientRegisterPayload,
    ) -> Result<(mpsc::Receiver<CoordinatorMessage>, CoordinatorMessage)> {
        let trust = self.trust.initialize(&payload.client_id)?;

        let profile = ClientProfile::new(payload.client_id.clone(), payload.hostname, payload.watch_list);
        self.profiles.insert(payload.client_id.clone(), profile);

        let (tx, rx) = mpsc::channel(self.session_send_buffer);
        let relay = self.spawn_broadcast_relay(payload.client_id.clone(), tx.clone());
        // Replacing (not just inserting) the entry drops any prior `Session`,
        // which aborts its relay task so a stale re-registration can't keep
        // forwarding broadcasts into an orphaned channel.
        self.sessions
            .insert(payload.client_id.clone(), Session { outbound: tx, relay });

        Ok((
            rx,
            CoordinatorMessage::Registered { client_id: payload.client_id, trust },
        ))
    }

    /// Subscribe to the verified-IOC broadcast and relay it into this
    /// session's own bounded outbound queue. If that queue is full when a
    /// broadcast arrives, the session is dropped rather than blocking the
    /// broadcaster or any other session.
    fn spawn_broadcast_relay(
        self: &Arc<Self>,
        client_id: String,
        outbound: mpsc::Sender<CoordinatorMessage>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut rx = self.broadcast.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(intel) => {
                        if outbound.try_send(CoordinatorMessage::IocBroadcast(intel)).is_err() {
                            warn!(%client_id, "outbound buffer full, dropping session");
                            hub.mark_offline(&client_id);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn heartbeat(&self, payload: ClientHeartbeatPayload) {
        if let Some(mut profile) = self.profiles.get_mut(&payload.client_id) {
            profile.status = payload.status;
            profile.last_heartbeat = payload.ts;
            if let Some(detections) = payload.detections_local {
                profile.detections_local = detections;
            }
        }
    }

    /// Route an IOC report: fetches the reporter's trust, runs it through
    /// the aggregator's consensus check, rewards voters on promotion, and
    /// broadcasts the verified record to every connected session. The
    /// WebSocket `ioc_report` event additionally requires an active
    /// registered session before calling this; the REST endpoint does not.
    pub fn report_ioc(&self, ioc: Ioc) -> Result<Option<ThreatIntel>> {
        let client_id = ioc.source_client.clone();
        let trust = self.trust.get(&client_id)?;
        let outcome = self.aggregator.report(ioc, &client_id, trust)?;

        if let Some(intel) = &outcome {
            let _ = self.broadcast.send(intel.clone());
            for voter in &intel.verified_by {
                let new_trust = self.trust.update(voter, true, None)?;
                if let Some(mut profile) = self.profiles.get_mut(voter) {
                    profile.iocs_verified += 1;
                }
                self.send_targeted(voter, CoordinatorMessage::TrustUpdate {
                    client_id: voter.clone(),
                    trust: new_trust,
                });
            }
        }

        Ok(outcome)
    }

    /// Gated entry point for the WebSocket `ioc_report` event: requires an
    /// active registered session for `ioc.source_client`.
    pub fn handle_ws_ioc_report(&self, ioc: Ioc) -> Result<Option<ThreatIntel>> {
        if !self.profiles.contains_key(&ioc.source_client) {
            return Err(CoordinatorError::UnregisteredClient(ioc.source_client.clone()));
        }
        self.report_ioc(ioc)
    }

    fn send_targeted(&self, client_id: &str, message: CoordinatorMessage) {
        if let Some(session) = self.sessions.get(client_id) {
            if session.outbound.try_send(message).is_err() {
                warn!(%client_id, "outbound buffer full sending targeted message, dropping session");
                drop(session);
                self.mark_offline(client_id);
            }
        }
    }

    pub fn detection_event(&self, payload: DetectionEventPayload) {
        let mut feed = self.detection_feed.lock().expect("detection feed mutex poisoned");
        if feed.len() >= DETECTION_FEED_CAPACITY {
            feed.pop_front();
        }
        feed.push_back(payload);
    }

    pub fn detections(&self, limit: usize) -> Vec<DetectionEventPayload> {
        let feed = self.detection_feed.lock().expect("detection feed mutex poisoned");
        feed.iter().rev().take(limit).cloned().collect()
    }

    pub fn sync_response(&self) -> CoordinatorMessage {
        CoordinatorMessage::SyncResponse {
            iocs: self.aggregator.list(Some(crate::IntelStatus::Verified)),
            server_time: Utc::now(),
        }
    }

    pub fn disconnect(&self, client_id: &str) {
        self.mark_offline(client_id);
        self.sessions.remove(client_id);
    }

    fn mark_offline(&self, client_id: &str) {
        if let Some(mut profile) = self.profiles.get_mut(client_id) {
            profile.status = ClientStatus::Offline;
        }
    }

    pub fn profile(&self, client_id: &str) -> Option<ClientProfile> {
        self.profiles.get(client_id).map(|r| r.clone())
    }

    pub fn profiles(&self) -> Vec<ClientProfile> {
        self.profiles.iter().map(|r| r.clone()).collect()
    }

    /// Mark any session whose last heartbeat predates `cutoff` as offline.
    pub fn sweep_timeouts(&self, cutoff: DateTime<Utc>) {
        for mut profile in self.profiles.iter_mut() {
            if profile.status != ClientStatus::Offline && profile.last_heartbeat < cutoff {
                profile.status = ClientStatus::Offline;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::{IocType, ThreatLevel};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn hub() -> (Arc<Hub>, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("fedsig-hub-test-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(Store::open(&dir).unwrap());
        let trust = Arc::new(TrustManager::new(Arc::clone(&store), 0.5, 1.0, 0.1, 0.95, 24));
        let aggregator = Arc::new(IntelligenceAggregator::new(store, 2, 0.6));
        (Arc::new(Hub::new(trust, aggregator, 64)), dir)
    }

    #[tokio::test]
    async fn ws_report_from_unregistered_client_is_rejected() {
        let (hub, dir) = hub();
        let ioc = Ioc::new(IocType::FileHash, "abc".to_string(), ThreatLevel::High, "ghost".to_string(), HashMap::new());
        let result = hub.handle_ws_ioc_report(ioc);
        assert!(matches!(result, Err(CoordinatorError::UnregisteredClient(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn rest_report_does_not_require_a_registered_session() {
        let (hub, dir) = hub();
        let ioc = Ioc::new(IocType::FileHash, "xyz".to_string(), ThreatLevel::High, "walk-in".to_string(), HashMap::new());
        let result = hub.report_ioc(ioc);
        assert!(result.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn promotion_broadcasts_and_rewards_voters() {
        let (hub, dir) = hub();
        hub.register(ClientRegisterPayload { client_id: "c1".into(), hostname: "h1".into(), watch_list: vec![] }).unwrap();
        hub.register(ClientRegisterPayload { client_id: "c2".into(), hostname: "h2".into(), watch_list: vec![] }).unwrap();

        let ioc = Ioc::new(IocType::FileHash, "abc".to_string(), ThreatLevel::High, "c1".to_string(), HashMap::new());
        let first = hub.report_ioc(ioc.clone()).unwrap();
        assert!(first.is_none());

        let mut ioc2 = ioc;
        ioc2.source_client = "c2".to_string();
        let second = hub.report_ioc(ioc2).unwrap();
        assert!(second.is_some());

        let c1_trust = hub.trust.get("c1").unwrap();
        let c2_trust = hub.trust.get("c2").unwrap();
        assert!(c1_trust > 0.5);
        assert!(c2_trust > 0.5);

        std::fs::remove_dir_all(&dir).ok();
    }
}
