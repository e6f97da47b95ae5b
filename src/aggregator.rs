//! Intelligence Aggregator: dedup-by-`ioc_id` vote accumulation, consensus
//! promotion, and read access over the IOC table.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;
use crate::{DetectionAction, DetectionLogEntry, Ioc, IntelStatus, IocType, ThreatIntel, ThreatLevel};

/// One still-unverified IOC's accumulated votes: `client_id -> trust at
/// vote time`. A `DashMap` entry so the read-modify-write of the voter
/// list plus the consensus check form one critical section per `ioc_id`.
type PendingVotes = DashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AggregatorStatistics {
    pub totals_by_status: HashMap<IntelStatus, usize>,
    pub threat_level_distribution: HashMap<ThreatLevel, usize>,
    pub type_distribution: HashMap<IocType, usize>,
    pub consensus_threshold: usize,
    pub consensus_trust_avg: f64,
}

pub struct IntelligenceAggregator {
    store: Arc<Store>,
    pending: PendingVotes,
    consensus_threshold: usize,
    consensus_trust_avg: f64,
}

impl IntelligenceAggregator {
    pub fn new(store: Arc<Store>, consensus_threshold: usize, consensus_trust_avg: f64) -> Self {
        // Seed the pending-vote table from any pending rows the store
        // already holds from a previous run's snapshot.
        let pending = DashMap::new();
        for intel in store.list_iocs(Some(IntelStatus::Pending)) {
            let votes: HashMap<String, f64> = intel
                .verified_by
                .iter()
                .map(|client_id| (client_id.clone(), intel.trust_weight))
                .collect();
            pending.insert(intel.ioc.ioc_id.clone(), votes);
        }

        Self {
            store,
            pending,
            consensus_threshold,
            consensus_trust_avg,
        }
    }

    /// Record a report. Returns `Some(ThreatIntel)` when the IOC is (or
    /// becomes) verified, `None` while it remains pending.
    pub fn report(&self, ioc: Ioc, client_id: &str, trust: f64) -> Result<Option<ThreatIntel>> {
        let existing = self.store.get_ioc(&ioc.ioc_id);

        if let Some(mut verified) = existing.clone() {
            if verified.status == IntelStatus::Verified {
                verified.detection_count += 1;
                verified.last_seen = Utc::now();
                self.store.upsert_ioc(verified.clone())?;
                self.store.append_detection_log(&DetectionLogEntry {
                    ioc_id: verified.ioc.ioc_id.clone(),
                    client_id: client_id.to_string(),
                    timestamp: verified.last_seen,
                    action: DetectionAction::Replayed,
                })?;
                return Ok(Some(verified));
            }
        }

        // The first report for an `ioc_id` fixes `ioc` (threat_level, metadata, ...)
        // and `first_seen`; later votes only add a voter and bump `last_seen`.
        let (stored_ioc, first_seen) = match existing {
            Some(pending) => (pending.ioc, pending.first_seen),
            None => (ioc.clone(), Utc::now()),
        };

        let mut votes = self.pending.entry(stored_ioc.ioc_id.clone()).or_default();
        votes.entry(client_id.to_string()).or_insert(trust);

        let n = votes.len();
        let mean_trust = votes.values().sum::<f64>() / n as f64;

        self.store.append_detection_log(&DetectionLogEntry {
            ioc_id: stored_ioc.ioc_id.clone(),
            client_id: client_id.to_string(),
            timestamp: Utc::now(),
            action: DetectionAction::Reported,
        })?;

        if n >= self.consensus_threshold && mean_trust >= self.consensus_trust_avg {
            let verified_by: Vec<String> = votes.keys().cloned().collect();
            let promoted = ThreatIntel {
                ioc: stored_ioc.clone(),
                verified_by,
                trust_weight: mean_trust,
                status: IntelStatus::Verified,
                first_seen,
                last_seen: Utc::now(),
                detection_count: n as u32,
            };
            drop(votes);
            self.pending.remove(&stored_ioc.ioc_id);
            self.store.upsert_ioc(promoted.clone())?;
            return Ok(Some(promoted));
        }

        let pending_record = ThreatIntel {
            ioc: stored_ioc,
            verified_by: votes.keys().cloned().collect(),
            trust_weight: mean_trust,
            status: IntelStatus::Pending,
            first_seen,
            last_seen: Utc::now(),
            detection_count: n as u32,
        };
        drop(votes);
        self.store.upsert_ioc(pending_record)?;
        Ok(None)
    }

    pub fn get_by_id(&self, ioc_id: &str) -> Option<ThreatIntel> {
        self.store.get_ioc(ioc_id)
    }

    pub fn list(&self, status: Option<IntelStatus>) -> Vec<ThreatIntel> {
        self.store.list_iocs(status)
    }

    pub fn statistics(&self) -> AggregatorStatistics {
        let all = self.store.list_iocs(None);
        let mut totals_by_status = HashMap::new();
        let mut threat_level_distribution = HashMap::new();
        let mut type_distribution = HashMap::new();

        for intel in &all {
            *totals_by_status.entry(intel.status).or_insert(0) += 1;
            if intel.status == IntelStatus::Verified {
                *threat_level_distribution.entry(intel.ioc.threat_level).or_insert(0) += 1;
                *type_distribution.entry(intel.ioc.ioc_type).or_insert(0) += 1;
            }
        }

        AggregatorStatistics {
            totals_by_status,
            threat_level_distribution,
            type_distribution,
            consensus_threshold: self.consensus_threshold,
            consensus_trust_avg: self.consensus_trust_avg,
        }
    }

    /// Mark verified records whose `last_seen` predates `now - days` as
    /// expired.
    pub fn sweep_expired(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut swept = 0;
        for mut intel in self.store.list_iocs(Some(IntelStatus::Verified)) {
            if intel.last_seen < cutoff {
                intel.status = IntelStatus::Expired;
                self.store.upsert_ioc(intel)?;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;

    fn aggregator() -> (IntelligenceAggregator, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("fedsig-aggregator-test-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(Store::open(&dir).unwrap());
        (IntelligenceAggregator::new(store, 2, 0.6), dir)
    }

    fn ioc(value: &str) -> Ioc {
        Ioc::new(IocType::FileHash, value.to_string(), ThreatLevel::High, "client-a".to_string(), Map::new())
    }

    #[test]
    fn two_voter_promotion() {
        let (agg, dir) = aggregator();
        let x = ioc("abc");

        let first = agg.report(x.clone(), "c1", 0.5).unwrap();
        assert!(first.is_none(), "single voter must stay pending");

        let second = agg.report(x.clone(), "c2", 0.5).unwrap();
        let promoted = second.expect("two voters at trust 0.5 should promote");
        assert_eq!(promoted.status, IntelStatus::Verified);
        assert_eq!(promoted.trust_weight, 0.5);
        let mut voters = promoted.verified_by.clone();
        voters.sort();
        assert_eq!(voters, vec!["c1".to_string(), "c2".to_string()]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn second_voters_ioc_and_first_seen_do_not_overwrite_the_first_reporters() {
        let (agg, dir) = aggregator();

        let mut first_report = ioc("abc");
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), "c1-sensor".to_string());
        first_report.threat_level = ThreatLevel::Critical;
        first_report.metadata = metadata;
        agg.report(first_report.clone(), "c1", 0.5).unwrap();

        let pending = agg.get_by_id(&first_report.ioc_id).unwrap();
        let first_seen_at_intake = pending.first_seen;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut second_report = first_report.clone();
        second_report.source_client = "c2".to_string();
        second_report.threat_level = ThreatLevel::Low;
        second_report.metadata = Map::new();
        let promoted = agg.report(second_report, "c2", 0.5).unwrap().expect("should promote");

        assert_eq!(promoted.ioc.threat_level, ThreatLevel::Critical, "later votes must not overwrite the first report's threat_level");
        assert_eq!(promoted.ioc.metadata, first_report.metadata, "later votes must not overwrite the first report's metadata");
        assert_eq!(promoted.first_seen, first_seen_at_intake, "first_seen must not drift forward on later votes");
        assert!(promoted.last_seen > promoted.first_seen, "last_seen should advance on the promoting vote");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn consensus_blocked_by_low_trust() {
        let (agg, dir) = aggregator();
        let y = ioc("def");

        agg.report(y.clone(), "c1", 0.3).unwrap();
        let result = agg.report(y.clone(), "c2", 0.3).unwrap();
        assert!(result.is_none(), "mean trust 0.3 is below the 0.6 threshold");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_vote_from_same_client_is_ignored() {
        let (agg, dir) = aggregator();
        let x = ioc("ghi");

        agg.report(x.clone(), "c1", 0.5).unwrap();
        let still_pending = agg.report(x.clone(), "c1", 0.9).unwrap();
        assert!(still_pending.is_none(), "a repeated vote from c1 must not advance consensus");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn already_verified_replay_increments_detection_count_without_adding_voter() {
        let (agg, dir) = aggregator();
        let x = ioc("jkl");
        agg.report(x.clone(), "c1", 0.5).unwrap();
        let promoted = agg.report(x.clone(), "c2", 0.5).unwrap().unwrap();
        assert_eq!(promoted.detection_count, 2);

        let replay = agg.report(x.clone(), "c3", 0.9).unwrap().unwrap();
        assert_eq!(replay.detection_count, 3);
        assert_eq!(replay.verified_by.len(), 2, "verified_by is frozen at promotion");

        std::fs::remove_dir_all(&dir).ok();
    }
}
