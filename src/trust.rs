//! Trust Manager: one `TrustScore` per client, mutated by report outcomes
//! and pulled back toward the baseline by time-based decay.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::store::Store;
use crate::{TrustEventType, TrustHistoryEntry, TrustScore};

/// Aggregate view returned by [`TrustManager::statistics`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct TrustStatistics {
    pub total_clients: usize,
    pub mean_trust: f64,
    pub min_trust: f64,
    pub max_trust: f64,
    pub high_trust_count: usize,
    pub medium_trust_count: usize,
    pub low_trust_count: usize,
}

pub struct TrustManager {
    store: Arc<Store>,
    initial_trust: f64,
    max_trust: f64,
    min_trust: f64,
    decay_rate: f64,
    decay_interval_hours: i64,
}

impl TrustManager {
    pub fn new(
        store: Arc<Store>,
        initial_trust: f64,
        max_trust: f64,
        min_trust: f64,
        decay_rate: f64,
        decay_interval_hours: i64,
    ) -> Self {
        Self {
            store,
            initial_trust,
            max_trust,
            min_trust,
            decay_rate,
            decay_interval_hours,
        }
    }

    /// Idempotent: create the record on first sight, otherwise return the
    /// current (decayed) score unchanged.
    pub fn initialize(&self, client_id: &str) -> Result<f64> {
        if let Some(existing) = self.store.get_trust(client_id) {
            return self.get(client_id).map(|_| existing.trust_score);
        }
        let now = Utc::now();
        let score = TrustScore::new(client_id.to_string(), self.initial_trust, now);
        let trust = score.trust_score;
        self.store.upsert_trust(score)?;
        self.log(client_id, trust, TrustEventType::Initialized, "new client registration", now)?;
        Ok(trust)
    }

    /// Lazily applies decay before returning the current score.
    pub fn get(&self, client_id: &str) -> Result<f64> {
        let score = match self.store.get_trust(client_id) {
            Some(score) => score,
            None => return self.initialize(client_id),
        };
        let decayed = self.apply_decay(score)?;
        Ok(decayed.trust_score)
    }

    fn apply_decay(&self, score: TrustScore) -> Result<TrustScore> {
        let now = Utc::now();
        let elapsed_hours = (now - score.last_updated).num_seconds() as f64 / 3600.0;
        let periods = (elapsed_hours / self.decay_interval_hours as f64).floor();
        if periods < 1.0 {
            return Ok(score);
        }
        let r_pow = self.decay_rate.powf(periods);
        let new_trust = (score.trust_score * r_pow + self.initial_trust * (1.0 - r_pow))
            .clamp(self.min_trust, self.max_trust);

        if (new_trust - score.trust_score).abs() <= 0.01 {
            return Ok(score);
        }

        let mut updated = score;
        updated.trust_score = new_trust;
        updated.last_updated = now;
        self.store.upsert_trust(updated.clone())?;
        self.log(&updated.client_id, new_trust, TrustEventType::Decayed, "periodic decay", now)?;
        Ok(updated)
    }

    /// Apply a report outcome, returning the new trust score.
    pub fn update(&self, client_id: &str, verified: bool, response_time: Option<f64>) -> Result<f64> {
        let current = match self.store.get_trust(client_id) {
            Some(score) => self.apply_decay(score)?,
            None => {
                self.initialize(client_id)?;
                self.store.get_trust(client_id).expect("just initialized")
            }
        };

        let mut updated = current.clone();
        updated.total_reports += 1;
        if verified {
            updated.verified_reports += 1;
        } else {
            updated.rejected_reports += 1;
            updated.false_positive_count += 1;
        }
        updated.accuracy_rate = if updated.total_reports == 0 {
            0.0
        } else {
            updated.verified_reports as f64 / updated.total_reports as f64
        };

        if let Some(sample) = response_time {
            updated.response_time_avg = if updated.response_time_avg == 0.0 {
                sample
            } else {
                0.7 * updated.response_time_avg + 0.3 * sample
            };
        }

        updated.contribution_count += 1;
        let contribution = ((1.0 + updated.contribution_count as f64).ln() / 5.0).min(1.0);
        let responsiveness = if updated.response_time_avg == 0.0 {
            0.5
        } else {
            (1.0 - updated.response_time_avg / 60.0).max(0.0)
        };
        let consistency = if updated.total_reports == 0 {
            0.5
        } else {
            1.0 - updated.false_positive_count as f64 / updated.total_reports as f64
        };

        let base = 0.4 * updated.accuracy_rate
            + 0.3 * contribution
            + 0.2 * responsiveness
            + 0.1 * consistency;
        let delta = if verified { 0.05 } else { -0.10 };
        let new_trust = (base + delta).clamp(self.min_trust, self.max_trust);

        let now = Utc::now();
        updated.trust_score = new_trust;
        updated.last_updated = now;
        self.store.upsert_trust(updated.clone())?;

        let event = if verified {
            TrustEventType::Increased
        } else {
            TrustEventType::Decreased
        };
        let reason = if verified { "verified report" } else { "rejected report" };
        self.log(client_id, new_trust, event, reason, now)?;

        Ok(new_trust)
    }

    /// `Σ confidence·trust / Σ trust`, or 0 when empty or total trust is 0.
    pub fn weighted_consensus(&self, votes: &HashMap<String, f64>) -> Result<f64> {
        let mut weighted_sum = 0.0;
        let mut trust_sum = 0.0;
        for (client_id, confidence) in votes {
            let trust = self.get(client_id)?;
            weighted_sum += confidence * trust;
            trust_sum += trust;
        }
        if trust_sum == 0.0 {
            return Ok(0.0);
        }
        Ok(weighted_sum / trust_sum)
    }

    /// Reset trust to the baseline, preserving counters.
    pub fn reset(&self, client_id: &str) -> Result<f64> {
        let current = self
            .store
            .get_trust(client_id)
            .unwrap_or_else(|| TrustScore::new(client_id.to_string(), self.initial_trust, Utc::now()));
        let mut updated = current;
        updated.trust_score = self.initial_trust;
        updated.last_updated = Utc::now();
        self.store.upsert_trust(updated.clone())?;
        self.log(client_id, self.initial_trust, TrustEventType::Reset, "manual reset", updated.last_updated)?;
        Ok(self.initial_trust)
    }

    pub fn statistics(&self) -> TrustStatistics {
        let scores: Vec<f64> = self
            .store
            .all_trust_scores()
            .into_iter()
            .map(|s| s.trust_score)
            .collect();

        if scores.is_empty() {
            return TrustStatistics {
                total_clients: 0,
                mean_trust: 0.0,
                min_trust: 0.0,
                max_trust: 0.0,
                high_trust_count: 0,
                medium_trust_count: 0,
                low_trust_count: 0,
            };
        }

        let total_clients = scores.len();
        let mean_trust = scores.iter().sum::<f64>() / total_clients as f64;
        let min_trust = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_trust = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let high_trust_count = scores.iter().filter(|&&t| t >= 0.7).count();
        let low_trust_count = scores.iter().filter(|&&t| t < 0.4).count();
        let medium_trust_count = total_clients - high_trust_count - low_trust_count;

        TrustStatistics {
            total_clients,
            mean_trust,
            min_trust,
            max_trust,
            high_trust_count,
            medium_trust_count,
            low_trust_count,
        }
    }

    fn log(
        &self,
        client_id: &str,
        trust_score: f64,
        event_type: TrustEventType,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.store.append_trust_history(&TrustHistoryEntry {
            client_id: client_id.to_string(),
            trust_score,
            event_type,
            reason: reason.to_string(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn manager() -> (TrustManager, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("fedsig-trust-test-{}", uuid::Uuid::new_v4()));
        let store = Arc::new(Store::open(&dir).unwrap());
        (TrustManager::new(store, 0.5, 1.0, 0.1, 0.95, 24), dir)
    }

    #[test]
    fn initialize_is_idempotent() {
        let (mgr, dir) = manager();
        let first = mgr.initialize("client-a").unwrap();
        let second = mgr.initialize("client-a").unwrap();
        assert_eq!(first, 0.5);
        assert_eq!(second, 0.5);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn verified_report_strictly_increases_trust_from_baseline() {
        let (mgr, dir) = manager();
        mgr.initialize("client-a").unwrap();
        let updated = mgr.update("client-a", true, None).unwrap();
        assert!(updated > 0.5, "expected trust to rise above baseline, got {updated}");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejected_report_applies_a_larger_penalty_than_a_reward() {
        let (mgr, dir) = manager();
        mgr.initialize("client-a").unwrap();
        mgr.initialize("client-b").unwrap();
        let rewarded = mgr.update("client-a", true, None).unwrap();
        let penalized = mgr.update("client-b", false, None).unwrap();
        assert!(penalized < rewarded);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn weighted_consensus_is_zero_for_empty_votes() {
        let (mgr, dir) = manager();
        let votes = HashMap::new();
        assert_eq!(mgr.weighted_consensus(&votes).unwrap(), 0.0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reset_restores_baseline_but_keeps_counters() {
        let (mgr, dir) = manager();
        mgr.initialize("client-a").unwrap();
        mgr.update("client-a", true, None).unwrap();
        let restored = mgr.reset("client-a").unwrap();
        assert_eq!(restored, 0.5);
        let score = mgr.store.get_trust("client-a").unwrap();
        assert_eq!(score.total_reports, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
