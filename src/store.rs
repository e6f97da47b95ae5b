//! Persistent store: durable IOC + trust tables plus two append-only logs.
//!
//! The two tables live in memory as `DashMap`s (fine-grained per-key
//! locking, lock-free reads against a snapshot) and are written through to
//! disk as JSON snapshots on upsert; the two logs are newline-delimited
//! JSON files appended to on every event, never rewritten.

use dashmap::DashMap;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CoordinatorError, Result};
use crate::{DetectionLogEntry, IntelStatus, IocType, ThreatIntel, ThreatLevel, TrustHistoryEntry, TrustScore};

const IOCS_SNAPSHOT: &str = "iocs.snapshot.json";
const TRUST_SNAPSHOT: &str = "trust_scores.snapshot.json";
const TRUST_HISTORY_LOG: &str = "trust_history.log";
const DETECTION_LOG: &str = "detection_log.log";

/// Durable mapping of IOC records and trust records, plus the two
/// append-only audit logs.
pub struct Store {
    data_dir: PathBuf,
    iocs: DashMap<String, ThreatIntel>,
    trust_scores: DashMap<String, TrustScore>,
    index_status: DashMap<IntelStatus, HashSet<String>>,
    index_ioc_type: DashMap<IocType, HashSet<String>>,
    index_threat_level: DashMap<ThreatLevel, HashSet<String>>,
}

impl Store {
    /// Open (creating if absent) the store rooted at `data_dir`, replaying
    /// the two table snapshots if present. The append-only logs are not
    /// replayed into memory; they exist purely for durable history.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let store = Self {
            data_dir,
            iocs: DashMap::new(),
            trust_scores: DashMap::new(),
            index_status: DashMap::new(),
            index_ioc_type: DashMap::new(),
            index_threat_level: DashMap::new(),
        };

        store.load_iocs()?;
        store.load_trust_scores()?;

        Ok(store)
    }

    fn load_iocs(&self) -> Result<()> {
        let path = self.data_dir.join(IOCS_SNAPSHOT);
        if !path.exists() {
            return Ok(());
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(());
        }
        let rows: Vec<ThreatIntel> = serde_json::from_str(&raw)?;
        for intel in rows {
            self.index_insert(&intel);
            self.iocs.insert(intel.ioc.ioc_id.clone(), intel);
        }
        Ok(())
    }

    fn load_trust_scores(&self) -> Result<()> {
        let path = self.data_dir.join(TRUST_SNAPSHOT);
        if !path.exists() {
            return Ok(());
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(());
        }
        let rows: Vec<TrustScore> = serde_json::from_str(&raw)?;
        for score in rows {
            self.trust_scores.insert(score.client_id.clone(), score);
        }
        Ok(())
    }

    fn index_insert(&self, intel: &ThreatIntel) {
        self.index_status
            .entry(intel.status)
            .or_default()
            .insert(intel.ioc.ioc_id.clone());
        self.index_ioc_type
            .entry(intel.ioc.ioc_type)
            .or_default()
            .insert(intel.ioc.ioc_id.clone());
        self.index_threat_level
            .entry(intel.ioc.threat_level)
            .or_default()
            .insert(intel.ioc.ioc_id.clone());
    }

    fn index_remove(&self, intel: &ThreatIntel) {
        if let Some(mut set) = self.index_status.get_mut(&intel.status) {
            set.remove(&intel.ioc.ioc_id);
        }
        if let Some(mut set) = self.index_ioc_type.get_mut(&intel.ioc.ioc_type) {
            set.remove(&intel.ioc.ioc_id);
        }
        if let Some(mut set) = self.index_threat_level.get_mut(&intel.ioc.threat_level) {
            set.remove(&intel.ioc.ioc_id);
        }
    }

    /// Atomic single-row upsert of an IOC record. Persists a snapshot with
    /// the new row applied before touching the live map, so a failed write
    /// leaves the in-memory table (and its indexes) exactly as it was.
    pub fn upsert_ioc(&self, intel: ThreatIntel) -> Result<()> {
        self.persist_iocs_with(&intel)?;

        if let Some(old) = self.iocs.get(&intel.ioc.ioc_id) {
            self.index_remove(&old);
        }
        self.index_insert(&intel);
        self.iocs.insert(intel.ioc.ioc_id.clone(), intel);
        Ok(())
    }

    pub fn get_ioc(&self, ioc_id: &str) -> Option<ThreatIntel> {
        self.iocs.get(ioc_id).map(|r| r.clone())
    }

    /// Scan for every row with the given status, or all rows if `None`.
    pub fn list_iocs(&self, status: Option<IntelStatus>) -> Vec<ThreatIntel> {
        match status {
            Some(status) => self
                .index_status
                .get(&status)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| self.iocs.get(id).map(|r| r.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            None => self.iocs.iter().map(|r| r.clone()).collect(),
        }
    }

    pub fn list_by_ioc_type(&self, ioc_type: IocType) -> Vec<ThreatIntel> {
        self.index_ioc_type
            .get(&ioc_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.iocs.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_by_threat_level(&self, threat_level: ThreatLevel) -> Vec<ThreatIntel> {
        self.index_threat_level
            .get(&threat_level)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.iocs.get(id).map(|r| r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Writes a snapshot of the IOC table with `incoming` applied, without
    /// touching the live `DashMap`. Called before any in-memory mutation so
    /// a write failure never leaves a half-applied row visible to readers.
    fn persist_iocs_with(&self, incoming: &ThreatIntel) -> Result<()> {
        let mut rows: Vec<ThreatIntel> = self
            .iocs
            .iter()
            .filter(|r| r.key() != &incoming.ioc.ioc_id)
            .map(|r| r.clone())
            .collect();
        rows.push(incoming.clone());
        write_json_atomic(&self.data_dir.join(IOCS_SNAPSHOT), &rows)
    }

    /// Atomic single-row upsert of a trust record. Persists a snapshot with
    /// the new row applied before touching the live map, mirroring
    /// `upsert_ioc`'s rollback-on-failure guarantee.
    pub fn upsert_trust(&self, score: TrustScore) -> Result<()> {
        self.persist_trust_scores_with(&score)?;
        self.trust_scores.insert(score.client_id.clone(), score);
        Ok(())
    }

    pub fn get_trust(&self, client_id: &str) -> Option<TrustScore> {
        self.trust_scores.get(client_id).map(|r| r.clone())
    }

    pub fn all_trust_scores(&self) -> Vec<TrustScore> {
        self.trust_scores.iter().map(|r| r.clone()).collect()
    }

    fn persist_trust_scores_with(&self, incoming: &TrustScore) -> Result<()> {
        let mut rows: Vec<TrustScore> = self
            .trust_scores
            .iter()
            .filter(|r| r.key() != &incoming.client_id)
            .map(|r| r.clone())
            .collect();
        rows.push(incoming.clone());
        write_json_atomic(&self.data_dir.join(TRUST_SNAPSHOT), &rows)
    }

    /// Append a row to the trust-history log. Never mutated after insert.
    pub fn append_trust_history(&self, entry: &TrustHistoryEntry) -> Result<()> {
        append_json_line(&self.data_dir.join(TRUST_HISTORY_LOG), entry)
    }

    /// Append a row to the detection log. Never mutated after insert.
    pub fn append_detection_log(&self, entry: &DetectionLogEntry) -> Result<()> {
        append_json_line(&self.data_dir.join(DETECTION_LOG), entry)
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_vec(value)?;
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
        .map_err(|e| CoordinatorError::Store(format!("atomic rename failed: {e}")))?;
    Ok(())
}

fn append_json_line<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ioc, TrustEventType};
    use chrono::Utc;

    fn sample_intel(id_suffix: &str) -> ThreatIntel {
        let ioc = Ioc::new(
            IocType::FileHash,
            format!("value-{id_suffix}"),
            ThreatLevel::High,
            "client-a".to_string(),
            Default::default(),
        );
        ThreatIntel {
            ioc,
            verified_by: vec!["client-a".to_string(), "client-b".to_string()],
            trust_weight: 0.7,
            status: IntelStatus::Verified,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            detection_count: 2,
        }
    }

    #[test]
    fn upsert_and_round_trip_through_disk() {
        let dir = tempdir();
        let store = Store::open(&dir).unwrap();
        let intel = sample_intel("1");
        let id = intel.ioc.ioc_id.clone();
        store.upsert_ioc(intel.clone()).unwrap();

        let reopened = Store::open(&dir).unwrap();
        let loaded = reopened.get_ioc(&id).expect("row should survive reopen");
        assert_eq!(loaded.verified_by, intel.verified_by);
        assert_eq!(loaded.status, IntelStatus::Verified);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn status_index_tracks_upserts() {
        let dir = tempdir();
        let store = Store::open(&dir).unwrap();
        let intel = sample_intel("2");
        store.upsert_ioc(intel).unwrap();

        assert_eq!(store.list_iocs(Some(IntelStatus::Verified)).len(), 1);
        assert_eq!(store.list_iocs(Some(IntelStatus::Pending)).len(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn trust_history_log_is_append_only() {
        let dir = tempdir();
        let store = Store::open(&dir).unwrap();
        let entry = TrustHistoryEntry {
            client_id: "client-a".to_string(),
            trust_score: 0.5,
            event_type: TrustEventType::Initialized,
            reason: "New client registration".to_string(),
            timestamp: Utc::now(),
        };
        store.append_trust_history(&entry).unwrap();
        store.append_trust_history(&entry).unwrap();

        let raw = std::fs::read_to_string(dir.join(TRUST_HISTORY_LOG)).unwrap();
        assert_eq!(raw.lines().count(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("fedsig-store-test-{}", uuid::Uuid::new_v4()));
        dir
    }
}
