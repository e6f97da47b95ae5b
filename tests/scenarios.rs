use fedsig_coordinator::protocol::ClientRegisterPayload;
use fedsig_coordinator::{CoordinatorConfig, CoordinatorState, Ioc, IocType, ThreatLevel};
use std::collections::HashMap;
use std::path::PathBuf;

fn fresh_state() -> (std::sync::Arc<CoordinatorState>, PathBuf) {
    let mut data_dir = std::env::temp_dir();
    data_dir.push(format!("fedsig-scenario-{}", uuid::Uuid::new_v4()));
    let config = CoordinatorConfig { data_dir: data_dir.clone(), ..CoordinatorConfig::default() };
    (CoordinatorState::new(config).unwrap(), data_dir)
}

fn register(state: &std::sync::Arc<CoordinatorState>, client_id: &str) {
    state
        .register(ClientRegisterPayload {
            client_id: client_id.to_string(),
            hostname: format!("{client_id}.local"),
            watch_list: vec![],
        })
        .unwrap();
}

fn sample_ioc(ioc_type: IocType, value: &str, threat_level: ThreatLevel, client_id: &str) -> Ioc {
    Ioc::new(ioc_type, value.to_string(), threat_level, client_id.to_string(), HashMap::new())
}

#[tokio::test]
async fn two_voter_promotion() {
    let (state, dir) = fresh_state();
    register(&state, "c1");
    register(&state, "c2");

    let x = sample_ioc(IocType::FileHash, "abc", ThreatLevel::High, "c1");
    let first = state.report_ioc(x.clone()).unwrap();
    assert!(first.is_none());

    let mut x2 = x;
    x2.source_client = "c2".to_string();
    let promoted = state.report_ioc(x2).unwrap().expect("second voter should promote");
    assert_eq!(promoted.trust_weight, 0.5);
    let mut voters = promoted.verified_by.clone();
    voters.sort();
    assert_eq!(voters, vec!["c1".to_string(), "c2".to_string()]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn consensus_blocked_by_low_trust() {
    use fedsig_coordinator::aggregator::IntelligenceAggregator;
    use fedsig_coordinator::store::Store;
    use std::sync::Arc;

    let mut dir = std::env::temp_dir();
    dir.push(format!("fedsig-scenario-low-trust-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(Store::open(&dir).unwrap());
    let aggregator = IntelligenceAggregator::new(store, 2, 0.6);

    let y = sample_ioc(IocType::FileHash, "def", ThreatLevel::Medium, "c1");
    let first = aggregator.report(y.clone(), "c1", 0.3).unwrap();
    assert!(first.is_none());
    let second = aggregator.report(y, "c2", 0.3).unwrap();
    assert!(second.is_none(), "mean trust 0.3 is below the 0.6 threshold, must stay pending");

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn duplicate_vote_from_same_client_does_not_advance_consensus() {
    let (state, dir) = fresh_state();
    register(&state, "c1");

    let x = sample_ioc(IocType::FileHash, "ghi", ThreatLevel::High, "c1");
    state.report_ioc(x.clone()).unwrap();
    let still_pending = state.report_ioc(x).unwrap();
    assert!(still_pending.is_none());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn decay_convergence_after_one_interval() {
    use fedsig_coordinator::store::Store;
    use fedsig_coordinator::TrustManager;
    use std::sync::Arc;

    let mut dir = std::env::temp_dir();
    dir.push(format!("fedsig-scenario-decay-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(Store::open(&dir).unwrap());
    let manager = TrustManager::new(Arc::clone(&store), 0.5, 1.0, 0.1, 0.95, 24);

    let mut score = fedsig_coordinator::TrustScore::new("c1".to_string(), 0.5, chrono::Utc::now());
    score.trust_score = 0.9;
    score.last_updated = chrono::Utc::now() - chrono::Duration::hours(25);
    store.upsert_trust(score).unwrap();

    let decayed = manager.get("c1").unwrap();
    assert!((decayed - 0.88).abs() < 1e-6, "expected 0.9*0.95 + 0.5*0.05 = 0.88, got {decayed}");

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn reward_on_promotion_strictly_increases_both_voters_trust() {
    let (state, dir) = fresh_state();
    register(&state, "c1");
    register(&state, "c2");

    let x = sample_ioc(IocType::FileHash, "jkl", ThreatLevel::High, "c1");
    state.report_ioc(x.clone()).unwrap();
    let mut x2 = x;
    x2.source_client = "c2".to_string();
    let promoted = state.report_ioc(x2).unwrap();
    assert!(promoted.is_some());

    let c1_trust = state.trust_score("c1").unwrap().trust_score;
    let c2_trust = state.trust_score("c2").unwrap().trust_score;
    assert!(c1_trust > 0.5);
    assert!(c2_trust > 0.5);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn already_verified_replay_is_deduplicated() {
    let (state, dir) = fresh_state();
    register(&state, "c1");
    register(&state, "c2");
    register(&state, "c3");

    let x = sample_ioc(IocType::FileHash, "mno", ThreatLevel::High, "c1");
    state.report_ioc(x.clone()).unwrap();
    let mut x2 = x.clone();
    x2.source_client = "c2".to_string();
    let promoted = state.report_ioc(x2).unwrap().expect("two voters should promote");
    assert_eq!(promoted.verified_by.len(), 2);

    let mut x3 = x;
    x3.source_client = "c3".to_string();
    let replay = state.report_ioc(x3).unwrap().expect("replay of a verified IOC stays verified");
    assert_eq!(replay.detection_count, promoted.detection_count + 1);
    assert_eq!(replay.verified_by, promoted.verified_by, "verified_by is frozen at promotion");

    std::fs::remove_dir_all(&dir).ok();
}
