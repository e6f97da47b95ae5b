use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoordinatorError, Result};

/// Coordinator-wide tunables. Every option in the configuration surface
/// has a field here, with the same default as the one named in the spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Starting trust score for a newly registered client.
    pub initial_trust: f64,
    /// Upper clamp on trust score.
    pub max_trust: f64,
    /// Lower clamp on trust score.
    pub min_trust: f64,
    /// Multiplicative pull toward `initial_trust` per decay interval.
    pub trust_decay_rate: f64,
    /// Hours between decay applications.
    pub decay_interval_hours: i64,
    /// Minimum distinct voters required for consensus.
    pub consensus_threshold: usize,
    /// Minimum mean trust of voters required for consensus.
    pub consensus_trust_avg: f64,
    /// Heartbeat window; a client silent longer than this is marked offline.
    pub client_timeout_sec: u64,
    /// Age past which a verified IOC is swept to expired.
    pub expiry_days: i64,
    /// Capacity of each session's outbound mpsc buffer.
    pub session_send_buffer: usize,
    /// Directory holding the store's snapshot + append-only logs.
    pub data_dir: PathBuf,
    /// HTTP/WS bind host.
    pub host: String,
    /// HTTP/WS bind port.
    pub port: u16,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            initial_trust: 0.5,
            max_trust: 1.0,
            min_trust: 0.1,
            trust_decay_rate: 0.95,
            decay_interval_hours: 24,
            consensus_threshold: 2,
            consensus_trust_avg: 0.6,
            client_timeout_sec: 30,
            expiry_days: 30,
            session_send_buffer: 64,
            data_dir: PathBuf::from("./data/intel"),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Mirror of `CoordinatorConfig` with every field optional, used as the
/// deserialization target for partial file/env overrides.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    initial_trust: Option<f64>,
    max_trust: Option<f64>,
    min_trust: Option<f64>,
    trust_decay_rate: Option<f64>,
    decay_interval_hours: Option<i64>,
    consensus_threshold: Option<usize>,
    consensus_trust_avg: Option<f64>,
    client_timeout_sec: Option<u64>,
    expiry_days: Option<i64>,
    session_send_buffer: Option<usize>,
    data_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

impl CoordinatorConfig {
    /// Load configuration from an optional TOML file, overridden by
    /// `CFG_*` environment variables (e.g. `CFG_CONSENSUS_THRESHOLD=3`).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix("CFG"));

        let built = builder
            .build()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;

        let partial: PartialConfig = built
            .try_deserialize()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;

        let defaults = Self::default();
        Ok(Self {
            initial_trust: partial.initial_trust.unwrap_or(defaults.initial_trust),
            max_trust: partial.max_trust.unwrap_or(defaults.max_trust),
            min_trust: partial.min_trust.unwrap_or(defaults.min_trust),
            trust_decay_rate: partial.trust_decay_rate.unwrap_or(defaults.trust_decay_rate),
            decay_interval_hours: partial
                .decay_interval_hours
                .unwrap_or(defaults.decay_interval_hours),
            consensus_threshold: partial
                .consensus_threshold
                .unwrap_or(defaults.consensus_threshold),
            consensus_trust_avg: partial
                .consensus_trust_avg
                .unwrap_or(defaults.consensus_trust_avg),
            client_timeout_sec: partial
                .client_timeout_sec
                .unwrap_or(defaults.client_timeout_sec),
            expiry_days: partial.expiry_days.unwrap_or(defaults.expiry_days),
            session_send_buffer: partial
                .session_send_buffer
                .unwrap_or(defaults.session_send_buffer),
            data_dir: partial.data_dir.unwrap_or(defaults.data_dir),
            host: partial.host.unwrap_or(defaults.host),
            port: partial.port.unwrap_or(defaults.port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_configuration_surface() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.initial_trust, 0.5);
        assert_eq!(cfg.max_trust, 1.0);
        assert_eq!(cfg.min_trust, 0.1);
        assert_eq!(cfg.trust_decay_rate, 0.95);
        assert_eq!(cfg.decay_interval_hours, 24);
        assert_eq!(cfg.consensus_threshold, 2);
        assert_eq!(cfg.consensus_trust_avg, 0.6);
        assert_eq!(cfg.client_timeout_sec, 30);
        assert_eq!(cfg.expiry_days, 30);
    }
}
