//! Runtime configuration for the RRC node.
//!
//! Loaded from an optional TOML file via [`RrcConfig::load`], the same
//! `serde` + `toml::from_str` idiom used throughout for its own
//! `control::config::ControlConfig`. Every field defaults to the value the
//! specification names, so an absent `--config` flag still yields a fully
//! usable configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

fn default_payload_max_link() -> usize {
    16
}
fn default_payload_max_app() -> usize {
    2800
}
fn default_queue_capacity() -> usize {
    10
}
fn default_app_queue_capacity() -> usize {
    20
}
fn default_channel_capacity() -> usize {
    32
}
fn default_inactivity_timeout_secs() -> u64 {
    30
}
fn default_setup_timeout_secs() -> u64 {
    10
}
fn default_neighbor_timeout_secs() -> u64 {
    30
}
fn default_slot_timeout_secs() -> u64 {
    60
}
fn default_reservation_timeout_secs() -> u64 {
    30
}
fn default_override_hysteresis() -> i64 {
    500
}
fn default_route_request_timeout_ms() -> u64 {
    5_000
}
fn default_route_lookup_timeout_ms() -> u64 {
    2_000
}
fn default_metrics_request_timeout_ms() -> u64 {
    5_000
}
fn default_link_frame_default_ttl() -> i32 {
    10
}
fn default_flap_threshold() -> u32 {
    5
}

/// Deployment-wide tunables; every field here corresponds to one of the
/// named constants a real deployment would need to tune per radio profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RrcConfig {
    /// Link-frame payload cap (bytes). Open Question 1: a separate constant
    /// from the in-process application-packet payload cap.
    #[serde(default = "default_payload_max_link")]
    pub payload_max_link: usize,
    /// Application-packet payload cap (bytes).
    #[serde(default = "default_payload_max_app")]
    pub payload_max_app: usize,
    /// Capacity of each shared frame queue (§4.B `QUEUE_SIZE`).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Capacity of the `app_to_rrc` / `rrc_to_app` pair.
    #[serde(default = "default_app_queue_capacity")]
    pub app_queue_capacity: usize,
    /// Capacity of each bounded inter-layer message channel (§4.A).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Connection-context inactivity release timeout, seconds (Open Question 4:
    /// unit is wall-clock seconds by default, configurable).
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// `CONNECTION_SETUP` timeout, seconds.
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
    /// Neighbor silence timeout, seconds.
    #[serde(default = "default_neighbor_timeout_secs")]
    pub neighbor_timeout_secs: u64,
    /// DU/GU slot idle auto-release timeout, seconds.
    #[serde(default = "default_slot_timeout_secs")]
    pub slot_timeout_secs: u64,
    /// NC reservation request aging window, seconds.
    #[serde(default = "default_reservation_timeout_secs")]
    pub reservation_timeout_secs: u64,
    /// Minimum score margin required to preempt an incumbent DU/GU slot.
    #[serde(default = "default_override_hysteresis")]
    pub override_hysteresis: i64,
    /// Timeout for route/metrics RPCs issued off the hot path, milliseconds.
    #[serde(default = "default_route_request_timeout_ms")]
    pub route_request_timeout_ms: u64,
    /// Timeout for route lookups on the hot (downlink) path, milliseconds.
    #[serde(default = "default_route_lookup_timeout_ms")]
    pub route_lookup_timeout_ms: u64,
    /// Timeout for PHY metrics RPCs, milliseconds.
    #[serde(default = "default_metrics_request_timeout_ms")]
    pub metrics_request_timeout_ms: u64,
    /// Default TTL stamped on a freshly built downlink link frame.
    #[serde(default = "default_link_frame_default_ttl")]
    pub link_frame_default_ttl: i32,
    /// Next-hop flap count that triggers a forced route discovery (§4.D).
    #[serde(default = "default_flap_threshold")]
    pub flap_threshold: u32,
}

impl Default for RrcConfig {
    fn default() -> Self {
        RrcConfig {
            payload_max_link: default_payload_max_link(),
            payload_max_app: default_payload_max_app(),
            queue_capacity: default_queue_capacity(),
            app_queue_capacity: default_app_queue_capacity(),
            channel_capacity: default_channel_capacity(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            setup_timeout_secs: default_setup_timeout_secs(),
            neighbor_timeout_secs: default_neighbor_timeout_secs(),
            slot_timeout_secs: default_slot_timeout_secs(),
            reservation_timeout_secs: default_reservation_timeout_secs(),
            override_hysteresis: default_override_hysteresis(),
            route_request_timeout_ms: default_route_request_timeout_ms(),
            route_lookup_timeout_ms: default_route_lookup_timeout_ms(),
            metrics_request_timeout_ms: default_metrics_request_timeout_ms(),
            link_frame_default_ttl: default_link_frame_default_ttl(),
            flap_threshold: default_flap_threshold(),
        }
    }
}

impl RrcConfig {
    /// Load configuration from a TOML file, falling back to spec defaults
    /// for any field the file omits.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = RrcConfig::default();
        assert_eq!(cfg.payload_max_link, 16);
        assert_eq!(cfg.payload_max_app, 2800);
        assert_eq!(cfg.queue_capacity, 10);
        assert_eq!(cfg.app_queue_capacity, 20);
        assert_eq!(cfg.channel_capacity, 32);
        assert_eq!(cfg.inactivity_timeout_secs, 30);
        assert_eq!(cfg.override_hysteresis, 500);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let cfg: RrcConfig = toml::from_str("queue-capacity = 4\n").unwrap();
        assert_eq!(cfg.queue_capacity, 4);
        assert_eq!(cfg.slot_timeout_secs, 60);
    }
}
