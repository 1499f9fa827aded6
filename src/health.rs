//! Health-check ("sonar" / "fusion") payload decoding.
//!
//! The host hands over a map of alias -> JSON string. Each entry is decoded on
//! its own; an entry that fails to decode is dropped and the rest survive.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decoded health-check state for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Health score in `[0, 5]`.
    #[serde(alias = "healthScore")]
    pub health_score: f64,
    /// Availability flag; the provider is considered available when `> 0`.
    #[serde(alias = "availabilityOverride", alias = "availability_override")]
    pub avail: f64,
    /// Free-form status text reported by the checker.
    #[serde(default)]
    pub status: String,
}

impl HealthStatus {
    /// Whether the health check reports the provider as available.
    pub fn is_available(&self) -> bool {
        self.avail > 0.0
    }
}

/// Decoded health data keyed by provider alias.
pub type HealthMap = BTreeMap<String, HealthStatus>;

/// Decode every entry of a raw health payload map, dropping malformed entries.
pub fn parse_health_data(raw: &BTreeMap<String, String>) -> HealthMap {
    let mut out = HealthMap::new();
    for (alias, payload) in raw {
        match serde_json::from_str::<HealthStatus>(payload) {
            Ok(h) if h.health_score.is_finite() && h.avail.is_finite() => {
                out.insert(alias.clone(), h);
            }
            Ok(_) => {
                debug!(%alias, "dropping health entry with non-finite values");
            }
            Err(e) => {
                debug!(%alias, error = %e, "dropping undecodable health entry");
            }
        }
    }
    out
}
