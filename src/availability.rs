//! Availability filter chain and the recovery pick used when it empties the set.
//!
//! Two independent signals, applied in a fixed order:
//! 1. network probes: `avail >= threshold`
//! 2. health checks: availability flag `> 0`
//!
//! A signal whose data is entirely absent for this request is skipped (vacuously
//! true), never read as "everything is down". A provider missing from a signal that
//! does have data is eliminated by it.

use rand::Rng;
use tracing::debug;

use crate::{uniform_pick, CandidateSet, Reason, Settings, Telemetry};

/// Which availability signals to apply, and how strictly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvailabilityPolicy {
    pub use_radar: bool,
    pub radar_threshold: f64,
    pub use_sonar: bool,
}

impl From<&Settings> for AvailabilityPolicy {
    fn from(s: &Settings) -> Self {
        Self {
            use_radar: s.use_radar_availability,
            radar_threshold: s.radar_availability_threshold,
            use_sonar: s.use_sonar_availability,
        }
    }
}

/// Output of the filter chain.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// At least one candidate passed every enabled filter.
    Survivors(CandidateSet),
    /// A filter eliminated every candidate. `reason` names the filter.
    Emptied { reason: Reason },
}

/// Apply the enabled availability filters to `set`.
pub fn filter_available(
    set: &CandidateSet,
    policy: AvailabilityPolicy,
    telemetry: &Telemetry,
) -> FilterOutcome {
    let mut survivors = set.clone();

    if policy.use_radar && !telemetry.avail.is_empty() {
        survivors.retain(|_, c| c.avail.is_some_and(|a| a >= policy.radar_threshold));
        if survivors.is_empty() {
            debug!(threshold = policy.radar_threshold, "radar availability eliminated all providers");
            return FilterOutcome::Emptied {
                reason: Reason::AllUnavailableRadar,
            };
        }
    }

    if policy.use_sonar && !telemetry.health.is_empty() {
        survivors.retain(|_, c| c.health_ok());
        if survivors.is_empty() {
            debug!("health-check availability eliminated all providers");
            return FilterOutcome::Emptied {
                reason: Reason::AllUnavailableSonar,
            };
        }
    }

    FilterOutcome::Survivors(survivors)
}

/// Pick something answerable out of `pool` when the normal path failed.
///
/// Prefers health-qualified providers, narrowed to those with network-probe
/// availability when any of them has it, and takes the highest availability
/// (ties: smallest alias). Without a health-qualified provider the pick is
/// uniformly random over `pool`. `None` only for an empty pool.
pub fn recover<R: Rng>(pool: &CandidateSet, rng: &mut R) -> Option<(String, Reason)> {
    let healthy: Vec<&crate::Candidate> = pool.values().filter(|c| c.health_ok()).collect();
    if healthy.is_empty() {
        let keys: Vec<String> = pool.keys().cloned().collect();
        return uniform_pick(&keys, rng).map(|a| (a.clone(), Reason::FallbackRandom));
    }

    let with_avail: Vec<&crate::Candidate> =
        healthy.iter().copied().filter(|c| c.avail.is_some()).collect();
    let narrowed = if with_avail.is_empty() { healthy } else { with_avail };

    let mut best: Option<&crate::Candidate> = None;
    for c in narrowed {
        let a = c.avail.unwrap_or(f64::NEG_INFINITY);
        let better = match best {
            None => true,
            // Iteration is in alias order, so strict `>` keeps the smallest alias on ties.
            Some(b) => a > b.avail.unwrap_or(f64::NEG_INFINITY),
        };
        if better {
            best = Some(c);
        }
    }
    best.map(|c| (c.alias.clone(), Reason::FallbackBestAvailability))
}
