//! Reason codes and diagnostics.
//!
//! Reasons are a closed set of typed tokens; rendering into the bounded string the
//! reporting system accepts is a separate step ([`render_reason_code`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{GeoScope, StickyOutcome};

/// Character budget of the externally reported reason code.
pub const REASON_CODE_BUDGET: usize = 99;

const ELLIPSIS: &str = "...";

/// Why a branch of the decision was taken.
///
/// Prefer adding variants over changing the rendering of existing ones; reporting
/// pipelines key on the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reason {
    /// The client IP fell in a configured address block.
    IpOverride,
    /// At least one field was inherited from this scope.
    GeoOverride(GeoScope),
    /// At least one field came from the default settings.
    GeoDefault,
    /// Exactly one provider survived availability filtering.
    OneProviderAvailable,
    /// The network-probe availability filter eliminated every candidate.
    AllUnavailableRadar,
    /// The health-check availability filter eliminated every candidate.
    AllUnavailableSonar,
    /// Recovery picked the most available health-qualified provider.
    FallbackBestAvailability,
    /// Recovery had no health-qualified provider and picked at random.
    FallbackRandom,
    /// No candidate could be scored; defaults were used.
    DataIssue,
    /// Best composite score.
    OptimalProvider,
    /// Best score on RTT alone.
    BestRtt,
    /// Best score on throughput alone.
    BestThroughput,
    /// Keep-warm pick among the top scorers.
    WeightedRoundRobin,
    /// Stickiness outcome for an optimal pick.
    Sticky(StickyOutcome),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::IpOverride => f.write_str("IP Override"),
            Reason::GeoOverride(scope) => write!(f, "Geo Override-{}", scope.label()),
            Reason::GeoDefault => f.write_str("Geo Default"),
            Reason::OneProviderAvailable => f.write_str("Only One Provider Available"),
            Reason::AllUnavailableRadar => f.write_str("All Providers Unavailable-Radar"),
            Reason::AllUnavailableSonar => f.write_str("All Providers Unavailable-Sonar"),
            Reason::FallbackBestAvailability => f.write_str("Fallback-Best Availability"),
            Reason::FallbackRandom => f.write_str("Fallback-Random"),
            Reason::DataIssue => f.write_str("Data Issue"),
            Reason::OptimalProvider => f.write_str("Optimal Provider Available"),
            Reason::BestRtt => f.write_str("Best Performing Provider-RTT"),
            Reason::BestThroughput => f.write_str("Best Performing Provider-Throughput"),
            Reason::WeightedRoundRobin => f.write_str("Weighted Round Robin"),
            Reason::Sticky(o) => write!(f, "Stickiness-{}", o.as_str()),
        }
    }
}

/// Join `reasons` with `", "` and bound the result to `budget` characters.
///
/// When the joined text is too long it is cut and suffixed with `...`, keeping the
/// total at exactly `budget` characters.
pub fn render_reason_code(reasons: &[Reason], budget: usize) -> String {
    let joined = reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    truncate_chars(&joined, budget)
}

fn truncate_chars(s: &str, budget: usize) -> String {
    if s.chars().count() <= budget {
        return s.to_string();
    }
    let keep = budget.saturating_sub(ELLIPSIS.len());
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(&ELLIPSIS[..budget.min(ELLIPSIS.len())]);
    out
}

/// Ordered reasons plus a parallel, more detailed diagnostic log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trail {
    pub reasons: Vec<Reason>,
    pub log: Vec<String>,
}

impl Trail {
    pub fn reason(&mut self, r: Reason) {
        self.reasons.push(r);
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    pub fn extend_reasons(&mut self, rs: impl IntoIterator<Item = Reason>) {
        self.reasons.extend(rs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn renders_scope_labels() {
        assert_eq!(
            Reason::GeoOverride(GeoScope::Country).to_string(),
            "Geo Override-Country"
        );
        assert_eq!(Reason::Sticky(StickyOutcome::Prev).to_string(), "Stickiness-prev");
    }

    #[test]
    fn short_codes_are_untouched() {
        let code = render_reason_code(&[Reason::GeoDefault, Reason::BestRtt], REASON_CODE_BUDGET);
        assert_eq!(code, "Geo Default, Best Performing Provider-RTT");
    }

    #[test]
    fn long_codes_are_cut_with_ellipsis() {
        let reasons = [
            Reason::GeoOverride(GeoScope::StateAsn),
            Reason::GeoOverride(GeoScope::Country),
            Reason::GeoDefault,
            Reason::AllUnavailableRadar,
            Reason::FallbackBestAvailability,
            Reason::DataIssue,
        ];
        let code = render_reason_code(&reasons, REASON_CODE_BUDGET);
        assert_eq!(code.chars().count(), REASON_CODE_BUDGET);
        assert!(code.ends_with("..."));
        assert!(code.starts_with("Geo Override-State-ASN"));
    }

    proptest! {
        #[test]
        fn rendered_code_never_exceeds_budget(
            picks in proptest::collection::vec(0usize..6, 0..12),
            budget in 0usize..120,
        ) {
            let all = [
                Reason::IpOverride,
                Reason::GeoDefault,
                Reason::DataIssue,
                Reason::OptimalProvider,
                Reason::WeightedRoundRobin,
                Reason::Sticky(StickyOutcome::Static),
            ];
            let reasons: Vec<Reason> = picks.into_iter().map(|i| all[i]).collect();
            let code = render_reason_code(&reasons, budget);
            prop_assert!(code.chars().count() <= budget);
        }
    }
}
