//! The per-request decision envelope.
//!
//! A [`Decision`] is built once per request and handed to the host through
//! [`Decision::respond`]. It records which branch produced the answer, so callers
//! and tests can assert on the path without parsing reason strings.

use serde::{Deserialize, Serialize};

use crate::{render_reason_code, Reason, Response, StickyOutcome, REASON_CODE_BUDGET};

/// Which branch of the selector produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The client IP matched a configured address block.
    IpOverride,
    /// Exactly one provider survived filtering; scoring was skipped.
    SingleCandidate,
    /// An availability filter emptied the set; recovery picked the answer.
    AvailabilityFallback,
    /// No candidate could be scored; the default providers were used.
    DataIssue,
    /// Keep-warm weighted random pick among the top scorers.
    WeightedRoundRobin,
    /// Best score, possibly adjusted by stickiness.
    Optimal { sticky: Option<StickyOutcome> },
}

impl DecisionKind {
    /// Fallback branches answer with the error TTL and are never remembered.
    pub fn is_fallback(self) -> bool {
        matches!(self, DecisionKind::AvailabilityFallback | DecisionKind::DataIssue)
    }
}

/// A single DNS steering decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub kind: DecisionKind,
    /// Winning provider alias.
    pub provider: String,
    /// CNAME to answer with.
    pub cname: String,
    /// TTL in seconds.
    pub ttl: u32,
    /// Ordered reasons describing the branches taken.
    pub reasons: Vec<Reason>,
    /// Detailed diagnostics, parallel to `reasons`.
    pub log: Vec<String>,
}

impl Decision {
    /// Stickiness outcome of an optimal decision.
    pub fn sticky(&self) -> Option<StickyOutcome> {
        match self.kind {
            DecisionKind::Optimal { sticky } => sticky,
            _ => None,
        }
    }

    /// Reason code as reported to the host: joined reasons, bounded in length.
    pub fn reason_code(&self) -> String {
        render_reason_code(&self.reasons, REASON_CODE_BUDGET)
    }

    /// Diagnostics joined into one line.
    pub fn log_line(&self) -> String {
        self.log.join(" | ")
    }

    /// Hand the decision to the host. Each response method is called exactly once.
    pub fn respond<R: Response + ?Sized>(&self, response: &mut R) {
        response.respond(&self.provider, &self.cname);
        response.set_ttl(self.ttl);
        response.set_reason_code(&self.reason_code());
        response.log(&self.log_line());
    }
}
