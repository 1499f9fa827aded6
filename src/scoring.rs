//! Composite scoring of candidates that survived availability filtering.
//!
//! For each candidate, with RTT and throughput normalized by their means:
//!
//! ```text
//! raw   = (mix - 1) * rtt_norm + mix * kbps_norm
//! score = raw + |(1 + stddev(raw)) * min(raw)|
//! score = score - |score| * man_pen_pct / 100
//! ```
//!
//! `(mix - 1)` is never positive, so lower RTT always scores higher. The offset is
//! the same for every candidate; it only moves scores into a positive-leaning range
//! for weighted draws and does not change the ranking. Scoring is deterministic.

use std::collections::BTreeMap;

use crate::{mean_or_one, normalize_by_mean, std_dev, CandidateSet};

/// Summary of one scoring pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    /// Final score per alias.
    pub scores: BTreeMap<String, f64>,
    /// Raw composite score per alias, before offset and penalty.
    pub raw: BTreeMap<String, f64>,
    pub mean_rtt: f64,
    pub mean_kbps: f64,
    pub std_dev: f64,
    /// Offset added to every raw score.
    pub offset: f64,
}

/// Whether the candidate carries every metric that `mix` gives weight to.
pub fn has_required_metrics(c: &crate::Candidate, mix: f64) -> bool {
    (mix >= 1.0 || c.http_rtt.is_some()) && (mix <= 0.0 || c.http_kbps.is_some())
}

/// Raw composite scores. Metrics that are missing count as `0` (see
/// [`has_required_metrics`] for which ones may be missing).
pub fn raw_scores(set: &CandidateSet, mix: f64) -> (BTreeMap<String, f64>, f64, f64) {
    let rtt: BTreeMap<String, f64> = set
        .iter()
        .filter_map(|(k, c)| c.padded_rtt().map(|r| (k.clone(), r)))
        .collect();
    let kbps: BTreeMap<String, f64> = set
        .iter()
        .filter_map(|(k, c)| c.http_kbps.map(|v| (k.clone(), v)))
        .collect();
    let mean_rtt = mean_or_one(rtt.values().copied());
    let mean_kbps = mean_or_one(kbps.values().copied());
    let (rtt, kbps) = (normalize_by_mean(&rtt), normalize_by_mean(&kbps));

    let raw = set
        .keys()
        .map(|alias| {
            let r = rtt.get(alias).copied().unwrap_or(0.0);
            let k = kbps.get(alias).copied().unwrap_or(0.0);
            (alias.clone(), (mix - 1.0) * r + mix * k)
        })
        .collect();
    (raw, mean_rtt, mean_kbps)
}

/// Score every candidate in `set`, storing the result on each candidate.
pub fn score_candidates(set: &mut CandidateSet, mix: f64) -> ScoreReport {
    let (raw, mean_rtt, mean_kbps) = raw_scores(set, mix);

    let values: Vec<f64> = raw.values().copied().collect();
    let sd = std_dev(&values);
    let lowest = values.iter().copied().fold(f64::INFINITY, f64::min);
    let offset = if lowest.is_finite() {
        ((1.0 + sd) * lowest).abs()
    } else {
        0.0
    };

    let mut scores = BTreeMap::new();
    for (alias, c) in set.iter_mut() {
        let mut s = raw.get(alias).copied().unwrap_or(0.0) + offset;
        if c.man_pen_pct != 0.0 {
            s -= s.abs() * (c.man_pen_pct / 100.0);
        }
        c.score = Some(s);
        scores.insert(alias.clone(), s);
    }

    ScoreReport {
        scores,
        raw,
        mean_rtt,
        mean_kbps,
        std_dev: sd,
        offset,
    }
}

/// Exponentially reward high scorers: weights proportional to `s * e^(bias * s)` for
/// every positive `s`.
///
/// Weights are built in log space (`ln s + bias * s`) with the largest subtracted
/// before `exp`, so the top scorer gets exactly `1.0` and no weight overflows. Only
/// ratios between results are meaningful. Non-positive scores are left unchanged.
pub fn apply_bias(scores: &mut BTreeMap<String, f64>, bias: f64) {
    if bias == 0.0 || !bias.is_finite() {
        return;
    }
    let log_weight = |s: f64| s.ln() + bias * s;
    let max = scores
        .values()
        .copied()
        .filter(|s| *s > 0.0 && s.is_finite())
        .map(log_weight)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return;
    }
    for s in scores.values_mut() {
        if *s > 0.0 && s.is_finite() {
            *s = (log_weight(*s) - max).exp();
        }
    }
}

/// Aliases ordered by descending score; equal scores in ascending alias order.
pub fn rank(scores: &BTreeMap<String, f64>) -> Vec<(String, f64)> {
    let mut v: Vec<(String, f64)> = scores.iter().map(|(k, s)| (k.clone(), *s)).collect();
    v.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

/// Best, second-best and worst candidate on one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Benefit {
    pub metric: &'static str,
    pub best: (String, f64),
    pub second: (String, f64),
    pub worst: (String, f64),
}

impl Benefit {
    /// Rank `values` (higher is better unless `lower_is_better`). `None` with fewer
    /// than two values.
    pub fn of(
        metric: &'static str,
        values: &BTreeMap<String, f64>,
        lower_is_better: bool,
    ) -> Option<Self> {
        let mut v: Vec<(String, f64)> = values.iter().map(|(k, x)| (k.clone(), *x)).collect();
        if v.len() < 2 {
            return None;
        }
        v.sort_by(|a, b| {
            let ord = if lower_is_better {
                a.1.total_cmp(&b.1)
            } else {
                b.1.total_cmp(&a.1)
            };
            ord.then_with(|| a.0.cmp(&b.0))
        });
        let mut it = v.into_iter();
        let best = it.next()?;
        let second = it.next()?;
        let worst = it.last().unwrap_or_else(|| second.clone());
        Some(Self {
            metric,
            best,
            second,
            worst,
        })
    }

    /// Absolute improvement of the best over the second-best.
    pub fn over_second(&self) -> f64 {
        (self.best.1 - self.second.1).abs()
    }

    /// Absolute improvement of the best over the worst.
    pub fn over_worst(&self) -> f64 {
        (self.best.1 - self.worst.1).abs()
    }
}

impl std::fmt::Display for Benefit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} best={}({:.1}) second={}({:.1}, +{:.1}) worst={}({:.1}, +{:.1})",
            self.metric,
            self.best.0,
            self.best.1,
            self.second.0,
            self.second.1,
            self.over_second(),
            self.worst.0,
            self.worst.1,
            self.over_worst(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candidate;
    use proptest::prelude::*;

    fn cand(alias: &str, rtt: Option<f64>, kbps: Option<f64>, pen: f64) -> Candidate {
        Candidate {
            alias: alias.to_string(),
            cname: String::new(),
            man_pen_pct: pen,
            padding: 0.0,
            avail: Some(100.0),
            http_rtt: rtt,
            http_kbps: kbps,
            health: None,
            score: None,
        }
    }

    fn set(cs: Vec<Candidate>) -> CandidateSet {
        cs.into_iter().map(|c| (c.alias.clone(), c)).collect()
    }

    #[test]
    fn lowest_rtt_wins_on_pure_rtt() {
        let mut s = set(vec![
            cand("foo", Some(200.0), None, 0.0),
            cand("bar", Some(201.0), None, 0.0),
            cand("baz", Some(100.0), None, 0.0),
        ]);
        let r = score_candidates(&mut s, 0.0);
        assert_eq!(rank(&r.scores)[0].0, "baz");
        assert!(s.values().all(|c| c.score.is_some()));
    }

    #[test]
    fn highest_throughput_wins_on_pure_throughput() {
        let mut s = set(vec![
            cand("a", None, Some(5_000.0), 0.0),
            cand("b", None, Some(9_000.0), 0.0),
        ]);
        let r = score_candidates(&mut s, 1.0);
        assert_eq!(rank(&r.scores)[0].0, "b");
    }

    #[test]
    fn offset_matches_formula() {
        let mut s = set(vec![
            cand("a", Some(100.0), None, 0.0),
            cand("b", Some(300.0), None, 0.0),
        ]);
        let r = score_candidates(&mut s, 0.0);
        // mean = 200 -> raw a = -0.5, raw b = -1.5, sd = 0.5
        assert!((r.raw["a"] + 0.5).abs() < 1e-12);
        assert!((r.raw["b"] + 1.5).abs() < 1e-12);
        assert!((r.std_dev - 0.5).abs() < 1e-12);
        assert!((r.offset - 2.25).abs() < 1e-12);
        assert!((r.scores["a"] - 1.75).abs() < 1e-12);
        assert!((r.scores["b"] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn penalty_reduces_score_by_percentage() {
        let mut s = set(vec![
            cand("a", Some(100.0), None, 50.0),
            cand("b", Some(300.0), None, 0.0),
        ]);
        let r = score_candidates(&mut s, 0.0);
        assert!((r.scores["a"] - 0.875).abs() < 1e-12);
    }

    #[test]
    fn bias_rewards_high_scores_and_skips_non_positive() {
        let mut m = BTreeMap::from([
            ("a".to_string(), 2.0),
            ("b".to_string(), 1.0),
            ("c".to_string(), -1.0),
        ]);
        apply_bias(&mut m, 1.0);
        // (2 * e^2) / (1 * e^1) = 2e
        assert_eq!(m["a"], 1.0);
        assert!((m["a"] / m["b"] - 2.0 * 1f64.exp()).abs() < 1e-9);
        assert_eq!(m["c"], -1.0);
    }

    #[test]
    fn large_bias_keeps_the_top_scorer_on_top() {
        let mut m = BTreeMap::from([("best".to_string(), 3.0), ("worst".to_string(), 1.0)]);
        apply_bias(&mut m, 300.0);
        assert!(m.values().all(|w| w.is_finite()));
        assert_eq!(m["best"], 1.0);
        assert!(m["worst"] < 1e-200);

        let probs = crate::proportional_map(&m);
        assert!(probs["best"] > 0.999_999);
        assert!(probs.get("worst").copied().unwrap_or(0.0) < 1e-6);

        let mut huge = BTreeMap::from([("best".to_string(), 3.0), ("worst".to_string(), 1.0)]);
        apply_bias(&mut huge, f64::MAX / 4.0);
        assert_eq!(rank(&huge)[0].0, "best");
    }

    #[test]
    fn rank_breaks_ties_by_alias() {
        let m = BTreeMap::from([
            ("b".to_string(), 1.0),
            ("a".to_string(), 1.0),
            ("c".to_string(), 2.0),
        ]);
        let order: Vec<String> = rank(&m).into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn metric_requirements_follow_mix() {
        let rtt_only = cand("a", Some(1.0), None, 0.0);
        assert!(has_required_metrics(&rtt_only, 0.0));
        assert!(!has_required_metrics(&rtt_only, 0.5));
        assert!(!has_required_metrics(&rtt_only, 1.0));
    }

    #[test]
    fn scoring_is_deterministic() {
        let build = || {
            set(vec![
                cand("a", Some(120.0), Some(3_000.0), 10.0),
                cand("b", Some(80.0), Some(2_000.0), 0.0),
                cand("c", Some(95.0), Some(4_000.0), 0.0),
            ])
        };
        let (mut s1, mut s2) = (build(), build());
        assert_eq!(score_candidates(&mut s1, 0.4), score_candidates(&mut s2, 0.4));
    }

    #[test]
    fn benefit_ranks_by_direction() {
        let rtt = BTreeMap::from([
            ("foo".to_string(), 200.0),
            ("bar".to_string(), 201.0),
            ("baz".to_string(), 100.0),
        ]);
        let b = Benefit::of("rtt", &rtt, true).unwrap();
        assert_eq!(b.best.0, "baz");
        assert_eq!(b.second.0, "foo");
        assert_eq!(b.worst.0, "bar");
        assert_eq!(b.over_second(), 100.0);
        assert_eq!(b.over_worst(), 101.0);
        assert_eq!(
            b.to_string(),
            "rtt best=baz(100.0) second=foo(200.0, +100.0) worst=bar(201.0, +101.0)"
        );

        let kbps = BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), 3.0)]);
        let b = Benefit::of("kbps", &kbps, false).unwrap();
        assert_eq!(b.best.0, "b");
        assert_eq!(b.worst, b.second);
        assert!(Benefit::of("kbps", &BTreeMap::new(), false).is_none());
    }

    #[test]
    fn lower_rtt_can_shrink_final_score_but_not_rank() {
        let run = |own: f64| {
            let mut s = set(vec![
                cand("me", Some(own), None, 0.0),
                cand("other", Some(100.0), None, 0.0),
            ]);
            score_candidates(&mut s, 0.0).scores
        };
        let slow = run(300.0);
        let fast = run(100.0);
        // The offset follows the spread of raw scores, which collapses here.
        assert!((slow["me"] - 0.75).abs() < 1e-12);
        assert!(fast["me"].abs() < 1e-12);
        assert_eq!(rank(&slow)[0].0, "other");
        assert_eq!(rank(&fast)[0].0, "me");
    }

    proptest! {
        /// Monotonicity holds on the raw score. The final score adds an offset that
        /// depends on every candidate, so only raw score and ranking are monotone.
        #[test]
        fn lower_rtt_never_lowers_raw_score(
            mix in 0.0f64..=1.0,
            others in proptest::collection::vec((1.0f64..2_000.0, 1.0f64..50_000.0), 1..5),
            kbps in 1.0f64..50_000.0,
            rtt in 2.0f64..2_000.0,
            cut in 0.0f64..1.0,
        ) {
            let build = |own_rtt: f64| {
                let mut cs = vec![cand("me", Some(own_rtt), Some(kbps), 0.0)];
                for (i, (r, k)) in others.iter().enumerate() {
                    cs.push(cand(&format!("o{i}"), Some(*r), Some(*k), 0.0));
                }
                set(cs)
            };
            let lower = rtt * cut;
            let (before, _, _) = raw_scores(&build(rtt), mix);
            let (after, _, _) = raw_scores(&build(lower), mix);
            prop_assert!(after["me"] >= before["me"] - 1e-9,
                "before={} after={}", before["me"], after["me"]);
        }
    }
}
