//! Allocation helpers: scores to probabilities, and draws from them.
//!
//! Distributions are `BTreeMap`s so iteration (and therefore the CDF walk) is in a
//! stable alias order; with a seeded RNG, draws are reproducible.

use std::collections::BTreeMap;

use rand::Rng;

/// Turn scores into a distribution proportional to score.
///
/// Non-positive and non-finite scores get no mass and are left out. Returns an
/// empty map when nothing has positive score.
pub fn proportional_map(scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = scores
        .values()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .sum();
    if total <= 0.0 || !total.is_finite() {
        return BTreeMap::new();
    }
    scores
        .iter()
        .filter(|(_, v)| v.is_finite() && **v > 0.0)
        .map(|(k, v)| (k.clone(), v / total))
        .collect()
}

/// Sample one key from a probability map by walking its CDF.
///
/// If rounding leaves the draw past the final bucket, the last key is returned.
pub fn sample_from<'a, R: Rng>(
    probs: &'a BTreeMap<String, f64>,
    rng: &mut R,
) -> Option<&'a String> {
    let r: f64 = rng.random();
    let mut cdf = 0.0;
    for (k, p) in probs {
        cdf += *p;
        if r < cdf {
            return Some(k);
        }
    }
    probs.keys().next_back()
}

/// Uniformly random element of `items`.
pub fn uniform_pick<'a, T, R: Rng>(items: &'a [T], rng: &mut R) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn non_positive_scores_get_no_mass() {
        let m = BTreeMap::from([
            ("a".to_string(), 3.0),
            ("b".to_string(), 1.0),
            ("c".to_string(), 0.0),
            ("d".to_string(), -2.0),
        ]);
        let p = proportional_map(&m);
        assert_eq!(p.len(), 2);
        assert!((p["a"] - 0.75).abs() < 1e-12);
        assert!((p["b"] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn all_non_positive_is_empty() {
        let m = BTreeMap::from([("a".to_string(), 0.0), ("b".to_string(), -1.0)]);
        assert!(proportional_map(&m).is_empty());
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_from(&BTreeMap::new(), &mut rng).is_none());
    }

    #[test]
    fn sampling_frequencies_follow_weights() {
        let p = proportional_map(&BTreeMap::from([
            ("a".to_string(), 9.0),
            ("b".to_string(), 1.0),
        ]));
        let mut rng = StdRng::seed_from_u64(42);
        let mut a = 0u32;
        for _ in 0..10_000 {
            if sample_from(&p, &mut rng).map(String::as_str) == Some("a") {
                a += 1;
            }
        }
        assert!((8_500..9_500).contains(&a), "a={a}");
    }

    proptest! {
        #[test]
        fn proportional_map_is_a_distribution(
            kvs in proptest::collection::vec(("[a-z]{1,8}", -1.0e6f64..1.0e6f64), 0..20),
        ) {
            let m: BTreeMap<String, f64> = kvs.into_iter().collect();
            let p = proportional_map(&m);
            if !p.is_empty() {
                let sum: f64 = p.values().sum();
                prop_assert!((sum - 1.0).abs() < 1e-9, "sum={}", sum);
                for (k, v) in &p {
                    prop_assert!(m[k] > 0.0);
                    prop_assert!(*v > 0.0 && *v <= 1.0);
                }
            }
        }

        #[test]
        fn uniform_pick_is_a_member(n in 1usize..20, seed in any::<u64>()) {
            let items: Vec<usize> = (0..n).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            let x = uniform_pick(&items, &mut rng).copied();
            prop_assert!(x.is_some_and(|x| x < n));
        }
    }
}
