//! Metric normalization and descriptive statistics.
//!
//! Raw probe readings live on very different scales (milliseconds vs kbps), so
//! each metric is divided by its mean across the candidates that have data.
//! The result is dimensionless and centred on 1.

use std::collections::BTreeMap;

/// Arithmetic mean of `values`, or `1.0` when the total is zero (or there are no values).
///
/// The `1.0` fallback makes the mean safe to divide by: an all-zero metric is left
/// unnormalized rather than turned into NaN.
pub fn mean_or_one<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut total = 0.0;
    let mut n = 0usize;
    for v in values {
        total += v;
        n += 1;
    }
    if n == 0 || total == 0.0 || !total.is_finite() {
        return 1.0;
    }
    total / n as f64
}

/// Population standard deviation. Empty input yields `0.0`.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// Divide every value by the mean of the map (see [`mean_or_one`]).
pub fn normalize_by_mean(metric: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let mean = mean_or_one(metric.values().copied());
    metric
        .iter()
        .map(|(k, v)| (k.clone(), v / mean))
        .collect()
}
