//! Network probe ("radar") inputs.
//!
//! A probe map associates a provider alias with one measurement. A provider
//! missing from the map has *no data*; it is never read as zero.

use std::collections::BTreeMap;

/// Per-provider measurements for one probe category.
pub type ProbeMap = BTreeMap<String, f64>;

/// Probe categories the host can supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCategory {
    /// Availability percentage in `[0, 100]`.
    Avail,
    /// HTTP round-trip time in milliseconds (lower is better).
    HttpRtt,
    /// HTTP throughput in kilobits per second (higher is better).
    HttpKbps,
}

impl ProbeCategory {
    /// Host-facing category name.
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeCategory::Avail => "avail",
            ProbeCategory::HttpRtt => "http_rtt",
            ProbeCategory::HttpKbps => "http_kbps",
        }
    }
}

impl std::fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop non-finite readings so that they behave like missing data.
#[must_use]
pub fn sanitize_probe(map: ProbeMap) -> ProbeMap {
    map.into_iter().filter(|(_, v)| v.is_finite()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_non_finite_readings() {
        let m = ProbeMap::from([
            ("a".to_string(), 1.0),
            ("b".to_string(), f64::NAN),
            ("c".to_string(), f64::INFINITY),
            ("d".to_string(), 0.0),
        ]);
        let s = sanitize_probe(m);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec!["a", "d"]);
    }
}
