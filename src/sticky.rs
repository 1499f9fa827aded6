//! Stickiness: remember the last organic decision per client key, and only switch
//! away from it when the new winner is better by more than a margin.
//!
//! Flapping between providers defeats CDN cache warmup and connection reuse, so an
//! optimal pick is compared against the cached one before it is accepted.
//!
//! The cache is an explicit value owned by the caller and borrowed into each
//! decision; nothing here is global.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scope-independent stickiness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StickinessConfig {
    /// Capacity of the per-process cache.
    pub max_entries: usize,
    /// Providers that are never remembered.
    pub exclude_providers: Vec<String>,
}

impl Default for StickinessConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            exclude_providers: Vec::new(),
        }
    }
}

/// How an optimal pick relates to the cached decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickyOutcome {
    /// Nothing usable was cached, or the new winner cleared the margin.
    New,
    /// The cached provider was kept over a marginally better winner.
    Prev,
    /// The cached provider is also the new winner.
    Static,
}

impl StickyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StickyOutcome::New => "new",
            StickyOutcome::Prev => "prev",
            StickyOutcome::Static => "static",
        }
    }
}

/// Result of comparing an optimal pick against the cached one.
#[derive(Debug, Clone, PartialEq)]
pub struct StickyVerdict {
    pub chosen: String,
    pub outcome: StickyOutcome,
    /// `previous score * (1 + percentage / 100)`, when the cached provider was scored.
    pub previous_score: Option<f64>,
    pub candidate_score: f64,
}

/// Decide between the best-scoring `candidate` and the cached `previous` provider.
///
/// The cached provider is kept while its score inflated by `percentage` percent is
/// still at least the candidate's. A cached provider that is not among `scores`
/// (filtered out, or no data) cannot be kept.
pub fn apply_stickiness(
    candidate: &str,
    scores: &BTreeMap<String, f64>,
    previous: Option<&str>,
    percentage: f64,
) -> StickyVerdict {
    let candidate_score = scores.get(candidate).copied().unwrap_or(f64::NEG_INFINITY);
    let new = |previous_score: Option<f64>| StickyVerdict {
        chosen: candidate.to_string(),
        outcome: StickyOutcome::New,
        previous_score,
        candidate_score,
    };

    let Some(prev) = previous else {
        return new(None);
    };
    let Some(prev_raw) = scores.get(prev).copied() else {
        return new(None);
    };
    if prev == candidate {
        return StickyVerdict {
            chosen: candidate.to_string(),
            outcome: StickyOutcome::Static,
            previous_score: Some(prev_raw),
            candidate_score,
        };
    }

    let pct = if percentage.is_finite() { percentage } else { 0.0 };
    let previous_score = prev_raw * (1.0 + pct / 100.0);
    if previous_score >= candidate_score {
        return StickyVerdict {
            chosen: prev.to_string(),
            outcome: StickyOutcome::Prev,
            previous_score: Some(previous_score),
            candidate_score,
        };
    }
    new(Some(previous_score))
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    tick: u64,
}

/// Bounded least-recently-used map from client key to provider alias.
#[derive(Debug, Clone)]
pub struct StickinessCache {
    capacity: usize,
    entries: BTreeMap<String, Entry>,
    // tick -> key; the smallest tick is the least recently used.
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl StickinessCache {
    /// Create an empty cache. A zero capacity stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: BTreeMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump(&mut self) -> u64 {
        let t = self.next_tick;
        self.next_tick = self.next_tick.wrapping_add(1);
        t
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&str> {
        let tick = self.bump();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(entry.value.as_str())
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.value.as_str())
    }

    /// Insert or update `key`, evicting the least recently used entry when full.
    pub fn set(&mut self, key: &str, value: &str) {
        if self.capacity == 0 {
            return;
        }
        let tick = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.value = value.to_string();
            entry.tick = tick;
            self.recency.insert(tick, key.to_string());
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some((_, lru)) = self.recency.pop_first() {
                self.entries.remove(&lru);
            }
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                tick,
            },
        );
        self.recency.insert(tick, key.to_string());
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}
