//! The per-request decision pipeline: the "front door" of the crate.
//!
//! [`Mixer`] owns the validated configuration and exposes a small interface:
//!
//! ```text
//! let mixer = Mixer::new(config)?;     // validate once
//! mixer.init(&mut host_config);         // declare providers to the host
//! let mut cache = mixer.new_cache();    // long-lived, caller-owned
//! mixer.handle(&request, &mut response, &mut cache, &mut rng);
//! ```
//!
//! Each request walks these stages, stopping at the first that produces an answer:
//!
//! 1. **IP override**: a client IP inside a configured block gets its provider.
//! 2. **Settings**: per-field geo override resolution, then defaults.
//! 3. **Candidates**: resolved providers that admit the client, joined with telemetry.
//! 4. **Availability**: network-probe then health-check filters; if either empties
//!    the set, recover over the pre-filter set.
//! 5. **Single survivor**: answered without scoring.
//! 6. **Scoring**: candidates with the metrics the mix needs. None left is a data issue.
//! 7. **Weighted round robin**: occasional keep-warm draw among the top scorers.
//! 8. **Optimal**: best score, adjusted by stickiness.
//!
//! Request handling never fails. Configuration problems are rejected by
//! [`Mixer::new`]; telemetry problems degrade to a fallback with the error TTL.

use std::collections::BTreeMap;
use std::net::IpAddr;

use rand::Rng;
use tracing::{debug, trace};

use crate::{
    apply_bias, apply_stickiness, filter_available, has_required_metrics, parse_health_data,
    proportional_map, rank, recover, resolve_settings, sample_from, sanitize_probe,
    score_candidates, seed_candidates, AvailabilityPolicy, Benefit, Candidate, CandidateSet,
    ConfigError, Decision, DecisionKind, FilterOutcome, HostConfig, MixerConfig, ProbeCategory,
    Reason, Request, Response, Settings, StickinessCache, Telemetry, Trail,
};

/// Stateless decision engine over a validated [`MixerConfig`].
///
/// The only state that outlives a request is the [`StickinessCache`], which the
/// caller owns and lends to each decision.
#[derive(Debug, Clone)]
pub struct Mixer {
    config: MixerConfig,
    defaults: Settings,
    // Answer of last resort when even the default providers yield no candidate.
    last_resort: (String, String),
}

impl Mixer {
    /// Validate `config` and build a mixer.
    pub fn new(config: MixerConfig) -> Result<Self, ConfigError> {
        let defaults = config.validate()?;
        let alias = defaults
            .providers
            .first()
            .cloned()
            .ok_or(ConfigError::NoDefaultProviders)?;
        let cname = config
            .providers
            .get(&alias)
            .map(|d| d.cname.clone())
            .unwrap_or_default();
        Ok(Self {
            config,
            defaults,
            last_resort: (alias, cname),
        })
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Self::new(MixerConfig::from_json(s)?)
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// Fully resolved default settings.
    pub fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Declare every provider in the table to the host, in alias order.
    pub fn init<H: HostConfig + ?Sized>(&self, host: &mut H) {
        for alias in self.config.providers.keys() {
            host.require_provider(alias);
        }
    }

    /// A stickiness cache sized from the configuration.
    pub fn new_cache(&self) -> StickinessCache {
        StickinessCache::new(self.config.stickiness.max_entries)
    }

    /// Decide and hand the result to `response`.
    pub fn handle<Q, P, R>(
        &self,
        request: &Q,
        response: &mut P,
        cache: &mut StickinessCache,
        rng: &mut R,
    ) -> Decision
    where
        Q: Request + ?Sized,
        P: Response + ?Sized,
        R: Rng,
    {
        let decision = self.decide(request, cache, rng);
        decision.respond(response);
        decision
    }

    /// Produce a decision for one request.
    pub fn decide<Q, R>(&self, request: &Q, cache: &mut StickinessCache, rng: &mut R) -> Decision
    where
        Q: Request + ?Sized,
        R: Rng,
    {
        let client = request.client();

        // --- IP override ---
        if let Some(d) = self.ip_override(client.ip_address.as_deref()) {
            return d;
        }

        // --- Settings ---
        let resolution = resolve_settings(
            self.config.order(),
            &self.config.geo_settings,
            &self.defaults,
            client,
        );
        let settings = resolution.settings;
        let mut trail = Trail::default();
        trail.extend_reasons(resolution.reasons);
        trail.log(format!("providers={}", settings.providers.join(",")));

        // --- Candidates ---
        let telemetry = self.telemetry(request);
        let candidates = seed_candidates(
            &self.config.providers,
            &settings.providers,
            &settings.provider_overrides,
            client,
            &telemetry,
        );
        if candidates.is_empty() {
            debug!("no candidate admits the client");
            return self.data_issue(trail, &settings, &telemetry, rng);
        }

        // --- Availability ---
        let policy = AvailabilityPolicy::from(&settings);
        let survivors = match filter_available(&candidates, policy, &telemetry) {
            FilterOutcome::Survivors(s) => s,
            FilterOutcome::Emptied { reason } => {
                trail.reason(reason);
                let kind = DecisionKind::AvailabilityFallback;
                return self.recover_from(trail, &candidates, &settings, kind, rng);
            }
        };

        // --- Single survivor ---
        if survivors.len() == 1 {
            if let Some(c) = survivors.values().next() {
                debug!(provider = %c.alias, "single candidate after filtering");
                trail.reason(Reason::OneProviderAvailable);
                return finish(trail, DecisionKind::SingleCandidate, c, settings.default_ttl);
            }
        }

        // --- Scoring ---
        let mix = settings.rtt_tp_mix;
        let mut scored: CandidateSet = survivors
            .into_iter()
            .filter(|(_, c)| has_required_metrics(c, mix))
            .collect();
        if scored.is_empty() {
            debug!(mix, "no candidate carries the metrics the mix requires");
            return self.data_issue(trail, &settings, &telemetry, rng);
        }
        let report = score_candidates(&mut scored, mix);
        trail.log(format!(
            "mean_rtt={:.3} mean_kbps={:.3} std_dev={:.4} offset={:.4}",
            report.mean_rtt, report.mean_kbps, report.std_dev, report.offset
        ));
        trail.log(format!(
            "scores={}",
            report
                .scores
                .iter()
                .map(|(k, s)| format!("{k}:{s:.4}"))
                .collect::<Vec<_>>()
                .join(",")
        ));
        log_benefits(&mut trail, &scored);

        // --- Weighted round robin ---
        if let Some(c) = weighted_pick(&settings, &report.scores, &scored, rng) {
            debug!(provider = %c.alias, "weighted round robin pick");
            trail.reason(Reason::WeightedRoundRobin);
            return finish(trail, DecisionKind::WeightedRoundRobin, c, settings.default_ttl);
        }

        // --- Optimal ---
        let ranked = rank(&report.scores);
        let Some((best, _)) = ranked.first() else {
            return self.data_issue(trail, &settings, &telemetry, rng);
        };
        trail.reason(if mix <= 0.0 {
            Reason::BestRtt
        } else if mix >= 1.0 {
            Reason::BestThroughput
        } else {
            Reason::OptimalProvider
        });

        let key = client.sticky_key();
        let (chosen, sticky) = match (&key, settings.stickiness_enabled) {
            (Some(key), true) => {
                let previous = cache.get(key).map(str::to_string);
                let v = apply_stickiness(
                    best,
                    &report.scores,
                    previous.as_deref(),
                    settings.stickiness_percentage,
                );
                debug!(%key, chosen = %v.chosen, outcome = v.outcome.as_str(), "stickiness applied");
                trail.reason(Reason::Sticky(v.outcome));
                trail.log(format!(
                    "sticky {} prev={} prev_score={} cand_score={:.4}",
                    v.outcome.as_str(),
                    previous.as_deref().unwrap_or("-"),
                    v.previous_score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}")),
                    v.candidate_score,
                ));
                (v.chosen, Some(v.outcome))
            }
            _ => (best.clone(), None),
        };

        let Some(winner) = scored.get(&chosen) else {
            return self.data_issue(trail, &settings, &telemetry, rng);
        };
        let kind = DecisionKind::Optimal { sticky };
        let decision = finish(trail, kind, winner, settings.default_ttl);
        self.remember(cache, key.as_deref(), &decision, settings.stickiness_enabled);
        decision
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn ip_override(&self, ip: Option<&str>) -> Option<Decision> {
        let ip: IpAddr = match ip?.parse() {
            Ok(ip) => ip,
            Err(e) => {
                trace!(error = %e, "client ip is not an address");
                return None;
            }
        };
        let block = self.config.ip_override(ip)?;
        let cname = self
            .config
            .providers
            .get(&block.provider)
            .map(|d| d.cname.clone())
            .unwrap_or_default();
        debug!(%ip, network = %block.network, provider = %block.provider, "ip override");
        Some(Decision {
            kind: DecisionKind::IpOverride,
            provider: block.provider.clone(),
            cname,
            ttl: self.defaults.default_ttl,
            reasons: vec![Reason::IpOverride],
            log: vec![format!("ip={ip} network={}", block.network)],
        })
    }

    fn telemetry<Q: Request + ?Sized>(&self, request: &Q) -> Telemetry {
        Telemetry {
            avail: sanitize_probe(request.probe(ProbeCategory::Avail)),
            http_rtt: sanitize_probe(request.probe(ProbeCategory::HttpRtt)),
            http_kbps: sanitize_probe(request.probe(ProbeCategory::HttpKbps)),
            health: parse_health_data(&request.data(&self.config.health_data)),
        }
    }

    /// Nothing reached scoring: answer from the default provider list.
    fn data_issue<R: Rng>(
        &self,
        mut trail: Trail,
        settings: &Settings,
        telemetry: &Telemetry,
        rng: &mut R,
    ) -> Decision {
        trail.reason(Reason::DataIssue);
        let pool: CandidateSet = self
            .defaults
            .providers
            .iter()
            .filter_map(|alias| {
                let def = self.config.providers.get(alias)?;
                let over = self.defaults.provider_overrides.get(alias);
                Some((alias.clone(), Candidate::build(alias, def, over, telemetry)))
            })
            .collect();
        self.recover_from(trail, &pool, settings, DecisionKind::DataIssue, rng)
    }

    fn recover_from<R: Rng>(
        &self,
        mut trail: Trail,
        pool: &CandidateSet,
        settings: &Settings,
        kind: DecisionKind,
        rng: &mut R,
    ) -> Decision {
        let picked = recover(pool, rng)
            .and_then(|(alias, reason)| pool.get(&alias).map(|c| (c, reason)));
        match picked {
            Some((c, reason)) => {
                debug!(provider = %c.alias, %reason, "fallback");
                trail.reason(reason);
                finish(trail, kind, c, settings.error_ttl)
            }
            None => {
                let (alias, cname) = &self.last_resort;
                debug!(provider = %alias, "fallback to first default provider");
                trail.reason(Reason::FallbackRandom);
                Decision {
                    kind,
                    provider: alias.clone(),
                    cname: cname.clone(),
                    ttl: settings.error_ttl,
                    reasons: trail.reasons,
                    log: trail.log,
                }
            }
        }
    }

    fn remember(
        &self,
        cache: &mut StickinessCache,
        key: Option<&str>,
        decision: &Decision,
        enabled: bool,
    ) {
        let Some(key) = key else {
            return;
        };
        if !enabled || !matches!(decision.kind, DecisionKind::Optimal { .. }) {
            return;
        }
        if self.config.stickiness.exclude_providers.contains(&decision.provider) {
            trace!(provider = %decision.provider, "provider excluded from stickiness");
            return;
        }
        cache.set(key, &decision.provider);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn finish(trail: Trail, kind: DecisionKind, c: &Candidate, ttl: u32) -> Decision {
    Decision {
        kind,
        provider: c.alias.clone(),
        cname: c.cname.clone(),
        ttl,
        reasons: trail.reasons,
        log: trail.log,
    }
}

/// Keep-warm draw. `None` when the branch is not taken or its pool is empty.
fn weighted_pick<'a, R: Rng>(
    settings: &Settings,
    scores: &BTreeMap<String, f64>,
    scored: &'a CandidateSet,
    rng: &mut R,
) -> Option<&'a Candidate> {
    if !settings.wrr_enabled || !settings.wrr_num_providers.is_enabled() {
        return None;
    }
    let draw: f64 = rng.random_range(0.0..100.0);
    if draw >= settings.wrr_percentage {
        return None;
    }
    let mut biased = scores.clone();
    apply_bias(&mut biased, settings.wrr_bias);
    let ranked = rank(&biased);
    let top = settings.wrr_num_providers.take(ranked.len());
    let pool = ranked.into_iter().take(top).collect();
    let probs = proportional_map(&pool);
    let alias = sample_from(&probs, rng)?;
    scored.get(alias)
}

fn log_benefits(trail: &mut Trail, scored: &CandidateSet) {
    let rtt = scored
        .iter()
        .filter_map(|(k, c)| c.padded_rtt().map(|r| (k.clone(), r)))
        .collect();
    let kbps = scored
        .iter()
        .filter_map(|(k, c)| c.http_kbps.map(|v| (k.clone(), v)))
        .collect();
    for b in [Benefit::of("rtt", &rtt, true), Benefit::of("kbps", &kbps, false)]
        .into_iter()
        .flatten()
    {
        trail.log(b.to_string());
    }
}

