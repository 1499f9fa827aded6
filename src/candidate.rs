//! Providers, per-request telemetry, and the candidate set built from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{ClientContext, HealthMap, HealthStatus, ProbeMap, ProviderOverride};

/// Static definition of one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderDef {
    /// CNAME answered when this provider wins.
    pub cname: String,
    /// Manual penalty, in percent of the provider's score.
    pub man_pen_pct: f64,
    /// Milliseconds added to the provider's raw RTT.
    pub padding: f64,
    /// If set, only clients in these countries may use the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
    /// If set, only clients in these markets may use the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markets: Option<Vec<String>>,
    /// Clients in these countries may never use the provider.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub except_countries: Vec<String>,
}

impl ProviderDef {
    /// Whether the inclusion predicates admit `client`.
    ///
    /// An unknown client country or market never satisfies an allow-list.
    pub fn admits(&self, client: &ClientContext) -> bool {
        let listed = |list: &Option<Vec<String>>, value: &Option<String>| match list {
            None => true,
            Some(l) => value.as_ref().is_some_and(|v| l.contains(v)),
        };
        if !listed(&self.countries, &client.country) || !listed(&self.markets, &client.market) {
            return false;
        }
        !client
            .country
            .as_ref()
            .is_some_and(|c| self.except_countries.contains(c))
    }
}

/// Read-only telemetry joined onto candidates for one request.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub avail: ProbeMap,
    pub http_rtt: ProbeMap,
    pub http_kbps: ProbeMap,
    pub health: HealthMap,
}

/// A provider still eligible at some stage of the decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub alias: String,
    pub cname: String,
    pub man_pen_pct: f64,
    pub padding: f64,
    pub avail: Option<f64>,
    pub http_rtt: Option<f64>,
    pub http_kbps: Option<f64>,
    pub health: Option<HealthStatus>,
    pub score: Option<f64>,
}

impl Candidate {
    /// Health check reports the provider as available.
    pub fn health_ok(&self) -> bool {
        self.health.as_ref().is_some_and(HealthStatus::is_available)
    }

    /// Join a provider definition, its effective override and `telemetry`.
    pub fn build(
        alias: &str,
        def: &ProviderDef,
        over: Option<&ProviderOverride>,
        telemetry: &Telemetry,
    ) -> Self {
        Candidate {
            alias: alias.to_string(),
            cname: def.cname.clone(),
            man_pen_pct: over.and_then(|o| o.man_pen_pct).unwrap_or(def.man_pen_pct),
            padding: over.and_then(|o| o.padding).unwrap_or(def.padding),
            avail: telemetry.avail.get(alias).copied(),
            http_rtt: telemetry.http_rtt.get(alias).copied(),
            http_kbps: telemetry.http_kbps.get(alias).copied(),
            health: telemetry.health.get(alias).cloned(),
            score: None,
        }
    }

    /// RTT including configured padding.
    pub fn padded_rtt(&self) -> Option<f64> {
        self.http_rtt.map(|r| r + self.padding)
    }
}

/// Candidates keyed by alias; iteration order is the alias order.
pub type CandidateSet = BTreeMap<String, Candidate>;

/// Build the candidate set for `aliases`, applying inclusion predicates and
/// per-provider overrides, and joining `telemetry` onto each candidate.
///
/// Aliases missing from `table` are skipped.
pub fn seed_candidates(
    table: &BTreeMap<String, ProviderDef>,
    aliases: &[String],
    overrides: &BTreeMap<String, ProviderOverride>,
    client: &ClientContext,
    telemetry: &Telemetry,
) -> CandidateSet {
    let mut out = CandidateSet::new();
    for alias in aliases {
        let Some(def) = table.get(alias) else {
            warn!(%alias, "resolved provider is not defined; skipping");
            continue;
        };
        if !def.admits(client) {
            trace!(%alias, "provider excluded by inclusion predicates");
            continue;
        }
        out.insert(
            alias.clone(),
            Candidate::build(alias, def, overrides.get(alias), telemetry),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(country: Option<&str>, market: Option<&str>) -> ClientContext {
        ClientContext {
            country: country.map(str::to_string),
            market: market.map(str::to_string),
            ..ClientContext::default()
        }
    }

    #[test]
    fn allow_and_deny_lists() {
        let def = ProviderDef {
            countries: Some(vec!["US".into(), "CA".into()]),
            except_countries: vec!["CA".into()],
            ..ProviderDef::default()
        };
        assert!(def.admits(&client(Some("US"), None)));
        assert!(!def.admits(&client(Some("CA"), None)));
        assert!(!def.admits(&client(Some("FR"), None)));
        assert!(!def.admits(&client(None, None)));

        let open = ProviderDef::default();
        assert!(open.admits(&client(None, None)));

        let market_only = ProviderDef {
            markets: Some(vec!["EU".into()]),
            ..ProviderDef::default()
        };
        assert!(market_only.admits(&client(Some("FR"), Some("EU"))));
        assert!(!market_only.admits(&client(Some("US"), Some("NA"))));
    }

    #[test]
    fn seeding_joins_telemetry_and_overrides() {
        let table = BTreeMap::from([
            (
                "foo".to_string(),
                ProviderDef {
                    cname: "foo.example.net".into(),
                    man_pen_pct: 5.0,
                    ..ProviderDef::default()
                },
            ),
            ("bar".to_string(), ProviderDef::default()),
        ]);
        let overrides = BTreeMap::from([(
            "foo".to_string(),
            ProviderOverride {
                man_pen_pct: None,
                padding: Some(12.0),
            },
        )]);
        let telemetry = Telemetry {
            http_rtt: ProbeMap::from([("foo".to_string(), 100.0)]),
            ..Telemetry::default()
        };
        let aliases = vec!["foo".to_string(), "bar".to_string(), "ghost".to_string()];
        let set = seed_candidates(&table, &aliases, &overrides, &client(None, None), &telemetry);

        assert_eq!(set.len(), 2);
        let foo = &set["foo"];
        assert_eq!(foo.man_pen_pct, 5.0);
        assert_eq!(foo.padding, 12.0);
        assert_eq!(foo.padded_rtt(), Some(112.0));
        assert_eq!(set["bar"].http_rtt, None);
    }
}
