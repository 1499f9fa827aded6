//! Geo/network override resolution.
//!
//! Scopes are walked in the configured order (most specific first). Each matching
//! scope contributes only the fields that are still unset; once every field is set
//! the walk stops, and whatever is left is taken from the defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Reason, ScopeSettings, Settings};

/// A geographic or network scope a setting can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoScope {
    ResolverIp,
    StateAsn,
    RegionAsn,
    CountryAsn,
    MarketAsn,
    Asn,
    State,
    Region,
    Country,
    Market,
}

impl GeoScope {
    /// Most to least specific. Used when no explicit order is configured.
    pub const DEFAULT_ORDER: [GeoScope; 10] = [
        GeoScope::ResolverIp,
        GeoScope::StateAsn,
        GeoScope::RegionAsn,
        GeoScope::CountryAsn,
        GeoScope::MarketAsn,
        GeoScope::Asn,
        GeoScope::State,
        GeoScope::Region,
        GeoScope::Country,
        GeoScope::Market,
    ];

    /// Human-readable label used in reason codes.
    pub fn label(self) -> &'static str {
        match self {
            GeoScope::ResolverIp => "Resolver",
            GeoScope::StateAsn => "State-ASN",
            GeoScope::RegionAsn => "Region-ASN",
            GeoScope::CountryAsn => "Country-ASN",
            GeoScope::MarketAsn => "Market-ASN",
            GeoScope::Asn => "ASN",
            GeoScope::State => "State",
            GeoScope::Region => "Region",
            GeoScope::Country => "Country",
            GeoScope::Market => "Market",
        }
    }
}

/// What the host knows about the requesting client. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientContext {
    pub country: Option<String>,
    pub market: Option<String>,
    pub asn: Option<u32>,
    pub state: Option<String>,
    pub region: Option<String>,
    pub resolver_ip_address: Option<String>,
    pub ip_address: Option<String>,
}

impl ClientContext {
    /// Key under which `scope` settings for this client are looked up.
    ///
    /// Combined scopes join their parts with `-`, e.g. `"CA-7922"` for `StateAsn`.
    /// `None` when any part is unknown.
    pub fn scope_value(&self, scope: GeoScope) -> Option<String> {
        let with_asn = |part: &Option<String>| {
            let p = part.as_deref()?;
            let asn = self.asn?;
            Some(format!("{p}-{asn}"))
        };
        match scope {
            GeoScope::ResolverIp => self.resolver_ip_address.clone(),
            GeoScope::StateAsn => with_asn(&self.state),
            GeoScope::RegionAsn => with_asn(&self.region),
            GeoScope::CountryAsn => with_asn(&self.country),
            GeoScope::MarketAsn => with_asn(&self.market),
            GeoScope::Asn => self.asn.map(|a| a.to_string()),
            GeoScope::State => self.state.clone(),
            GeoScope::Region => self.region.clone(),
            GeoScope::Country => self.country.clone(),
            GeoScope::Market => self.market.clone(),
        }
    }

    /// Stickiness cache key: `"{country}-{asn}"`, or `None` when both are unknown.
    pub fn sticky_key(&self) -> Option<String> {
        if self.country.is_none() && self.asn.is_none() {
            return None;
        }
        let country = self.country.as_deref().unwrap_or("");
        let asn = self.asn.map(|a| a.to_string()).unwrap_or_default();
        Some(format!("{country}-{asn}"))
    }
}

/// Sparse settings per scope, keyed by the scope value (see [`ClientContext::scope_value`]).
pub type GeoSettings = BTreeMap<GeoScope, BTreeMap<String, ScopeSettings>>;

/// Result of resolving settings for one client.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub settings: Settings,
    /// Reasons contributed by resolution, in order.
    pub reasons: Vec<Reason>,
}

/// Resolve the effective settings for `client`.
pub fn resolve_settings(
    order: &[GeoScope],
    geo: &GeoSettings,
    defaults: &Settings,
    client: &ClientContext,
) -> Resolution {
    let mut working = ScopeSettings::default();
    let mut reasons = Vec::new();

    for &scope in order {
        let Some(value) = client.scope_value(scope) else {
            continue;
        };
        let Some(over) = geo.get(&scope).and_then(|m| m.get(&value)) else {
            trace!(?scope, %value, "no override");
            continue;
        };
        if working.merge_defaults(over) {
            debug!(?scope, %value, "geo override applied");
            reasons.push(Reason::GeoOverride(scope));
        }
        if working.is_complete() {
            break;
        }
    }

    let (settings, used_default) = working.finish(defaults);
    if used_default {
        reasons.push(Reason::GeoDefault);
    }
    Resolution { settings, reasons }
}
