//! Per-scope settings and their per-field merge.
//!
//! [`ScopeSettings`] is the sparse form attached to a geo/network scope (and to the
//! defaults): every field is optional. Resolution merges scopes from most to least
//! specific with [`ScopeSettings::merge_defaults`], then closes the remaining gaps
//! from the fully populated defaults with [`ScopeSettings::finish`], producing a
//! [`Settings`] with no optional fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ConfigError;

/// How many top-scoring providers take part in a weighted round robin draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopN {
    /// Every scored provider.
    All,
    /// The `n` best providers. `0` disables weighted round robin.
    Top(usize),
}

impl TopN {
    /// Whether this setting allows a weighted round robin draw at all.
    pub fn is_enabled(self) -> bool {
        !matches!(self, TopN::Top(0))
    }

    /// Number of providers to keep out of `available`.
    pub fn take(self, available: usize) -> usize {
        match self {
            TopN::All => available,
            TopN::Top(n) => n.min(available),
        }
    }
}

/// An explicit JSON `null` means every provider; an absent field still inherits.
fn null_as_all<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TopN>, D::Error> {
    Ok(Some(Option::<TopN>::deserialize(d)?.unwrap_or(TopN::All)))
}

/// Per-provider values that a scope may override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderOverride {
    /// Manual penalty, in percent of the provider's score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub man_pen_pct: Option<f64>,
    /// Milliseconds added to the provider's raw RTT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<f64>,
}

impl ProviderOverride {
    fn merge_defaults(&mut self, fallback: &ProviderOverride) -> bool {
        fill(&mut self.man_pen_pct, &fallback.man_pen_pct) | fill(&mut self.padding, &fallback.padding)
    }
}

/// Sparse settings attached to one scope. `None` means "inherit".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeSettings {
    /// Provider aliases eligible for this scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
    /// TTL (seconds) for normal decisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u32>,
    /// TTL (seconds) for fallback decisions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_ttl: Option<u32>,
    /// Filter candidates by network-probe availability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_radar_availability: Option<bool>,
    /// Minimum network-probe availability (percent) to stay a candidate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radar_availability_threshold: Option<f64>,
    /// Filter candidates by the health-check availability flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_sonar_availability: Option<bool>,
    /// Weight in `[0, 1]`; `0` scores on RTT only, `1` on throughput only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt_tp_mix: Option<f64>,
    /// Enable weighted round robin among the top scorers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrr_enabled: Option<bool>,
    /// Percentage of requests that take the weighted round robin branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrr_percentage: Option<f64>,
    /// Size of the weighted round robin pool. `null` is read as [`TopN::All`].
    #[serde(deserialize_with = "null_as_all", skip_serializing_if = "Option::is_none")]
    pub wrr_num_providers: Option<TopN>,
    /// Exponential bias applied to scores before the weighted draw; `0` disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrr_bias: Option<f64>,
    /// Prefer the previously cached decision for the same client key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stickiness_enabled: Option<bool>,
    /// Score margin (percent) a new winner must beat the cached provider by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stickiness_percentage: Option<f64>,
    /// Per-provider overrides, merged per provider and per field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_overrides: Option<BTreeMap<String, ProviderOverride>>,
}

fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    if dst.is_none() {
        if let Some(v) = src {
            *dst = Some(v.clone());
            return true;
        }
    }
    false
}

impl ScopeSettings {
    /// Copy every field of `fallback` that is still unset here.
    ///
    /// Returns `true` when at least one field was inherited. Fields already set are
    /// never overwritten.
    pub fn merge_defaults(&mut self, fallback: &ScopeSettings) -> bool {
        let mut inherited = false;
        inherited |= fill(&mut self.providers, &fallback.providers);
        inherited |= fill(&mut self.default_ttl, &fallback.default_ttl);
        inherited |= fill(&mut self.error_ttl, &fallback.error_ttl);
        inherited |= fill(&mut self.use_radar_availability, &fallback.use_radar_availability);
        inherited |= fill(
            &mut self.radar_availability_threshold,
            &fallback.radar_availability_threshold,
        );
        inherited |= fill(&mut self.use_sonar_availability, &fallback.use_sonar_availability);
        inherited |= fill(&mut self.rtt_tp_mix, &fallback.rtt_tp_mix);
        inherited |= fill(&mut self.wrr_enabled, &fallback.wrr_enabled);
        inherited |= fill(&mut self.wrr_percentage, &fallback.wrr_percentage);
        inherited |= fill(&mut self.wrr_num_providers, &fallback.wrr_num_providers);
        inherited |= fill(&mut self.wrr_bias, &fallback.wrr_bias);
        inherited |= fill(&mut self.stickiness_enabled, &fallback.stickiness_enabled);
        inherited |= fill(&mut self.stickiness_percentage, &fallback.stickiness_percentage);

        if let Some(src) = &fallback.provider_overrides {
            match self.provider_overrides.as_mut() {
                Some(dst) => {
                    for (alias, o) in src {
                        match dst.get_mut(alias) {
                            Some(existing) => inherited |= existing.merge_defaults(o),
                            None => {
                                dst.insert(alias.clone(), o.clone());
                                inherited = true;
                            }
                        }
                    }
                }
                None => {
                    self.provider_overrides = Some(src.clone());
                    inherited = true;
                }
            }
        }
        inherited
    }

    /// Whether every field is set, so less specific scopes cannot contribute anything.
    pub fn is_complete(&self) -> bool {
        self.providers.is_some()
            && self.default_ttl.is_some()
            && self.error_ttl.is_some()
            && self.use_radar_availability.is_some()
            && self.radar_availability_threshold.is_some()
            && self.use_sonar_availability.is_some()
            && self.rtt_tp_mix.is_some()
            && self.wrr_enabled.is_some()
            && self.wrr_percentage.is_some()
            && self.wrr_num_providers.is_some()
            && self.wrr_bias.is_some()
            && self.stickiness_enabled.is_some()
            && self.stickiness_percentage.is_some()
            && self.provider_overrides.is_some()
    }

    /// Fill every remaining gap from `defaults`.
    ///
    /// The flag is `true` when the defaults supplied at least one value.
    pub fn finish(self, defaults: &Settings) -> (Settings, bool) {
        let mut used = false;
        let mut take = |set: bool| used |= !set;

        take(self.providers.is_some());
        take(self.default_ttl.is_some());
        take(self.error_ttl.is_some());
        take(self.use_radar_availability.is_some());
        take(self.radar_availability_threshold.is_some());
        take(self.use_sonar_availability.is_some());
        take(self.rtt_tp_mix.is_some());
        take(self.wrr_enabled.is_some());
        take(self.wrr_percentage.is_some());
        take(self.wrr_num_providers.is_some());
        take(self.wrr_bias.is_some());
        take(self.stickiness_enabled.is_some());
        take(self.stickiness_percentage.is_some());

        let provider_overrides = match self.provider_overrides {
            Some(mut o) => {
                for (alias, d) in &defaults.provider_overrides {
                    match o.get_mut(alias) {
                        Some(existing) => used |= existing.merge_defaults(d),
                        None => {
                            o.insert(alias.clone(), d.clone());
                            used = true;
                        }
                    }
                }
                o
            }
            None => {
                used |= !defaults.provider_overrides.is_empty();
                defaults.provider_overrides.clone()
            }
        };

        let settings = Settings {
            providers: self.providers.unwrap_or_else(|| defaults.providers.clone()),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            error_ttl: self.error_ttl.unwrap_or(defaults.error_ttl),
            use_radar_availability: self
                .use_radar_availability
                .unwrap_or(defaults.use_radar_availability),
            radar_availability_threshold: self
                .radar_availability_threshold
                .unwrap_or(defaults.radar_availability_threshold),
            use_sonar_availability: self
                .use_sonar_availability
                .unwrap_or(defaults.use_sonar_availability),
            rtt_tp_mix: self.rtt_tp_mix.unwrap_or(defaults.rtt_tp_mix),
            wrr_enabled: self.wrr_enabled.unwrap_or(defaults.wrr_enabled),
            wrr_percentage: self.wrr_percentage.unwrap_or(defaults.wrr_percentage),
            wrr_num_providers: self.wrr_num_providers.unwrap_or(defaults.wrr_num_providers),
            wrr_bias: self.wrr_bias.unwrap_or(defaults.wrr_bias),
            stickiness_enabled: self.stickiness_enabled.unwrap_or(defaults.stickiness_enabled),
            stickiness_percentage: self
                .stickiness_percentage
                .unwrap_or(defaults.stickiness_percentage),
            provider_overrides,
        };
        (settings, used)
    }

    /// Range checks for every field that is set.
    pub(crate) fn validate(&self, context: &str) -> Result<(), ConfigError> {
        let check = |field: &'static str, value: Option<f64>, lo: f64, hi: f64| match value {
            Some(v) if !(v.is_finite() && v >= lo && v <= hi) => Err(ConfigError::OutOfRange {
                context: context.to_string(),
                field,
                value: v,
            }),
            _ => Ok(()),
        };
        check("rtt_tp_mix", self.rtt_tp_mix, 0.0, 1.0)?;
        check(
            "radar_availability_threshold",
            self.radar_availability_threshold,
            0.0,
            100.0,
        )?;
        check("wrr_percentage", self.wrr_percentage, 0.0, 100.0)?;
        check("wrr_bias", self.wrr_bias, 0.0, f64::MAX)?;
        check("stickiness_percentage", self.stickiness_percentage, 0.0, f64::MAX)?;
        for o in self.provider_overrides.iter().flat_map(|m| m.values()) {
            check("man_pen_pct", o.man_pen_pct, 0.0, 100.0)?;
            check("padding", o.padding, f64::MIN, f64::MAX)?;
        }
        Ok(())
    }
}

/// Fully resolved settings for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub providers: Vec<String>,
    pub default_ttl: u32,
    pub error_ttl: u32,
    pub use_radar_availability: bool,
    pub radar_availability_threshold: f64,
    pub use_sonar_availability: bool,
    pub rtt_tp_mix: f64,
    pub wrr_enabled: bool,
    pub wrr_percentage: f64,
    pub wrr_num_providers: TopN,
    pub wrr_bias: f64,
    pub stickiness_enabled: bool,
    pub stickiness_percentage: f64,
    pub provider_overrides: BTreeMap<String, ProviderOverride>,
}

impl TryFrom<ScopeSettings> for Settings {
    type Error = ConfigError;

    fn try_from(s: ScopeSettings) -> Result<Self, Self::Error> {
        fn req<T>(v: Option<T>, field: &'static str) -> Result<T, ConfigError> {
            v.ok_or(ConfigError::MissingDefault(field))
        }
        Ok(Settings {
            providers: req(s.providers, "providers")?,
            default_ttl: req(s.default_ttl, "default_ttl")?,
            error_ttl: req(s.error_ttl, "error_ttl")?,
            use_radar_availability: req(s.use_radar_availability, "use_radar_availability")?,
            radar_availability_threshold: req(
                s.radar_availability_threshold,
                "radar_availability_threshold",
            )?,
            use_sonar_availability: req(s.use_sonar_availability, "use_sonar_availability")?,
            rtt_tp_mix: req(s.rtt_tp_mix, "rtt_tp_mix")?,
            wrr_enabled: req(s.wrr_enabled, "wrr_enabled")?,
            wrr_percentage: req(s.wrr_percentage, "wrr_percentage")?,
            wrr_num_providers: req(s.wrr_num_providers, "wrr_num_providers")?,
            wrr_bias: req(s.wrr_bias, "wrr_bias")?,
            stickiness_enabled: req(s.stickiness_enabled, "stickiness_enabled")?,
            stickiness_percentage: req(s.stickiness_percentage, "stickiness_percentage")?,
            provider_overrides: s.provider_overrides.unwrap_or_default(),
        })
    }
}
