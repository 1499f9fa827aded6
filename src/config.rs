//! Top-level configuration and its initialization-time validation.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, GeoScope, GeoSettings, ProviderDef, ScopeSettings, Settings, StickinessConfig,
};

/// Clients inside `network` are always answered with `provider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpBlock {
    pub network: IpNet,
    pub provider: String,
}

fn default_health_data() -> String {
    "sonar".to_string()
}

/// Everything the mixer needs besides per-request data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixerConfig {
    /// Provider table: alias -> definition.
    pub providers: BTreeMap<String, ProviderDef>,
    /// Scope walk order, most specific first. Empty means [`GeoScope::DEFAULT_ORDER`].
    #[serde(default)]
    pub geo_order: Vec<GeoScope>,
    #[serde(default)]
    pub geo_settings: GeoSettings,
    /// Must set every field; fills whatever the scopes leave unset.
    pub default_settings: ScopeSettings,
    #[serde(default)]
    pub ip_blocks: Vec<IpBlock>,
    /// Name of the request data map carrying health-check payloads.
    #[serde(default = "default_health_data")]
    pub health_data: String,
    #[serde(default)]
    pub stickiness: StickinessConfig,
}

impl MixerConfig {
    /// Parse a JSON document. Does not validate; see [`MixerConfig::validate`].
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Effective scope walk order.
    pub fn order(&self) -> &[GeoScope] {
        if self.geo_order.is_empty() {
            &GeoScope::DEFAULT_ORDER[..]
        } else {
            self.geo_order.as_slice()
        }
    }

    /// First IP block containing `ip`, if any.
    pub fn ip_override(&self, ip: IpAddr) -> Option<&IpBlock> {
        self.ip_blocks.iter().find(|b| b.network.contains(&ip))
    }

    /// Check the configuration and return the resolved defaults.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        for (alias, def) in &self.providers {
            let context = format!("providers[{alias}]");
            check_range(&context, "man_pen_pct", def.man_pen_pct, 0.0, 100.0)?;
            check_range(&context, "padding", def.padding, f64::MIN, f64::MAX)?;
        }

        self.default_settings.validate("default_settings")?;
        self.check_aliases("default_settings", &self.default_settings)?;
        let defaults = Settings::try_from(self.default_settings.clone())?;
        if defaults.providers.is_empty() {
            return Err(ConfigError::NoDefaultProviders);
        }

        for (scope, by_value) in &self.geo_settings {
            for (value, s) in by_value {
                let context = format!("geo_settings[{}][{value}]", scope.label());
                s.validate(&context)?;
                self.check_aliases(&context, s)?;
            }
        }

        for block in &self.ip_blocks {
            self.check_alias(&format!("ip_blocks[{}]", block.network), &block.provider)?;
        }
        Ok(defaults)
    }

    fn check_aliases(&self, context: &str, s: &ScopeSettings) -> Result<(), ConfigError> {
        for alias in s.providers.iter().flatten() {
            self.check_alias(context, alias)?;
        }
        for alias in s.provider_overrides.iter().flat_map(|m| m.keys()) {
            self.check_alias(context, alias)?;
        }
        Ok(())
    }

    fn check_alias(&self, context: &str, alias: &str) -> Result<(), ConfigError> {
        if self.providers.contains_key(alias) {
            Ok(())
        } else {
            Err(ConfigError::UnknownProvider {
                context: context.to_string(),
                alias: alias.to_string(),
            })
        }
    }
}

fn check_range(
    context: &str,
    field: &'static str,
    v: f64,
    lo: f64,
    hi: f64,
) -> Result<(), ConfigError> {
    if v.is_finite() && v >= lo && v <= hi {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            context: context.to_string(),
            field,
            value: v,
        })
    }
}
