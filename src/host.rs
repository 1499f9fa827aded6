//! Host platform interfaces, plus in-memory implementations.
//!
//! The host supplies per-request data through [`Request`], receives the answer
//! through [`Response`], and learns the provider universe at startup through
//! [`HostConfig`]. The `Memory*` types implement these without a host, for tests
//! and for embedding the mixer in other services.

use std::collections::BTreeMap;

use crate::{ClientContext, ProbeCategory, ProbeMap};

/// Per-request inputs supplied by the host.
pub trait Request {
    /// Measurements for `category`; providers without data are absent.
    fn probe(&self, category: ProbeCategory) -> ProbeMap;
    /// Named auxiliary data: alias -> serialized payload.
    fn data(&self, name: &str) -> BTreeMap<String, String>;
    /// What is known about the requesting client.
    fn client(&self) -> &ClientContext;
}

/// Per-request outputs consumed by the host.
pub trait Response {
    fn respond(&mut self, provider: &str, cname: &str);
    fn set_ttl(&mut self, seconds: u32);
    fn set_reason_code(&mut self, code: &str);
    /// Extended diagnostics. Hosts without a log channel ignore it.
    fn log(&mut self, _line: &str) {}
}

/// Initialization-time host configuration.
pub trait HostConfig {
    /// Declare that `alias` may be answered.
    fn require_provider(&mut self, alias: &str);
}

/// In-memory request.
#[derive(Debug, Clone, Default)]
pub struct MemoryRequest {
    pub client: ClientContext,
    pub probes: BTreeMap<ProbeCategory, ProbeMap>,
    pub data: BTreeMap<String, BTreeMap<String, String>>,
}

impl MemoryRequest {
    pub fn new(client: ClientContext) -> Self {
        Self {
            client,
            ..Self::default()
        }
    }

    /// Set the measurements for one probe category.
    pub fn with_probe<I, K>(mut self, category: ProbeCategory, values: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.probes.insert(
            category,
            values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        );
        self
    }

    /// Set one named data map.
    pub fn with_data<I, K, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.data.insert(
            name.to_string(),
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl Request for MemoryRequest {
    fn probe(&self, category: ProbeCategory) -> ProbeMap {
        self.probes.get(&category).cloned().unwrap_or_default()
    }

    fn data(&self, name: &str) -> BTreeMap<String, String> {
        self.data.get(name).cloned().unwrap_or_default()
    }

    fn client(&self) -> &ClientContext {
        &self.client
    }
}

/// In-memory response that records every call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryResponse {
    pub answer: Option<(String, String)>,
    pub ttl: Option<u32>,
    pub reason_code: Option<String>,
    pub log: Option<String>,
    /// Total number of response calls, to check each one happens once.
    pub calls: usize,
}

impl Response for MemoryResponse {
    fn respond(&mut self, provider: &str, cname: &str) {
        self.answer = Some((provider.to_string(), cname.to_string()));
        self.calls += 1;
    }

    fn set_ttl(&mut self, seconds: u32) {
        self.ttl = Some(seconds);
        self.calls += 1;
    }

    fn set_reason_code(&mut self, code: &str) {
        self.reason_code = Some(code.to_string());
        self.calls += 1;
    }

    fn log(&mut self, line: &str) {
        self.log = Some(line.to_string());
        self.calls += 1;
    }
}

/// In-memory host configuration that records required providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryHostConfig {
    pub required: Vec<String>,
}

impl HostConfig for MemoryHostConfig {
    fn require_provider(&mut self, alias: &str) {
        self.required.push(alias.to_string());
    }
}
