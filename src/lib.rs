//! `openmix`: deterministic, geo-aware DNS traffic-steering decisions.
//!
//! Designed for "which CDN answers this query" problems: you have a small set of
//! providers (CDNs, clouds, origins), per-request telemetry about each of them
//! (network-probe availability, HTTP round-trip time, HTTP throughput, health
//! checks), and one DNS answer to produce right now. `openmix` turns that into a
//! [`Decision`]: a provider, its CNAME, a TTL and a bounded reason code.
//!
//! **Goals:**
//! - **Always respond**: request handling never fails. Missing or malformed
//!   telemetry degrades into a fallback answer with a shorter TTL and an
//!   explanatory reason code.
//! - **Deterministic**: same configuration, telemetry and cache state produce the
//!   same answer. Randomness comes only from the caller's RNG, in the keep-warm
//!   and fallback branches.
//! - **Per-field overrides**: settings are resolved field by field from the most
//!   specific geo/network scope that sets them, down to the defaults.
//! - **Explicit state**: the only cross-request state is a [`StickinessCache`]
//!   the caller owns and lends to each decision.
//!
//! **Pipeline** (see [`Mixer`] for the full walk):
//! - [`MixerConfig::ip_override`]: address blocks pinned to one provider.
//! - [`resolve_settings`]: geo/network override resolution into [`Settings`].
//! - [`seed_candidates`]: provider table, inclusion predicates, telemetry join.
//! - [`filter_available`] / [`recover`]: availability filter chain and recovery.
//! - [`score_candidates`]: mean-normalized RTT/throughput composite score.
//! - [`apply_bias`] / [`proportional_map`] / [`sample_from`]: weighted round robin.
//! - [`apply_stickiness`] / [`StickinessCache`]: sticky optimal selection.
//! - [`render_reason_code`]: bounded reason code.
//!
//! **Host integration:** the host supplies data through [`Request`], receives the
//! answer through [`Response`] and learns the provider universe through
//! [`HostConfig`]. [`MemoryRequest`], [`MemoryResponse`] and [`MemoryHostConfig`]
//! implement these in memory.
//!
//! ```
//! use openmix::{ClientContext, MemoryRequest, MemoryResponse, Mixer, ProbeCategory};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mixer = Mixer::from_json(r#"{
//!     "providers": {
//!         "foo": { "cname": "foo.example.net" },
//!         "baz": { "cname": "baz.example.net" }
//!     },
//!     "default_settings": {
//!         "providers": ["foo", "baz"],
//!         "default_ttl": 20, "error_ttl": 10,
//!         "use_radar_availability": true, "radar_availability_threshold": 90,
//!         "use_sonar_availability": false,
//!         "rtt_tp_mix": 0,
//!         "wrr_enabled": false, "wrr_percentage": 0, "wrr_num_providers": "all", "wrr_bias": 0,
//!         "stickiness_enabled": false, "stickiness_percentage": 0
//!     }
//! }"#).unwrap();
//!
//! let request = MemoryRequest::new(ClientContext::default())
//!     .with_probe(ProbeCategory::Avail, [("foo", 100.0), ("baz", 100.0)])
//!     .with_probe(ProbeCategory::HttpRtt, [("foo", 200.0), ("baz", 100.0)]);
//! let mut response = MemoryResponse::default();
//! let mut cache = mixer.new_cache();
//! let mut rng = StdRng::seed_from_u64(0);
//!
//! let d = mixer.handle(&request, &mut response, &mut cache, &mut rng);
//! assert_eq!(d.provider, "baz");
//! assert_eq!(response.ttl, Some(20));
//! ```
//!
//! **Non-goals:**
//! - No DNS wire handling, no telemetry collection, no config loading beyond JSON.
//! - No tracing subscriber; the library only emits `tracing` events.

#![forbid(unsafe_code)]

mod error;
pub use error::*;

mod probe;
pub use probe::*;

mod health;
pub use health::*;

mod normalize;
pub use normalize::*;

mod settings;
pub use settings::*;

mod geo;
pub use geo::*;

mod reason;
pub use reason::*;

mod sticky;
pub use sticky::*;

mod candidate;
pub use candidate::*;

mod availability;
pub use availability::*;

mod alloc;
pub use alloc::*;

mod scoring;
pub use scoring::*;

mod decision;
pub use decision::*;

mod host;
pub use host::*;

mod config;
pub use config::*;

mod mixer;
pub use mixer::*;
