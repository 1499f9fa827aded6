use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use openmix::{ClientContext, MemoryRequest, Mixer, ProbeCategory};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::hint::black_box;

fn mixer(aliases: &[String], wrr: bool) -> Mixer {
    let providers: serde_json::Map<String, serde_json::Value> = aliases
        .iter()
        .map(|a| (a.clone(), json!({ "cname": format!("{a}.example.net") })))
        .collect();
    let cfg = json!({
        "providers": providers,
        "geo_settings": {
            "country": { "US": { "radar_availability_threshold": 85 } },
            "state_asn": { "CA-7922": { "stickiness_percentage": 15 } }
        },
        "default_settings": {
            "providers": aliases,
            "default_ttl": 20,
            "error_ttl": 10,
            "use_radar_availability": true,
            "radar_availability_threshold": 90,
            "use_sonar_availability": true,
            "rtt_tp_mix": 0.3,
            "wrr_enabled": wrr,
            "wrr_percentage": 50,
            "wrr_num_providers": { "top": 3 },
            "wrr_bias": 1.0,
            "stickiness_enabled": true,
            "stickiness_percentage": 10
        }
    });
    Mixer::from_json(&cfg.to_string()).unwrap()
}

fn request(aliases: &[String]) -> MemoryRequest {
    let client = ClientContext {
        country: Some("US".into()),
        state: Some("CA".into()),
        asn: Some(7922),
        ..ClientContext::default()
    };
    // A deterministic, slightly non-uniform telemetry pattern.
    let metric = |scale: f64, k: usize| {
        aliases
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), scale * (1.0 + ((i * k + 3) % 17) as f64 / 17.0)))
            .collect::<Vec<_>>()
    };
    let health = aliases
        .iter()
        .map(|a| (a.clone(), json!({ "health_score": 5, "avail": 1 }).to_string()));
    MemoryRequest::new(client)
        .with_probe(ProbeCategory::Avail, aliases.iter().map(|a| (a.clone(), 99.0)))
        .with_probe(ProbeCategory::HttpRtt, metric(80.0, 7))
        .with_probe(ProbeCategory::HttpKbps, metric(4_000.0, 11))
        .with_data("sonar", health)
}

fn bench_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");
    for &n in &[3usize, 8usize, 32usize] {
        let aliases: Vec<String> = (0..n).map(|i| format!("cdn{i}")).collect();
        let req = request(&aliases);

        for wrr in [false, true] {
            let m = mixer(&aliases, wrr);
            let mut cache = m.new_cache();
            let mut rng = StdRng::seed_from_u64(123);
            let id = if wrr { "wrr" } else { "optimal" };
            group.bench_with_input(BenchmarkId::new(id, n), &n, |b, &_n| {
                b.iter(|| {
                    let d = m.decide(black_box(&req), &mut cache, &mut rng);
                    black_box(d);
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_decision);
criterion_main!(benches);
