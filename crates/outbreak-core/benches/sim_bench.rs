use std::time::Duration;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use outbreak_core::{SimConfig, Simulation};

fn bench_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("sim_tick");
    group.sample_size(20);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(10));

    // Steps per bench iteration (override via OUTBREAK_BENCH_STEPS).
    let steps: usize = std::env::var("OUTBREAK_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&v| v > 0)
        .unwrap_or(60);

    for &agents in &[2_000_usize, 5_000, 10_000] {
        group.bench_function(format!("steps{steps}_agents{agents}"), |b| {
            b.iter_batched(
                || {
                    let config = SimConfig {
                        rng_seed: Some(0xBEEF),
                        ..SimConfig::default()
                    };
                    let mut sim = Simulation::new(config).expect("simulation");
                    sim.init(agents);
                    sim
                },
                |mut sim| {
                    let dt = sim.config().fixed_dt;
                    for _ in 0..steps {
                        sim.tick(dt);
                    }
                    sim
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_spatial_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_rebuild");
    group.sample_size(30);

    group.bench_function("rebuild_10k", |b| {
        let config = SimConfig {
            rng_seed: Some(0xFEED),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config).expect("simulation");
        sim.init(10_000);
        let dt = sim.config().fixed_dt;
        b.iter(|| {
            sim.tick(dt);
            sim.last_spatial_hash_time()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_ticks, bench_spatial_rebuild);
criterion_main!(benches);
