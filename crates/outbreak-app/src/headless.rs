//! Headless driver: run a fixed number of ticks and report metrics.

use std::time::Instant;

use anyhow::Result;
use outbreak_core::Simulation;
use serde_json::json;
use tracing::info;

pub fn run(sim: &mut Simulation, ticks: u64, emit_json: bool) -> Result<()> {
    let dt = sim.config().fixed_dt;
    let started = Instant::now();
    let mut worst_ms = 0.0_f32;
    let mut total_ms = 0.0_f32;

    for _ in 0..ticks {
        sim.tick(dt);
        let timings = sim.timings();
        worst_ms = worst_ms.max(timings.total_ms);
        total_ms += timings.total_ms;

        if sim.tick_count() % 60 == 0 {
            let counts = sim.population();
            info!(
                tick = sim.tick_count(),
                tick_ms = timings.total_ms,
                civilians = counts.civilians,
                zombies = counts.zombies,
                heroes = counts.heroes,
                bitten = counts.bitten,
                dead = counts.dead,
                "progress"
            );
        }
    }

    let avg_ms = total_ms / ticks.max(1) as f32;
    let timings = sim.timings();
    let counts = sim.population();
    info!(
        ticks,
        avg_tick_ms = avg_ms,
        worst_tick_ms = worst_ms,
        budget_ms = sim.config().tick_budget_ms,
        within_budget = avg_ms < sim.config().tick_budget_ms,
        workers = sim.worker_count(),
        jobs_last_tick = sim.jobs_executed(),
        spatial_hash_ms = timings.spatial_hash_ms,
        max_cell_occupancy = sim.max_cell_occupancy(),
        elapsed_s = started.elapsed().as_secs_f32(),
        "headless run complete"
    );

    if emit_json {
        let summary = json!({
            "ticks": ticks,
            "agents": sim.agent_count(),
            "seed": sim.seed(),
            "workers": sim.worker_count(),
            "avg_tick_ms": avg_ms,
            "worst_tick_ms": worst_ms,
            "budget_ms": sim.config().tick_budget_ms,
            "phases": {
                "spatial_hash_ms": timings.spatial_hash_ms,
                "separation_ms": timings.separation_ms,
                "behavior_ms": timings.behavior_ms,
                "movement_ms": timings.movement_ms,
                "combat_ms": timings.combat_ms,
            },
            "jobs_last_tick": sim.jobs_executed(),
            "max_cell_occupancy": sim.max_cell_occupancy(),
            "population": {
                "civilians": counts.civilians,
                "zombies": counts.zombies,
                "heroes": counts.heroes,
                "bitten": counts.bitten,
                "dead": counts.dead,
            },
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
