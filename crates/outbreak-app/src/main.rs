use anyhow::Result;
use clap::Parser;
use outbreak_core::{SimConfig, Simulation};
use tracing::info;

mod headless;
mod terminal;

#[derive(Debug, Parser)]
#[command(name = "outbreak", about = "Worker-parallel crowd simulation", version)]
struct Cli {
    /// Number of agents to simulate.
    #[arg(long, default_value_t = 10_000)]
    agents: usize,

    /// RNG seed; omitted means a fresh entropy seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker thread override; defaults to cores minus one.
    #[arg(long)]
    workers: Option<usize>,

    /// Run headless for this many ticks and exit; omitted opens the
    /// terminal view.
    #[arg(long)]
    ticks: Option<u64>,

    /// Playback speed multiplier, clamped to 0.125-4.
    #[arg(long, default_value_t = 1.0)]
    time_scale: f32,

    /// Print a JSON metrics summary on exit (headless mode).
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = SimConfig {
        rng_seed: cli.seed,
        worker_threads: cli.workers,
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(config)?;
    sim.init(cli.agents);
    sim.set_time_scale(cli.time_scale);
    info!(
        agents = sim.agent_count(),
        seed = sim.seed(),
        workers = sim.worker_count(),
        "starting outbreak simulation"
    );

    match cli.ticks {
        Some(ticks) => headless::run(&mut sim, ticks, cli.json),
        None => terminal::run(&mut sim),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_parse() {
        let cli = Cli::try_parse_from(["outbreak"]).expect("defaults");
        assert_eq!(cli.agents, 10_000);
        assert!(cli.seed.is_none());
        assert!(cli.ticks.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn cli_accepts_headless_flags() {
        let cli = Cli::try_parse_from([
            "outbreak",
            "--agents",
            "500",
            "--seed",
            "7",
            "--ticks",
            "120",
            "--workers",
            "3",
            "--json",
        ])
        .expect("flags");
        assert_eq!(cli.agents, 500);
        assert_eq!(cli.seed, Some(7));
        assert_eq!(cli.ticks, Some(120));
        assert_eq!(cli.workers, Some(3));
        assert!(cli.json);
    }
}
