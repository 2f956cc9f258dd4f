//! Tick orchestration and the admin/read surface.
//!
//! The [`Simulation`] owns every component: the SoA store, the spatial
//! grid, the worker pool, the static environment, the event lists, and the
//! main-thread RNG. A fixed-dt accumulator turns arbitrary host frame
//! times into zero or more whole ticks plus an interpolation fraction for
//! the renderer.
//!
//! Admin calls are only legal between ticks; the borrow checker enforces
//! this statically (`tick` holds `&mut self` for its whole duration, so no
//! structural call can interleave with a parallel phase).

use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use outbreak_index::SpatialGrid;
use outbreak_jobs::JobPool;

use crate::behavior::{self, WorldPtr};
use crate::columns::{agent_stream, AgentColumns};
use crate::environment::Environment;
use crate::{
    combat, AgentKind, AgentState, AgentView, ConfigError, GunshotBeam, GunshotSound, HeroRole,
    SimConfig, Vec2, JOB_CHUNK,
};

/// Ticks a single `advance` call may run before dropping leftover time,
/// bounding the spiral after a long host stall.
const MAX_TICKS_PER_ADVANCE: u32 = 240;

/// Playback speed limits.
const TIME_SCALE_MIN: f32 = 0.125;
const TIME_SCALE_MAX: f32 = 4.0;

/// Wall-clock cost of the last tick, split by phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub spatial_hash_ms: f32,
    pub separation_ms: f32,
    pub behavior_ms: f32,
    pub movement_ms: f32,
    pub combat_ms: f32,
    pub total_ms: f32,
    /// Worker jobs executed during the last tick.
    pub jobs: u32,
}

/// Live population broken down for telemetry. Bitten and dead agents are
/// counted separately from their kind, so the five buckets partition the
/// whole population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    pub civilians: usize,
    pub zombies: usize,
    pub heroes: usize,
    pub bitten: usize,
    pub dead: usize,
}

impl PopulationCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.civilians + self.zombies + self.heroes + self.bitten + self.dead
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Separation,
    Behavior,
    Movement,
}

/// The simulation kernel.
pub struct Simulation {
    pub(crate) config: SimConfig,
    pub(crate) columns: AgentColumns,
    pub(crate) grid: SpatialGrid,
    pub(crate) env: Environment,
    pub(crate) rng: SmallRng,
    pub(crate) sounds: Vec<GunshotSound>,
    pub(crate) beams: Vec<GunshotBeam>,
    pub(crate) death_list: Vec<usize>,
    pool: JobPool,
    states_scratch: Vec<AgentState>,
    global_seed: u64,
    spawn_serial: u64,
    paused: bool,
    time_scale: f32,
    debug_grid: bool,
    accumulator: f32,
    ticks: u64,
    timings: PhaseTimings,
}

impl Simulation {
    /// Build a simulation from validated configuration. The environment is
    /// generated here; agents are added by [`Simulation::init`].
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let global_seed = config.rng_seed.unwrap_or_else(rand::random);
        let mut rng = SmallRng::seed_from_u64(global_seed);
        let grid = SpatialGrid::new(config.world_width, config.world_height, config.cell_size)
            .map_err(|_| ConfigError::InvalidConfig("spatial grid rejected world dimensions"))?;
        let env = Environment::generate(&config, &mut rng);
        let pool = JobPool::new(config.worker_count());
        info!(
            workers = pool.worker_count(),
            world_width = config.world_width,
            world_height = config.world_height,
            cell_size = config.cell_size,
            seed = global_seed,
            "simulation constructed"
        );
        Ok(Self {
            config,
            columns: AgentColumns::new(),
            grid,
            env,
            rng,
            sounds: Vec::new(),
            beams: Vec::new(),
            death_list: Vec::new(),
            pool,
            states_scratch: Vec::new(),
            global_seed,
            spawn_serial: 0,
            paused: false,
            time_scale: 1.0,
            debug_grid: false,
            accumulator: 0.0,
            ticks: 0,
            timings: PhaseTimings::default(),
        })
    }

    /// Seed the initial population with the configured kind split:
    /// civilians first, then zombies (in the graveyard), then heroes.
    pub fn init(&mut self, count: usize) {
        self.columns.truncate(0);
        self.columns.reserve(count);
        let zombies = (count as f32 * self.config.zombie_share).round() as usize;
        let heroes = (count as f32 * self.config.hero_share).round() as usize;
        let civilians = count.saturating_sub(zombies + heroes);
        for _ in 0..civilians {
            self.spawn_one(AgentKind::Civilian);
        }
        for _ in 0..zombies {
            self.spawn_one(AgentKind::Zombie);
        }
        for _ in 0..heroes {
            self.spawn_one(AgentKind::Hero);
        }
        info!(civilians, zombies, heroes, "population initialised");
    }

    /// Grow by ratio-weighted spawning or shrink by truncation. Safe only
    /// between ticks. Shrinking first releases any fight that references a
    /// row being cut so the mutual-lock invariant survives.
    pub fn set_agent_count(&mut self, count: usize) {
        let current = self.columns.len();
        if count > current {
            self.columns.reserve(count - current);
            for _ in current..count {
                let roll: f32 = self.rng.random();
                let kind = if roll < self.config.civilian_share {
                    AgentKind::Civilian
                } else if roll < self.config.civilian_share + self.config.zombie_share {
                    AgentKind::Zombie
                } else {
                    AgentKind::Hero
                };
                self.spawn_one(kind);
            }
        } else if count < current {
            for i in 0..count {
                if self.columns.states[i] == AgentState::Fighting
                    && self.columns.combat_targets[i] as usize >= count
                {
                    combat::release_from_fight(self, i);
                }
            }
            self.columns.truncate(count);
        }
        info!(agents = self.columns.len(), "population resized");
    }

    fn spawn_one(&mut self, kind: AgentKind) {
        let pos = match kind {
            AgentKind::Zombie => self.env.graveyard.sample(&mut self.rng),
            _ => Vec2::new(
                self.rng.random_range(0.0..self.config.world_width),
                self.rng.random_range(0.0..self.config.world_height),
            ),
        };
        let vel = Vec2::new(
            self.rng.random_range(-5.0..=5.0),
            self.rng.random_range(-5.0..=5.0),
        );
        let role = if self.rng.random_bool(f64::from(self.config.hunter_chance)) {
            HeroRole::Hunter
        } else {
            HeroRole::Defender
        };
        let health = match kind {
            AgentKind::Civilian => 0,
            AgentKind::Zombie => self.config.zombie_health,
            AgentKind::Hero => self.config.hero_health,
        };
        let stream = agent_stream(self.global_seed, self.spawn_serial);
        self.spawn_serial += 1;
        self.columns.spawn(
            pos,
            vel,
            kind,
            role,
            health,
            self.config.world_width,
            self.config.world_height,
            stream,
            self.config.patrol_timeout,
        );
    }

    /// Accumulate host frame time and run whole ticks; returns the leftover
    /// fraction alpha in [0, 1) for render interpolation. Paused, nothing
    /// advances (event lifetimes included) and alpha is unchanged.
    pub fn advance(&mut self, frame_dt: f32) -> f32 {
        let fixed_dt = self.config.fixed_dt;
        if !self.paused {
            self.accumulator += frame_dt.max(0.0) * self.time_scale;
            let cap = fixed_dt * MAX_TICKS_PER_ADVANCE as f32;
            if self.accumulator > cap {
                self.accumulator = cap;
            }
            while self.accumulator >= fixed_dt {
                self.tick(fixed_dt);
                self.accumulator -= fixed_dt;
            }
        }
        self.accumulator / fixed_dt
    }

    /// Run one fixed tick. Paused mode short-circuits entirely.
    pub fn tick(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        let tick_start = Instant::now();

        self.columns.snapshot_prev_positions();

        let hash_start = Instant::now();
        self.grid.clear();
        for (i, p) in self.columns.positions.iter().enumerate() {
            self.grid.insert(i as u32, p.x, p.y);
        }
        self.timings.spatial_hash_ms = elapsed_ms(hash_start);

        // Phase 2 reads other agents' states through this snapshot, so its
        // own-range state writes stay race-free.
        self.states_scratch.clear();
        self.states_scratch.extend_from_slice(&self.columns.states);

        self.pool.reset_job_counter();
        self.timings.separation_ms = self.run_phase(Phase::Separation, dt);
        self.timings.behavior_ms = self.run_phase(Phase::Behavior, dt);
        self.timings.movement_ms = self.run_phase(Phase::Movement, dt);

        let combat_start = Instant::now();
        combat::run(self, dt);
        self.timings.combat_ms = elapsed_ms(combat_start);

        for sound in &mut self.sounds {
            sound.ttl -= dt;
        }
        self.sounds.retain(|s| s.ttl > 0.0);
        for beam in &mut self.beams {
            beam.ttl -= dt;
        }
        self.beams.retain(|b| b.ttl > 0.0);

        self.timings.jobs = self.pool.jobs_executed();
        self.timings.total_ms = elapsed_ms(tick_start);
        self.ticks += 1;
    }

    /// Submit one phase as chunked jobs and block at the barrier.
    fn run_phase(&mut self, phase: Phase, dt: f32) -> f32 {
        let started = Instant::now();
        let n = self.columns.len();
        if n == 0 {
            return 0.0;
        }
        let world = WorldPtr::capture(
            &mut self.columns,
            &self.states_scratch,
            &self.grid,
            &self.env,
            &self.config,
            &self.sounds,
        );
        let mut start = 0;
        while start < n {
            let end = (start + JOB_CHUNK).min(n);
            self.pool.submit(move || {
                // Safety: ranges submitted within a phase are disjoint and
                // the main thread blocks at wait_all before touching the
                // columns again (see WorldPtr).
                unsafe {
                    match phase {
                        Phase::Separation => behavior::separation_chunk(world, start, end, dt),
                        Phase::Behavior => behavior::behavior_chunk(world, start, end, dt),
                        Phase::Movement => behavior::movement_chunk(world, start, end, dt),
                    }
                }
            });
            start = end;
        }
        self.pool.wait_all();
        elapsed_ms(started)
    }

    // --- admin surface -----------------------------------------------------

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Clamp and set the playback multiplier applied to accumulated time.
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.clamp(TIME_SCALE_MIN, TIME_SCALE_MAX);
    }

    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn toggle_debug_grid(&mut self) {
        self.debug_grid = !self.debug_grid;
    }

    #[must_use]
    pub fn is_debug_grid_enabled(&self) -> bool {
        self.debug_grid
    }

    // --- read surface ------------------------------------------------------

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.columns.len()
    }

    /// One-pass population breakdown; the buckets partition the population.
    #[must_use]
    pub fn population(&self) -> PopulationCounts {
        let mut counts = PopulationCounts::default();
        for i in 0..self.columns.len() {
            match self.columns.states[i] {
                AgentState::Bitten => counts.bitten += 1,
                AgentState::Dead => counts.dead += 1,
                _ => match self.columns.kinds[i] {
                    AgentKind::Civilian => counts.civilians += 1,
                    AgentKind::Zombie => counts.zombies += 1,
                    AgentKind::Hero => counts.heroes += 1,
                },
            }
        }
        counts
    }

    #[must_use]
    pub fn civilian_count(&self) -> usize {
        self.population().civilians
    }

    #[must_use]
    pub fn zombie_count(&self) -> usize {
        self.population().zombies
    }

    #[must_use]
    pub fn hero_count(&self) -> usize {
        self.population().heroes
    }

    /// Worker jobs executed during the last tick.
    #[must_use]
    pub fn jobs_executed(&self) -> u32 {
        self.timings.jobs
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Grid rebuild cost of the last tick, in milliseconds.
    #[must_use]
    pub fn last_spatial_hash_time(&self) -> f32 {
        self.timings.spatial_hash_ms
    }

    #[must_use]
    pub fn max_cell_occupancy(&self) -> u32 {
        self.grid.max_occupancy()
    }

    #[must_use]
    pub fn timings(&self) -> PhaseTimings {
        self.timings
    }

    /// Ticks completed since construction.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Seed actually driving this run (resolved from entropy when the
    /// configuration left it unset).
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.global_seed
    }

    /// Per-agent records for the renderer, in dense index order.
    pub fn agents(&self) -> impl Iterator<Item = AgentView> + '_ {
        (0..self.columns.len()).map(move |i| AgentView {
            index: i,
            pos: self.columns.positions[i],
            prev_pos: self.columns.prev_positions[i],
            kind: self.columns.kinds[i],
            state: self.columns.states[i],
            health: self.columns.healths[i],
            facing: self.columns.facings[i],
        })
    }

    /// Audible gunshot markers still alive.
    #[must_use]
    pub fn sounds(&self) -> &[GunshotSound] {
        &self.sounds
    }

    /// Tracer beams still alive.
    #[must_use]
    pub fn beams(&self) -> &[GunshotBeam] {
        &self.beams
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The spatial grid as of the last rebuild, for debug overlays.
    #[must_use]
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Read access to the raw columns.
    #[must_use]
    pub fn columns(&self) -> &AgentColumns {
        &self.columns
    }

    /// Mutable access to the raw columns, for scenario setup and tests.
    /// Structural changes through this handle are the caller's problem.
    #[must_use]
    pub fn columns_mut(&mut self) -> &mut AgentColumns {
        &mut self.columns
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("agents", &self.columns.len())
            .field("ticks", &self.ticks)
            .field("paused", &self.paused)
            .field("workers", &self.pool.worker_count())
            .finish()
    }
}

fn elapsed_ms(start: Instant) -> f32 {
    start.elapsed().as_secs_f32() * 1000.0
}
