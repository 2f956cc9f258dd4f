//! Static configuration for a simulation instance.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Indicates a configuration value that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Tunables for the simulation. Plain numeric fields, no dynamic knobs.
///
/// Defaults reproduce the reference world: a 1280x720 rectangle, 50-unit
/// spatial cells, 60 ticks per second, and a 90/5/5 population split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Width of the world in world units.
    pub world_width: f32,
    /// Height of the world in world units.
    pub world_height: f32,
    /// Edge length of one spatial grid cell. Must cover the largest
    /// grid-served query radius (separation, melee, ally counting).
    pub cell_size: f32,
    /// Worker thread override; `None` leaves one core for the main thread.
    pub worker_threads: Option<usize>,
    /// Seconds advanced per simulation tick.
    pub fixed_dt: f32,
    /// Soft per-tick budget surfaced through telemetry, in milliseconds.
    pub tick_budget_ms: f32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,

    /// Fraction of spawned agents that are civilians.
    pub civilian_share: f32,
    /// Fraction of spawned agents that are zombies.
    pub zombie_share: f32,
    /// Fraction of spawned agents that are heroes.
    pub hero_share: f32,
    /// Chance that a spawned hero is a hunter rather than a defender.
    pub hunter_chance: f32,

    /// Rectangular building obstacles generated at init.
    pub building_count: usize,
    /// Circular tree obstacles generated at init.
    pub tree_count: usize,

    /// Global speed clamp applied after steering.
    pub max_speed: f32,
    pub civilian_speed: f32,
    pub zombie_speed: f32,
    /// Burst speed once a zombie closes within `lunge_radius`.
    pub zombie_lunge_speed: f32,
    pub hero_speed: f32,
    /// Patrol moves at this fraction of the kind's base speed.
    pub patrol_speed_scale: f32,
    /// Bitten civilians move at this fraction of their base speed.
    pub bitten_speed_scale: f32,
    /// Blend rate from current toward desired velocity, per second.
    pub steer_rate: f32,

    pub separation_radius: f32,
    /// Gain applied to the accumulated separation steering.
    pub separation_strength: f32,
    /// Obstacle repulsion kicks in within this distance of a surface.
    pub obstacle_avoid_radius: f32,

    /// Target acquisition radius for all kinds.
    pub seek_radius: f32,
    /// Zombies hear gunshots within this radius.
    pub gunshot_radius: f32,
    /// Zombies burst to lunge speed within this distance of prey.
    pub lunge_radius: f32,
    /// Contact distance at which a zombie locks melee combat.
    pub melee_radius: f32,
    /// Radius for counting nearby allies during fight resolution.
    pub ally_radius: f32,
    /// Heroes start aiming when the closest zombie is inside this radius.
    pub hero_engage_radius: f32,
    /// Defenders reverse direction when the closest zombie is inside this.
    pub defender_kite_radius: f32,

    /// Patrol destination counts as reached within this distance.
    pub patrol_arrive_radius: f32,
    /// Seconds before an unreached patrol destination is repicked.
    pub patrol_timeout: f32,
    /// Distance from a world edge where boundary steering engages.
    pub boundary_zone: f32,
    /// Magnitude of the perpendicular push blended in at full urgency.
    pub boundary_push: f32,
    /// Seconds spent in Searching before giving up.
    pub search_duration: f32,
    /// Chance a fleeing civilian runs toward the nearest hero instead of
    /// directly away from the threat.
    pub flee_toward_hero_chance: f32,
    /// Weight of zombie cohesion toward the local horde centroid.
    pub horde_cohesion: f32,
    /// Weight of defender cohesion toward nearby heroes.
    pub squad_cohesion: f32,

    pub aim_time_min: f32,
    pub aim_time_max: f32,
    pub shoot_cooldown: f32,
    pub combat_time_min: f32,
    pub combat_time_max: f32,
    /// Heroes fight faster than civilians.
    pub hero_combat_time_min: f32,
    pub hero_combat_time_max: f32,
    /// Re-engagement lockout after a fight resolves.
    pub combat_cooldown: f32,
    /// Distance the participants are pushed apart on resolution.
    pub combat_separation: f32,

    pub infection_time_min: f32,
    pub infection_time_max: f32,
    pub reanimation_time_min: f32,
    pub reanimation_time_max: f32,

    /// Kills a hero can absorb before turning.
    pub hero_health: u8,
    /// Zombie hit points.
    pub zombie_health: u8,

    /// Seconds a gunshot stays audible to zombies.
    pub sound_lifetime: f32,
    /// Seconds a tracer beam stays visible.
    pub beam_lifetime: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: 1280.0,
            world_height: 720.0,
            cell_size: 50.0,
            worker_threads: None,
            fixed_dt: 1.0 / 60.0,
            tick_budget_ms: 15.0,
            rng_seed: None,
            civilian_share: 0.90,
            zombie_share: 0.05,
            hero_share: 0.05,
            hunter_chance: 0.5,
            building_count: 12,
            tree_count: 30,
            max_speed: 160.0,
            civilian_speed: 70.0,
            zombie_speed: 50.0,
            zombie_lunge_speed: 130.0,
            hero_speed: 85.0,
            patrol_speed_scale: 0.4,
            bitten_speed_scale: 0.45,
            steer_rate: 4.0,
            separation_radius: 25.0,
            separation_strength: 60.0,
            obstacle_avoid_radius: 40.0,
            seek_radius: 150.0,
            gunshot_radius: 300.0,
            lunge_radius: 30.0,
            melee_radius: 8.0,
            ally_radius: 50.0,
            hero_engage_radius: 100.0,
            defender_kite_radius: 70.0,
            patrol_arrive_radius: 5.0,
            patrol_timeout: 10.0,
            boundary_zone: 100.0,
            boundary_push: 60.0,
            search_duration: 3.0,
            flee_toward_hero_chance: 0.3,
            horde_cohesion: 0.3,
            squad_cohesion: 0.3,
            aim_time_min: 0.3,
            aim_time_max: 0.6,
            shoot_cooldown: 1.5,
            combat_time_min: 2.0,
            combat_time_max: 4.0,
            hero_combat_time_min: 1.0,
            hero_combat_time_max: 2.0,
            combat_cooldown: 2.0,
            combat_separation: 25.0,
            infection_time_min: 5.0,
            infection_time_max: 15.0,
            reanimation_time_min: 3.0,
            reanimation_time_max: 8.0,
            hero_health: 5,
            zombie_health: 3,
            sound_lifetime: 3.0,
            beam_lifetime: 0.15,
        }
    }
}

impl SimConfig {
    /// Validate every tunable, rejecting values the kernel cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.world_width > 0.0) || !(self.world_height > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        if !(self.cell_size > 0.0) {
            return Err(ConfigError::InvalidConfig("cell_size must be positive"));
        }
        let grid_served = self
            .separation_radius
            .max(self.melee_radius)
            .max(self.ally_radius);
        if self.cell_size < grid_served {
            return Err(ConfigError::InvalidConfig(
                "cell_size must cover the largest grid-served query radius",
            ));
        }
        if !(self.fixed_dt > 0.0) {
            return Err(ConfigError::InvalidConfig("fixed_dt must be positive"));
        }
        let share_sum = self.civilian_share + self.zombie_share + self.hero_share;
        if self.civilian_share < 0.0
            || self.zombie_share < 0.0
            || self.hero_share < 0.0
            || (share_sum - 1.0).abs() > 1e-3
        {
            return Err(ConfigError::InvalidConfig(
                "population shares must be non-negative and sum to 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.hunter_chance)
            || !(0.0..=1.0).contains(&self.flee_toward_hero_chance)
        {
            return Err(ConfigError::InvalidConfig(
                "probabilities must lie in [0, 1]",
            ));
        }
        if !(self.max_speed > 0.0)
            || !(self.civilian_speed > 0.0)
            || !(self.zombie_speed > 0.0)
            || !(self.zombie_lunge_speed > 0.0)
            || !(self.hero_speed > 0.0)
        {
            return Err(ConfigError::InvalidConfig("speeds must be positive"));
        }
        if self.aim_time_min > self.aim_time_max
            || self.combat_time_min > self.combat_time_max
            || self.hero_combat_time_min > self.hero_combat_time_max
            || self.infection_time_min > self.infection_time_max
            || self.reanimation_time_min > self.reanimation_time_max
        {
            return Err(ConfigError::InvalidConfig(
                "timer ranges must have min <= max",
            ));
        }
        if self.aim_time_min < 0.0
            || self.combat_time_min < 0.0
            || self.hero_combat_time_min < 0.0
            || self.infection_time_min < 0.0
            || self.reanimation_time_min < 0.0
            || self.shoot_cooldown < 0.0
            || self.combat_cooldown < 0.0
            || self.search_duration < 0.0
            || self.patrol_timeout < 0.0
            || self.sound_lifetime < 0.0
            || self.beam_lifetime < 0.0
        {
            return Err(ConfigError::InvalidConfig("timers must be non-negative"));
        }
        if self.hero_health == 0 || self.zombie_health == 0 {
            return Err(ConfigError::InvalidConfig(
                "hero and zombie health must be non-zero",
            ));
        }
        Ok(())
    }

    /// Main-thread RNG seeded from the configuration, or from entropy when
    /// no seed is set.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Worker thread count after applying the override.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(outbreak_jobs::JobPool::default_worker_count)
            .max(1)
    }
}
