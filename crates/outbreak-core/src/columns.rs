//! Structure-of-Arrays storage for agent state.
//!
//! Every attribute lives in its own contiguous vector so each tick phase
//! touches only the columns it needs. All vectors stay the same length at
//! all times; that shared length is the live agent count. Deletion swaps
//! the last row into the removed slot, so callers holding indices (combat
//! targets, death lists) must reconcile before or during removal.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{AgentKind, AgentState, FleePlan, HeroRole, Vec2, NO_TARGET};

/// 64-bit fractional golden-ratio constant used to spread per-agent seeds.
const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// Deterministic RNG stream for one agent.
///
/// Seeded from the run seed and the agent's spawn serial, so streams never
/// depend on spawn order reshuffling and are never shared across threads:
/// every parallel-phase draw (flee plan, aim jitter, patrol targets) comes
/// from the owning agent's stream.
#[must_use]
pub fn agent_stream(global_seed: u64, spawn_serial: u64) -> SmallRng {
    SmallRng::seed_from_u64(global_seed ^ spawn_serial.wrapping_mul(GOLDEN_GAMMA))
}

/// Parallel per-agent columns, hot attributes and FSM scratch alike.
#[derive(Default)]
pub struct AgentColumns {
    pub(crate) positions: Vec<Vec2>,
    pub(crate) prev_positions: Vec<Vec2>,
    pub(crate) velocities: Vec<Vec2>,
    pub(crate) facings: Vec<Vec2>,
    pub(crate) kinds: Vec<AgentKind>,
    pub(crate) states: Vec<AgentState>,
    pub(crate) healths: Vec<u8>,

    pub(crate) last_seen: Vec<Vec2>,
    pub(crate) search_timers: Vec<f32>,
    pub(crate) patrol_targets: Vec<Vec2>,
    pub(crate) patrol_timers: Vec<f32>,
    pub(crate) shoot_cooldowns: Vec<f32>,
    pub(crate) aim_timers: Vec<f32>,
    pub(crate) flee_plans: Vec<FleePlan>,
    pub(crate) hero_roles: Vec<HeroRole>,
    pub(crate) combat_targets: Vec<u32>,
    pub(crate) combat_timers: Vec<f32>,
    pub(crate) combat_cooldowns: Vec<f32>,
    pub(crate) infection_timers: Vec<f32>,
    pub(crate) infection_progress: Vec<f32>,
    pub(crate) reanimation_timers: Vec<f32>,
    pub(crate) pending_shots: Vec<Option<u32>>,
    pub(crate) rngs: Vec<SmallRng>,
}

impl AgentColumns {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when no agents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Preallocate every column.
    pub fn reserve(&mut self, additional: usize) {
        self.positions.reserve(additional);
        self.prev_positions.reserve(additional);
        self.velocities.reserve(additional);
        self.facings.reserve(additional);
        self.kinds.reserve(additional);
        self.states.reserve(additional);
        self.healths.reserve(additional);
        self.last_seen.reserve(additional);
        self.search_timers.reserve(additional);
        self.patrol_targets.reserve(additional);
        self.patrol_timers.reserve(additional);
        self.shoot_cooldowns.reserve(additional);
        self.aim_timers.reserve(additional);
        self.flee_plans.reserve(additional);
        self.hero_roles.reserve(additional);
        self.combat_targets.reserve(additional);
        self.combat_timers.reserve(additional);
        self.combat_cooldowns.reserve(additional);
        self.infection_timers.reserve(additional);
        self.infection_progress.reserve(additional);
        self.reanimation_timers.reserve(additional);
        self.pending_shots.reserve(additional);
        self.rngs.reserve(additional);
    }

    /// Push a new agent onto every column.
    ///
    /// New agents start patrolling toward a random world point drawn from
    /// their own stream; health follows the kind (`health` is the initial
    /// value chosen by the caller, 0 for civilians).
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        &mut self,
        pos: Vec2,
        vel: Vec2,
        kind: AgentKind,
        role: HeroRole,
        health: u8,
        world_width: f32,
        world_height: f32,
        mut rng: SmallRng,
        patrol_timeout: f32,
    ) {
        let patrol_target = Vec2::new(
            rng.random_range(0.0..world_width),
            rng.random_range(0.0..world_height),
        );
        self.positions.push(pos);
        self.prev_positions.push(pos);
        self.velocities.push(vel);
        self.facings
            .push(vel.normalized_or(Vec2::new(1.0, 0.0)));
        self.kinds.push(kind);
        self.states.push(AgentState::Patrol);
        self.healths.push(health);
        self.last_seen.push(Vec2::ZERO);
        self.search_timers.push(0.0);
        self.patrol_targets.push(patrol_target);
        self.patrol_timers.push(patrol_timeout);
        self.shoot_cooldowns.push(0.0);
        self.aim_timers.push(0.0);
        self.flee_plans.push(FleePlan::AwayFromThreat);
        self.hero_roles.push(role);
        self.combat_targets.push(NO_TARGET);
        self.combat_timers.push(0.0);
        self.combat_cooldowns.push(0.0);
        self.infection_timers.push(0.0);
        self.infection_progress.push(0.0);
        self.reanimation_timers.push(0.0);
        self.pending_shots.push(None);
        self.rngs.push(rng);
        self.debug_assert_coherent();
    }

    /// Swap index `i` with the last row across every column and shrink by
    /// one. Callers fix up outbound indices (combat targets) themselves.
    pub fn kill(&mut self, i: usize) {
        self.positions.swap_remove(i);
        self.prev_positions.swap_remove(i);
        self.velocities.swap_remove(i);
        self.facings.swap_remove(i);
        self.kinds.swap_remove(i);
        self.states.swap_remove(i);
        self.healths.swap_remove(i);
        self.last_seen.swap_remove(i);
        self.search_timers.swap_remove(i);
        self.patrol_targets.swap_remove(i);
        self.patrol_timers.swap_remove(i);
        self.shoot_cooldowns.swap_remove(i);
        self.aim_timers.swap_remove(i);
        self.flee_plans.swap_remove(i);
        self.hero_roles.swap_remove(i);
        self.combat_targets.swap_remove(i);
        self.combat_timers.swap_remove(i);
        self.combat_cooldowns.swap_remove(i);
        self.infection_timers.swap_remove(i);
        self.infection_progress.swap_remove(i);
        self.reanimation_timers.swap_remove(i);
        self.pending_shots.swap_remove(i);
        self.rngs.swap_remove(i);
        self.debug_assert_coherent();
    }

    /// Drop every row at index `n` and above. Order-insensitive shrink.
    pub fn truncate(&mut self, n: usize) {
        self.positions.truncate(n);
        self.prev_positions.truncate(n);
        self.velocities.truncate(n);
        self.facings.truncate(n);
        self.kinds.truncate(n);
        self.states.truncate(n);
        self.healths.truncate(n);
        self.last_seen.truncate(n);
        self.search_timers.truncate(n);
        self.patrol_targets.truncate(n);
        self.patrol_timers.truncate(n);
        self.shoot_cooldowns.truncate(n);
        self.aim_timers.truncate(n);
        self.flee_plans.truncate(n);
        self.hero_roles.truncate(n);
        self.combat_targets.truncate(n);
        self.combat_timers.truncate(n);
        self.combat_cooldowns.truncate(n);
        self.infection_timers.truncate(n);
        self.infection_progress.truncate(n);
        self.reanimation_timers.truncate(n);
        self.pending_shots.truncate(n);
        self.rngs.truncate(n);
        self.debug_assert_coherent();
    }

    /// Copy current positions into the interpolation snapshot.
    pub fn snapshot_prev_positions(&mut self) {
        self.prev_positions.copy_from_slice(&self.positions);
    }

    #[must_use]
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    #[must_use]
    pub fn positions_mut(&mut self) -> &mut [Vec2] {
        &mut self.positions
    }

    #[must_use]
    pub fn prev_positions(&self) -> &[Vec2] {
        &self.prev_positions
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    #[must_use]
    pub fn velocities_mut(&mut self) -> &mut [Vec2] {
        &mut self.velocities
    }

    #[must_use]
    pub fn facings(&self) -> &[Vec2] {
        &self.facings
    }

    #[must_use]
    pub fn kinds(&self) -> &[AgentKind] {
        &self.kinds
    }

    #[must_use]
    pub fn states(&self) -> &[AgentState] {
        &self.states
    }

    #[must_use]
    pub fn states_mut(&mut self) -> &mut [AgentState] {
        &mut self.states
    }

    #[must_use]
    pub fn healths(&self) -> &[u8] {
        &self.healths
    }

    #[must_use]
    pub fn healths_mut(&mut self) -> &mut [u8] {
        &mut self.healths
    }

    #[must_use]
    pub fn combat_targets(&self) -> &[u32] {
        &self.combat_targets
    }

    #[must_use]
    pub fn combat_timers(&self) -> &[f32] {
        &self.combat_timers
    }

    #[must_use]
    pub fn combat_cooldowns(&self) -> &[f32] {
        &self.combat_cooldowns
    }

    #[must_use]
    pub fn infection_timers(&self) -> &[f32] {
        &self.infection_timers
    }

    #[must_use]
    pub fn infection_timers_mut(&mut self) -> &mut [f32] {
        &mut self.infection_timers
    }

    #[must_use]
    pub fn infection_progress(&self) -> &[f32] {
        &self.infection_progress
    }

    #[must_use]
    pub fn reanimation_timers(&self) -> &[f32] {
        &self.reanimation_timers
    }

    #[must_use]
    pub fn reanimation_timers_mut(&mut self) -> &mut [f32] {
        &mut self.reanimation_timers
    }

    #[must_use]
    pub fn shoot_cooldowns(&self) -> &[f32] {
        &self.shoot_cooldowns
    }

    #[must_use]
    pub fn shoot_cooldowns_mut(&mut self) -> &mut [f32] {
        &mut self.shoot_cooldowns
    }

    #[must_use]
    pub fn aim_timers(&self) -> &[f32] {
        &self.aim_timers
    }

    #[must_use]
    pub fn hero_roles(&self) -> &[HeroRole] {
        &self.hero_roles
    }

    #[must_use]
    pub fn hero_roles_mut(&mut self) -> &mut [HeroRole] {
        &mut self.hero_roles
    }

    #[inline]
    fn debug_assert_coherent(&self) {
        let n = self.positions.len();
        debug_assert_eq!(n, self.prev_positions.len());
        debug_assert_eq!(n, self.velocities.len());
        debug_assert_eq!(n, self.facings.len());
        debug_assert_eq!(n, self.kinds.len());
        debug_assert_eq!(n, self.states.len());
        debug_assert_eq!(n, self.healths.len());
        debug_assert_eq!(n, self.last_seen.len());
        debug_assert_eq!(n, self.search_timers.len());
        debug_assert_eq!(n, self.patrol_targets.len());
        debug_assert_eq!(n, self.patrol_timers.len());
        debug_assert_eq!(n, self.shoot_cooldowns.len());
        debug_assert_eq!(n, self.aim_timers.len());
        debug_assert_eq!(n, self.flee_plans.len());
        debug_assert_eq!(n, self.hero_roles.len());
        debug_assert_eq!(n, self.combat_targets.len());
        debug_assert_eq!(n, self.combat_timers.len());
        debug_assert_eq!(n, self.combat_cooldowns.len());
        debug_assert_eq!(n, self.infection_timers.len());
        debug_assert_eq!(n, self.infection_progress.len());
        debug_assert_eq!(n, self.reanimation_timers.len());
        debug_assert_eq!(n, self.pending_shots.len());
        debug_assert_eq!(n, self.rngs.len());
    }
}

impl std::fmt::Debug for AgentColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentColumns")
            .field("len", &self.len())
            .finish()
    }
}
