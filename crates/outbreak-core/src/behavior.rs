//! Parallel tick phases: separation, per-kind behavior, and movement.
//!
//! Each phase is dispatched as jobs covering disjoint `[start, end)` index
//! ranges. Within a phase a job writes only rows in its own range and reads
//! other agents through columns no job writes during that phase, so jobs
//! commute; the orchestrator's `wait_all` barrier separates phases.

use ordered_float::OrderedFloat;
use outbreak_index::SpatialGrid;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::columns::AgentColumns;
use crate::environment::Environment;
use crate::{
    AgentKind, AgentState, FleePlan, GunshotSound, HeroRole, SimConfig, Vec2, FACING_EPSILON,
};

/// Velocity damping on the reflected axis when resolving building contact.
const RECT_RESTITUTION: f32 = 0.3;

/// Fraction of the wall-perpendicular push blended into the velocity.
const BOUNDARY_BLEND: f32 = 0.7;

/// Raw column pointers handed to phase jobs.
///
/// Safety contract, upheld by the orchestrator:
/// - every job materialises `&mut` slices only for rows in its own range,
///   and ranges submitted within one phase never overlap;
/// - shared `&[T]` views are taken only of columns no job writes during
///   the current phase (positions/kinds in phases 1–2, live states in
///   phase 1, the states snapshot in phase 2);
/// - the main thread blocks in `wait_all` before touching the columns
///   again, and no structural mutation happens while jobs run.
#[derive(Clone, Copy)]
pub(crate) struct WorldPtr {
    positions: *mut Vec2,
    velocities: *mut Vec2,
    facings: *mut Vec2,
    kinds: *const AgentKind,
    states: *mut AgentState,
    states_snapshot: *const AgentState,
    last_seen: *mut Vec2,
    search_timers: *mut f32,
    patrol_targets: *mut Vec2,
    patrol_timers: *mut f32,
    shoot_cooldowns: *mut f32,
    aim_timers: *mut f32,
    flee_plans: *mut FleePlan,
    hero_roles: *const HeroRole,
    pending_shots: *mut Option<u32>,
    rngs: *mut SmallRng,
    sounds: *const GunshotSound,
    sounds_len: usize,
    grid: *const SpatialGrid,
    env: *const Environment,
    config: *const SimConfig,
    len: usize,
}

// Jobs receive a copy of the pointer bundle; the aliasing discipline above
// is what makes moving it across threads sound.
unsafe impl Send for WorldPtr {}

impl WorldPtr {
    pub(crate) fn capture(
        columns: &mut AgentColumns,
        states_snapshot: &[AgentState],
        grid: &SpatialGrid,
        env: &Environment,
        config: &SimConfig,
        sounds: &[GunshotSound],
    ) -> Self {
        let len = columns.len();
        debug_assert_eq!(len, states_snapshot.len());
        Self {
            positions: columns.positions.as_mut_ptr(),
            velocities: columns.velocities.as_mut_ptr(),
            facings: columns.facings.as_mut_ptr(),
            kinds: columns.kinds.as_ptr(),
            states: columns.states.as_mut_ptr(),
            states_snapshot: states_snapshot.as_ptr(),
            last_seen: columns.last_seen.as_mut_ptr(),
            search_timers: columns.search_timers.as_mut_ptr(),
            patrol_targets: columns.patrol_targets.as_mut_ptr(),
            patrol_timers: columns.patrol_timers.as_mut_ptr(),
            shoot_cooldowns: columns.shoot_cooldowns.as_mut_ptr(),
            aim_timers: columns.aim_timers.as_mut_ptr(),
            flee_plans: columns.flee_plans.as_mut_ptr(),
            hero_roles: columns.hero_roles.as_ptr(),
            pending_shots: columns.pending_shots.as_mut_ptr(),
            rngs: columns.rngs.as_mut_ptr(),
            sounds: sounds.as_ptr(),
            sounds_len: sounds.len(),
            grid,
            env,
            config,
            len,
        }
    }

    unsafe fn shared<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
        unsafe { std::slice::from_raw_parts(ptr, len) }
    }

    unsafe fn owned<'a, T>(ptr: *mut T, start: usize, end: usize) -> &'a mut [T] {
        unsafe { std::slice::from_raw_parts_mut(ptr.add(start), end - start) }
    }
}

// ---------------------------------------------------------------------------
// Phase 1: separation
// ---------------------------------------------------------------------------

/// Accumulate neighbor repulsion and obstacle avoidance into the velocities
/// of `[start, end)`.
///
/// # Safety
/// Caller submits non-overlapping ranges and no other phase runs
/// concurrently (see [`WorldPtr`]).
pub(crate) unsafe fn separation_chunk(world: WorldPtr, start: usize, end: usize, dt: f32) {
    let positions = unsafe { WorldPtr::shared(world.positions.cast_const(), world.len) };
    let states = unsafe { WorldPtr::shared(world.states.cast_const(), world.len) };
    let velocities = unsafe { WorldPtr::owned(world.velocities, start, end) };
    let grid = unsafe { &*world.grid };
    let env = unsafe { &*world.env };
    let config = unsafe { &*world.config };

    let r_sep = config.separation_radius;
    let r_sep_sq = r_sep * r_sep;
    let mut neighbors = Vec::with_capacity(32);

    for i in start..end {
        if matches!(states[i], AgentState::Dead | AgentState::Fighting) {
            continue;
        }
        let pos = positions[i];
        let mut steer = Vec2::ZERO;

        grid.query_neighbors(pos.x, pos.y, r_sep, &mut neighbors);
        for &j in &neighbors {
            let j = j as usize;
            if j == i || states[j] == AgentState::Dead {
                continue;
            }
            let offset = pos - positions[j];
            let d_sq = offset.length_sq();
            if d_sq >= r_sep_sq {
                continue;
            }
            if d_sq > 1e-6 {
                let d = d_sq.sqrt();
                let falloff = (r_sep - d) / r_sep;
                steer += offset * (falloff / d);
            } else {
                // Coincident agents: deterministic nudge by index order.
                steer += Vec2::new(if i < j { 1.0 } else { -1.0 }, 0.0);
            }
        }

        steer += obstacle_avoidance(pos, env, config);

        let vel = &mut velocities[i - start];
        *vel += steer * (config.separation_strength * dt);
        *vel = vel.clamp_length(config.max_speed);
    }
}

fn obstacle_avoidance(pos: Vec2, env: &Environment, config: &SimConfig) -> Vec2 {
    let avoid = config.obstacle_avoid_radius;
    if avoid <= 0.0 {
        return Vec2::ZERO;
    }
    let mut steer = Vec2::ZERO;
    for rect in &env.buildings {
        let offset = pos - rect.closest_point(pos);
        let d_sq = offset.length_sq();
        if d_sq > 1e-6 {
            let d = d_sq.sqrt();
            if d < avoid {
                steer += offset * ((avoid - d) / avoid / d);
            }
        } else {
            // Inside the rectangle; phase 3 pushes out, steer via center.
            steer += (pos - rect.center()).normalized_or(Vec2::new(1.0, 0.0));
        }
    }
    for tree in &env.trees {
        let offset = pos - tree.center;
        let surface = offset.length() - tree.radius;
        if surface < avoid {
            let dir = offset.normalized_or(Vec2::new(1.0, 0.0));
            steer += dir * ((avoid - surface.max(0.0)) / avoid);
        }
    }
    steer
}

// ---------------------------------------------------------------------------
// Phase 2: behavior
// ---------------------------------------------------------------------------

/// Per-phase view over the columns: shared rows of everyone, mutable rows of
/// this job's range only (indexed by `i - start`).
struct BehaviorCtx<'a> {
    config: &'a SimConfig,
    grid: &'a SpatialGrid,
    sounds: &'a [GunshotSound],
    positions: &'a [Vec2],
    kinds: &'a [AgentKind],
    states_snapshot: &'a [AgentState],
    hero_roles: &'a [HeroRole],
    velocities: &'a mut [Vec2],
    states: &'a mut [AgentState],
    last_seen: &'a mut [Vec2],
    search_timers: &'a mut [f32],
    patrol_targets: &'a mut [Vec2],
    patrol_timers: &'a mut [f32],
    shoot_cooldowns: &'a mut [f32],
    aim_timers: &'a mut [f32],
    flee_plans: &'a mut [FleePlan],
    pending_shots: &'a mut [Option<u32>],
    rngs: &'a mut [SmallRng],
}

impl BehaviorCtx<'_> {
    /// Steer toward the current patrol destination, repicking it on arrival
    /// or when the timeout runs out. Patrol moves at a fraction of base
    /// speed. Returns the desired velocity.
    fn patrol_step(&mut self, li: usize, pos: Vec2, base_speed: f32, dt: f32) -> Vec2 {
        let config = self.config;
        self.patrol_timers[li] -= dt;
        let arrive_sq = config.patrol_arrive_radius * config.patrol_arrive_radius;
        if pos.distance_sq(self.patrol_targets[li]) < arrive_sq || self.patrol_timers[li] <= 0.0 {
            self.patrol_targets[li] = random_world_point(&mut self.rngs[li], config);
            self.patrol_timers[li] = config.patrol_timeout;
        }
        (self.patrol_targets[li] - pos).normalized_or(Vec2::ZERO)
            * (base_speed * config.patrol_speed_scale)
    }
}

fn random_world_point(rng: &mut SmallRng, config: &SimConfig) -> Vec2 {
    Vec2::new(
        rng.random_range(0.0..config.world_width),
        rng.random_range(0.0..config.world_height),
    )
}

/// Closest candidate passing `pred`, with its squared distance.
fn nearest_candidate(
    candidates: &[u32],
    positions: &[Vec2],
    self_idx: usize,
    from: Vec2,
    radius_sq: f32,
    mut pred: impl FnMut(usize) -> bool,
) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for &j in candidates {
        let j = j as usize;
        if j == self_idx || !pred(j) {
            continue;
        }
        let d_sq = from.distance_sq(positions[j]);
        if d_sq <= radius_sq && best.is_none_or(|(_, b)| d_sq < b) {
            best = Some((j, d_sq));
        }
    }
    best
}

/// Centroid of candidates passing `pred`, if any.
fn candidate_centroid(
    candidates: &[u32],
    positions: &[Vec2],
    self_idx: usize,
    from: Vec2,
    radius_sq: f32,
    mut pred: impl FnMut(usize) -> bool,
) -> Option<Vec2> {
    let mut sum = Vec2::ZERO;
    let mut count = 0u32;
    for &j in candidates {
        let j = j as usize;
        if j == self_idx || !pred(j) {
            continue;
        }
        if from.distance_sq(positions[j]) <= radius_sq {
            sum += positions[j];
            count += 1;
        }
    }
    (count > 0).then(|| sum * (1.0 / count as f32))
}

/// Run the per-kind state machines for `[start, end)`.
///
/// # Safety
/// Caller submits non-overlapping ranges and the states snapshot outlives
/// the phase (see [`WorldPtr`]).
pub(crate) unsafe fn behavior_chunk(world: WorldPtr, start: usize, end: usize, dt: f32) {
    let mut ctx = unsafe {
        BehaviorCtx {
            config: &*world.config,
            grid: &*world.grid,
            sounds: WorldPtr::shared(world.sounds, world.sounds_len),
            positions: WorldPtr::shared(world.positions.cast_const(), world.len),
            kinds: WorldPtr::shared(world.kinds, world.len),
            states_snapshot: WorldPtr::shared(world.states_snapshot, world.len),
            hero_roles: WorldPtr::shared(world.hero_roles, world.len),
            velocities: WorldPtr::owned(world.velocities, start, end),
            states: WorldPtr::owned(world.states, start, end),
            last_seen: WorldPtr::owned(world.last_seen, start, end),
            search_timers: WorldPtr::owned(world.search_timers, start, end),
            patrol_targets: WorldPtr::owned(world.patrol_targets, start, end),
            patrol_timers: WorldPtr::owned(world.patrol_timers, start, end),
            shoot_cooldowns: WorldPtr::owned(world.shoot_cooldowns, start, end),
            aim_timers: WorldPtr::owned(world.aim_timers, start, end),
            flee_plans: WorldPtr::owned(world.flee_plans, start, end),
            pending_shots: WorldPtr::owned(world.pending_shots, start, end),
            rngs: WorldPtr::owned(world.rngs, start, end),
        }
    };

    let mut neighbors = Vec::with_capacity(64);
    for i in start..end {
        let li = i - start;
        if matches!(ctx.states[li], AgentState::Fighting | AgentState::Dead) {
            continue;
        }
        let pos = ctx.positions[i];
        ctx.grid
            .query_neighbors(pos.x, pos.y, ctx.config.seek_radius, &mut neighbors);

        let desired = match ctx.kinds[i] {
            AgentKind::Civilian => civilian_behavior(&mut ctx, &neighbors, i, li, pos, dt),
            AgentKind::Zombie => zombie_behavior(&mut ctx, &neighbors, i, li, pos, dt),
            AgentKind::Hero => hero_behavior(&mut ctx, &neighbors, i, li, pos, dt),
        };

        let config = ctx.config;
        let vel = &mut ctx.velocities[li];
        let blend = (config.steer_rate * dt).min(1.0);
        *vel += (desired - *vel) * blend;
        boundary_steer(pos, vel, config);
        *vel = vel.clamp_length(config.max_speed);
    }
}

fn civilian_behavior(
    ctx: &mut BehaviorCtx<'_>,
    neighbors: &[u32],
    i: usize,
    li: usize,
    pos: Vec2,
    dt: f32,
) -> Vec2 {
    let config = ctx.config;
    let positions = ctx.positions;
    let kinds = ctx.kinds;
    let snapshot = ctx.states_snapshot;
    let seek_sq = config.seek_radius * config.seek_radius;

    let bitten = ctx.states[li] == AgentState::Bitten;
    let speed = config.civilian_speed
        * if bitten {
            config.bitten_speed_scale
        } else {
            1.0
        };

    let threat = nearest_candidate(neighbors, positions, i, pos, seek_sq, |j| {
        kinds[j] == AgentKind::Zombie && snapshot[j] != AgentState::Dead
    });

    if let Some((z, _)) = threat {
        ctx.last_seen[li] = positions[z];
        if !bitten && ctx.states[li] != AgentState::Fleeing {
            // Flee strategy is chosen once, on entry.
            ctx.states[li] = AgentState::Fleeing;
            ctx.flee_plans[li] =
                if ctx.rngs[li].random::<f32>() < config.flee_toward_hero_chance {
                    FleePlan::TowardHero
                } else {
                    FleePlan::AwayFromThreat
                };
        }
        let away = (pos - positions[z]).normalized_or(Vec2::new(1.0, 0.0));
        let dir = match ctx.flee_plans[li] {
            FleePlan::AwayFromThreat => away,
            FleePlan::TowardHero => {
                let hero = nearest_candidate(neighbors, positions, i, pos, seek_sq, |j| {
                    kinds[j] == AgentKind::Hero && snapshot[j] != AgentState::Dead
                });
                match hero {
                    Some((h, _)) => (positions[h] - pos).normalized_or(away),
                    None => away,
                }
            }
        };
        return dir * speed;
    }

    match ctx.states[li] {
        AgentState::Fleeing => {
            // Threat gone: keep the last sighting in mind for a while.
            ctx.states[li] = AgentState::Searching;
            ctx.search_timers[li] = config.search_duration;
            (pos - ctx.last_seen[li]).normalized_or(Vec2::ZERO)
                * (speed * config.patrol_speed_scale)
        }
        AgentState::Searching => {
            ctx.search_timers[li] -= dt;
            if ctx.search_timers[li] <= 0.0 {
                ctx.states[li] = AgentState::Idle;
                Vec2::ZERO
            } else {
                (pos - ctx.last_seen[li]).normalized_or(Vec2::ZERO)
                    * (speed * config.patrol_speed_scale)
            }
        }
        AgentState::Idle => {
            ctx.patrol_targets[li] = random_world_point(&mut ctx.rngs[li], config);
            ctx.patrol_timers[li] = config.patrol_timeout;
            ctx.states[li] = AgentState::Patrol;
            Vec2::ZERO
        }
        AgentState::Bitten => ctx.patrol_step(li, pos, speed, dt),
        _ => {
            ctx.states[li] = AgentState::Patrol;
            ctx.patrol_step(li, pos, speed, dt)
        }
    }
}

fn zombie_behavior(
    ctx: &mut BehaviorCtx<'_>,
    neighbors: &[u32],
    i: usize,
    li: usize,
    pos: Vec2,
    dt: f32,
) -> Vec2 {
    let config = ctx.config;
    let positions = ctx.positions;
    let kinds = ctx.kinds;
    let snapshot = ctx.states_snapshot;
    let seek_sq = config.seek_radius * config.seek_radius;

    let prey = nearest_candidate(neighbors, positions, i, pos, seek_sq, |j| {
        kinds[j] != AgentKind::Zombie && snapshot[j] != AgentState::Dead
    });

    if let Some((p, d_sq)) = prey {
        ctx.states[li] = AgentState::Pursuing;
        ctx.last_seen[li] = positions[p];
        let lunge_sq = config.lunge_radius * config.lunge_radius;
        let speed = if d_sq < lunge_sq {
            config.zombie_lunge_speed
        } else {
            config.zombie_speed
        };
        return (positions[p] - pos).normalized_or(Vec2::new(1.0, 0.0)) * speed;
    }

    // Sounds are a short list; check it directly rather than via the grid.
    let gun_sq = config.gunshot_radius * config.gunshot_radius;
    let heard = ctx
        .sounds
        .iter()
        .map(|s| (s, pos.distance_sq(s.pos)))
        .filter(|&(_, d_sq)| d_sq <= gun_sq)
        .min_by_key(|&(_, d_sq)| OrderedFloat(d_sq));

    let mut desired = if let Some((sound, _)) = heard {
        ctx.states[li] = AgentState::Searching;
        ctx.search_timers[li] = config.search_duration;
        ctx.last_seen[li] = sound.pos;
        (sound.pos - pos).normalized_or(Vec2::ZERO) * config.zombie_speed
    } else {
        match ctx.states[li] {
            AgentState::Pursuing => {
                ctx.states[li] = AgentState::Searching;
                ctx.search_timers[li] = config.search_duration;
                (ctx.last_seen[li] - pos).normalized_or(Vec2::ZERO) * config.zombie_speed
            }
            AgentState::Searching => {
                ctx.search_timers[li] -= dt;
                let arrive_sq =
                    config.patrol_arrive_radius * config.patrol_arrive_radius;
                if ctx.search_timers[li] <= 0.0 || pos.distance_sq(ctx.last_seen[li]) < arrive_sq
                {
                    ctx.states[li] = AgentState::Patrol;
                    ctx.patrol_timers[li] = 0.0;
                    ctx.patrol_step(li, pos, config.zombie_speed, dt)
                } else {
                    (ctx.last_seen[li] - pos).normalized_or(Vec2::ZERO) * config.zombie_speed
                }
            }
            _ => {
                ctx.states[li] = AgentState::Patrol;
                ctx.patrol_step(li, pos, config.zombie_speed, dt)
            }
        }
    };

    // Weak horde cohesion while wandering.
    if matches!(
        ctx.states[li],
        AgentState::Patrol | AgentState::Searching
    ) {
        let horde = candidate_centroid(neighbors, positions, i, pos, seek_sq, |j| {
            kinds[j] == AgentKind::Zombie && snapshot[j] != AgentState::Dead
        });
        if let Some(centroid) = horde {
            desired += (centroid - pos).normalized_or(Vec2::ZERO)
                * (config.zombie_speed * config.horde_cohesion);
        }
    }
    desired
}

fn hero_behavior(
    ctx: &mut BehaviorCtx<'_>,
    neighbors: &[u32],
    i: usize,
    li: usize,
    pos: Vec2,
    dt: f32,
) -> Vec2 {
    let config = ctx.config;
    let positions = ctx.positions;
    let kinds = ctx.kinds;
    let snapshot = ctx.states_snapshot;
    let seek_sq = config.seek_radius * config.seek_radius;

    ctx.shoot_cooldowns[li] = (ctx.shoot_cooldowns[li] - dt).max(0.0);

    let target = nearest_candidate(neighbors, positions, i, pos, seek_sq, |j| {
        kinds[j] == AgentKind::Zombie && snapshot[j] != AgentState::Dead
    });

    let Some((z, d_sq)) = target else {
        ctx.aim_timers[li] = 0.0;
        ctx.states[li] = AgentState::Patrol;
        return ctx.patrol_step(li, pos, config.hero_speed, dt);
    };

    ctx.states[li] = AgentState::Pursuing;
    ctx.last_seen[li] = positions[z];
    let to_target = (positions[z] - pos).normalized_or(Vec2::new(1.0, 0.0));

    let mut desired = match ctx.hero_roles[i] {
        HeroRole::Hunter => to_target * config.hero_speed,
        HeroRole::Defender => {
            let kite_sq = config.defender_kite_radius * config.defender_kite_radius;
            let dir = if d_sq < kite_sq { -to_target } else { to_target };
            let mut out = dir * config.hero_speed;
            let squad = candidate_centroid(neighbors, positions, i, pos, seek_sq, |j| {
                kinds[j] == AgentKind::Hero && snapshot[j] != AgentState::Dead
            });
            if let Some(centroid) = squad {
                out += (centroid - pos).normalized_or(Vec2::ZERO)
                    * (config.hero_speed * config.squad_cohesion);
            }
            out
        }
    };

    if ctx.aim_timers[li] > 0.0 {
        ctx.aim_timers[li] -= dt;
        if ctx.aim_timers[li] <= 0.0 {
            // Shot lands on the target tracked at expiry; the serial combat
            // phase materialises damage and events from this slot.
            ctx.pending_shots[li] = Some(z as u32);
            ctx.shoot_cooldowns[li] = config.shoot_cooldown;
        }
    } else {
        let engage_sq = config.hero_engage_radius * config.hero_engage_radius;
        if d_sq < engage_sq && ctx.shoot_cooldowns[li] <= 0.0 {
            ctx.aim_timers[li] = ctx.rngs[li].random_range(config.aim_time_min..=config.aim_time_max);
        }
    }

    // Holding aim steadies the hero.
    if ctx.aim_timers[li] > 0.0 {
        desired = desired * 0.25;
    }
    desired
}

/// Keep agents inside the world: within the danger zone of an edge, blend a
/// perpendicular push inward and damp the approach velocity, both scaled by
/// urgency. The movement phase still applies a hard reflective clamp.
fn boundary_steer(pos: Vec2, vel: &mut Vec2, config: &SimConfig) {
    let zone = config.boundary_zone;
    if zone <= 0.0 {
        return;
    }
    let push = config.boundary_push;
    let w = config.world_width;
    let h = config.world_height;

    if pos.x < zone {
        let urgency = (zone - pos.x) / zone;
        if vel.x < 0.0 {
            vel.x *= 1.0 - BOUNDARY_BLEND * urgency;
        }
        vel.x += BOUNDARY_BLEND * urgency * push;
    } else if pos.x > w - zone {
        let urgency = (pos.x - (w - zone)) / zone;
        if vel.x > 0.0 {
            vel.x *= 1.0 - BOUNDARY_BLEND * urgency;
        }
        vel.x -= BOUNDARY_BLEND * urgency * push;
    }

    if pos.y < zone {
        let urgency = (zone - pos.y) / zone;
        if vel.y < 0.0 {
            vel.y *= 1.0 - BOUNDARY_BLEND * urgency;
        }
        vel.y += BOUNDARY_BLEND * urgency * push;
    } else if pos.y > h - zone {
        let urgency = (pos.y - (h - zone)) / zone;
        if vel.y > 0.0 {
            vel.y *= 1.0 - BOUNDARY_BLEND * urgency;
        }
        vel.y -= BOUNDARY_BLEND * urgency * push;
    }
}

// ---------------------------------------------------------------------------
// Phase 3: movement
// ---------------------------------------------------------------------------

/// Integrate positions for `[start, end)`, resolve obstacle contact, clamp
/// into the world, and refresh facing directions.
///
/// # Safety
/// Caller submits non-overlapping ranges (see [`WorldPtr`]).
pub(crate) unsafe fn movement_chunk(world: WorldPtr, start: usize, end: usize, dt: f32) {
    let positions = unsafe { WorldPtr::owned(world.positions, start, end) };
    let velocities = unsafe { WorldPtr::owned(world.velocities, start, end) };
    let facings = unsafe { WorldPtr::owned(world.facings, start, end) };
    let env = unsafe { &*world.env };
    let config = unsafe { &*world.config };

    let w = config.world_width;
    let h = config.world_height;

    for li in 0..(end - start) {
        let mut vel = velocities[li];
        let mut pos = positions[li] + vel * dt;

        for rect in &env.buildings {
            if !rect.contains(pos) {
                continue;
            }
            // Push out along the axis with the smaller overlap and reflect
            // that axis's velocity, damped.
            let left = pos.x - rect.min.x;
            let right = rect.max.x - pos.x;
            let up = pos.y - rect.min.y;
            let down = rect.max.y - pos.y;
            if left.min(right) < up.min(down) {
                pos.x = if left < right { rect.min.x } else { rect.max.x };
                vel.x = -vel.x * RECT_RESTITUTION;
            } else {
                pos.y = if up < down { rect.min.y } else { rect.max.y };
                vel.y = -vel.y * RECT_RESTITUTION;
            }
        }

        for tree in &env.trees {
            let offset = pos - tree.center;
            if offset.length_sq() < tree.radius * tree.radius {
                let normal = offset.normalized_or(Vec2::new(1.0, 0.0));
                pos = tree.center + normal * tree.radius;
                let along = vel.dot(normal);
                if along < 0.0 {
                    vel -= normal * along;
                }
            }
        }

        // Hard reflective clamp; boundary steering should make this rare.
        if pos.x < 0.0 {
            pos.x = 0.0;
            vel.x = vel.x.abs();
        } else if pos.x > w {
            pos.x = w;
            vel.x = -vel.x.abs();
        }
        if pos.y < 0.0 {
            pos.y = 0.0;
            vel.y = vel.y.abs();
        } else if pos.y > h {
            pos.y = h;
            vel.y = -vel.y.abs();
        }

        positions[li] = pos;
        velocities[li] = vel;
        if vel.length_sq() > FACING_EPSILON * FACING_EPSILON {
            facings[li] = vel.normalized_or(facings[li]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::agent_stream;

    fn harness(
        agents: &[(Vec2, Vec2, AgentKind, AgentState)],
    ) -> (AgentColumns, SpatialGrid, Environment, SimConfig) {
        let config = SimConfig {
            building_count: 0,
            tree_count: 0,
            rng_seed: Some(1),
            ..SimConfig::default()
        };
        let env = Environment::open(&config);
        let mut columns = AgentColumns::new();
        for (serial, &(pos, vel, kind, state)) in agents.iter().enumerate() {
            columns.spawn(
                pos,
                vel,
                kind,
                HeroRole::Hunter,
                3,
                config.world_width,
                config.world_height,
                agent_stream(1, serial as u64),
                config.patrol_timeout,
            );
            let last = columns.len() - 1;
            columns.states_mut()[last] = state;
        }
        let mut grid =
            SpatialGrid::new(config.world_width, config.world_height, config.cell_size)
                .expect("grid");
        for (i, p) in columns.positions().iter().enumerate() {
            grid.insert(i as u32, p.x, p.y);
        }
        (columns, grid, env, config)
    }

    #[test]
    fn separation_pushes_close_agents_apart() {
        let (mut columns, grid, env, config) = harness(&[
            (
                Vec2::new(400.0, 300.0),
                Vec2::ZERO,
                AgentKind::Civilian,
                AgentState::Patrol,
            ),
            (
                Vec2::new(410.0, 300.0),
                Vec2::ZERO,
                AgentKind::Civilian,
                AgentState::Patrol,
            ),
        ]);
        let snapshot = columns.states().to_vec();
        let world = WorldPtr::capture(&mut columns, &snapshot, &grid, &env, &config, &[]);
        unsafe { separation_chunk(world, 0, 2, 1.0 / 60.0) };
        assert!(columns.velocities()[0].x < 0.0);
        assert!(columns.velocities()[1].x > 0.0);
    }

    #[test]
    fn movement_reflects_off_the_world_edge() {
        let (mut columns, grid, env, config) = harness(&[(
            Vec2::new(1.0, 300.0),
            Vec2::new(-300.0, 0.0),
            AgentKind::Zombie,
            AgentState::Patrol,
        )]);
        let snapshot = columns.states().to_vec();
        let world = WorldPtr::capture(&mut columns, &snapshot, &grid, &env, &config, &[]);
        unsafe { movement_chunk(world, 0, 1, 1.0 / 60.0) };
        let pos = columns.positions()[0];
        assert!(pos.x >= 0.0);
        assert!(columns.velocities()[0].x >= 0.0);
    }

    #[test]
    fn movement_pushes_out_of_buildings() {
        let (mut columns, grid, mut env, config) = harness(&[(
            Vec2::new(495.0, 300.0),
            Vec2::new(120.0, 0.0),
            AgentKind::Hero,
            AgentState::Patrol,
        )]);
        env.buildings.push(crate::Rect::new(
            Vec2::new(496.0, 250.0),
            Vec2::new(600.0, 350.0),
        ));
        let snapshot = columns.states().to_vec();
        let world = WorldPtr::capture(&mut columns, &snapshot, &grid, &env, &config, &[]);
        unsafe { movement_chunk(world, 0, 1, 1.0 / 60.0) };
        let pos = columns.positions()[0];
        assert!(!env.buildings[0].contains(pos) || pos.x == env.buildings[0].min.x);
        assert!(columns.velocities()[0].x <= 0.0);
    }

    #[test]
    fn civilians_flee_from_zombies() {
        let (mut columns, grid, env, config) = harness(&[
            (
                Vec2::new(400.0, 300.0),
                Vec2::ZERO,
                AgentKind::Civilian,
                AgentState::Patrol,
            ),
            (
                Vec2::new(430.0, 300.0),
                Vec2::ZERO,
                AgentKind::Zombie,
                AgentState::Patrol,
            ),
        ]);
        let snapshot = columns.states().to_vec();
        let world = WorldPtr::capture(&mut columns, &snapshot, &grid, &env, &config, &[]);
        unsafe { behavior_chunk(world, 0, 2, 1.0 / 60.0) };
        assert_eq!(columns.states()[0], AgentState::Fleeing);
        assert_eq!(columns.states()[1], AgentState::Pursuing);
        // The zombie chases; the civilian's velocity gains an away component.
        assert!(columns.velocities()[1].x < 0.0);
    }

    #[test]
    fn zombies_head_toward_gunshots() {
        let (mut columns, grid, env, config) = harness(&[(
            Vec2::new(400.0, 300.0),
            Vec2::ZERO,
            AgentKind::Zombie,
            AgentState::Patrol,
        )]);
        let snapshot = columns.states().to_vec();
        let sounds = [GunshotSound {
            pos: Vec2::new(600.0, 300.0),
            ttl: 2.0,
        }];
        let world = WorldPtr::capture(&mut columns, &snapshot, &grid, &env, &config, &sounds);
        unsafe { behavior_chunk(world, 0, 1, 1.0 / 60.0) };
        assert_eq!(columns.states()[0], AgentState::Searching);
        assert!(columns.velocities()[0].x > 0.0);
    }

    #[test]
    fn boundary_steering_pushes_inward() {
        let config = SimConfig::default();
        let mut vel = Vec2::new(-50.0, 0.0);
        boundary_steer(Vec2::new(10.0, 360.0), &mut vel, &config);
        assert!(vel.x > -50.0);
        let mut vel = Vec2::new(50.0, 0.0);
        boundary_steer(Vec2::new(1270.0, 360.0), &mut vel, &config);
        assert!(vel.x < 50.0);
    }
}
