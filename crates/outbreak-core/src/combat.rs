//! Serial combat-and-infection phase.
//!
//! Everything here changes topology: states with cross-references, kind
//! flips, deletions. It runs on the main thread after the parallel
//! phases have been joined. All random rolls come from the main-thread RNG.

use rand::Rng;

use crate::sim::Simulation;
use crate::{AgentKind, AgentState, GunshotBeam, GunshotSound, Vec2, NO_TARGET};

/// Outcome of a civilian-versus-zombie fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CivilianOutcome {
    /// The civilian brings the zombie down and gets away clean.
    KillZombie,
    /// The zombie dies, but not before biting the civilian.
    KillZombieButBitten,
    /// The civilian breaks free bitten; the zombie lives.
    BittenEscape,
    /// The civilian is killed and left as a corpse.
    Death,
}

/// Outcome of a hero-versus-zombie fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeroOutcome {
    ZombieDies,
    BothWounded,
}

/// Sample the civilian fight table by walking the cumulative weights with a
/// unit roll. Nearby civilians raise the survival odds (capped), nearby
/// zombies raise the death odds (capped).
#[must_use]
pub fn civilian_outcome(roll: f32, civilian_allies: u32, zombie_allies: u32) -> CivilianOutcome {
    let survival_bonus = (0.15 * civilian_allies as f32).min(0.30);
    let kill = 0.15 + survival_bonus;
    let kill_bitten = 0.10 + 0.5 * survival_bonus;
    let escape = 0.30;
    let death = 0.45 + (0.08 * zombie_allies as f32).min(0.25) - survival_bonus;

    let total = kill + kill_bitten + escape + death;
    let mut cursor = roll.clamp(0.0, 1.0) * total;
    cursor -= kill;
    if cursor < 0.0 {
        return CivilianOutcome::KillZombie;
    }
    cursor -= kill_bitten;
    if cursor < 0.0 {
        return CivilianOutcome::KillZombieButBitten;
    }
    cursor -= escape;
    if cursor < 0.0 {
        return CivilianOutcome::BittenEscape;
    }
    CivilianOutcome::Death
}

/// Sample the hero fight table: 80% the zombie dies outright, otherwise
/// both sides take a wound.
#[must_use]
pub fn hero_outcome(roll: f32) -> HeroOutcome {
    if roll < 0.8 {
        HeroOutcome::ZombieDies
    } else {
        HeroOutcome::BothWounded
    }
}

pub(crate) fn run(sim: &mut Simulation, dt: f32) {
    advance_combat_cooldowns(sim, dt);
    materialize_shots(sim);
    resolve_fights(sim, dt);
    initiate_fights(sim);
    advance_infection(sim, dt);
    advance_reanimation(sim, dt);
    feed_on_corpses(sim);
    apply_deaths(sim);
}

fn advance_combat_cooldowns(sim: &mut Simulation, dt: f32) {
    for cooldown in &mut sim.columns.combat_cooldowns {
        *cooldown = (*cooldown - dt).max(0.0);
    }
}

/// Turn the per-hero pending-shot slots filled during the behavior phase
/// into beam/sound events and target damage.
fn materialize_shots(sim: &mut Simulation) {
    let n = sim.columns.len();
    for i in 0..n {
        let Some(target) = sim.columns.pending_shots[i].take() else {
            continue;
        };
        let t = target as usize;
        if t >= n
            || sim.columns.kinds[t] != AgentKind::Zombie
            || sim.columns.states[t] == AgentState::Dead
        {
            continue;
        }
        let from = sim.columns.positions[i];
        let to = sim.columns.positions[t];
        sim.beams.push(GunshotBeam {
            from,
            to,
            ttl: sim.config.beam_lifetime,
        });
        sim.sounds.push(GunshotSound {
            pos: from,
            ttl: sim.config.sound_lifetime,
        });
        sim.columns.healths[t] = sim.columns.healths[t].saturating_sub(1);
        if sim.columns.healths[t] == 0 {
            mark_zombie_dead(sim, t);
        }
    }
}

fn resolve_fights(sim: &mut Simulation, dt: f32) {
    let n = sim.columns.len();
    for i in 0..n {
        if sim.columns.states[i] != AgentState::Fighting {
            continue;
        }
        let j = sim.columns.combat_targets[i] as usize;
        if j >= n
            || sim.columns.states[j] != AgentState::Fighting
            || sim.columns.combat_targets[j] != i as u32
        {
            // A broken lock is a bug; recover by releasing the orphan.
            debug_assert!(false, "fighting agent {i} without a mutual lock");
            release_from_fight(sim, i);
            continue;
        }
        if j < i {
            // Pairs are driven from their lower index.
            continue;
        }
        sim.columns.combat_timers[i] -= dt;
        sim.columns.combat_timers[j] -= dt;
        if sim.columns.combat_timers[i] <= 0.0 {
            resolve_pair(sim, i, j);
        }
    }
}

fn resolve_pair(sim: &mut Simulation, i: usize, j: usize) {
    let (victim, zombie) = if sim.columns.kinds[i] == AgentKind::Zombie {
        (j, i)
    } else {
        (i, j)
    };
    debug_assert_eq!(sim.columns.kinds[zombie], AgentKind::Zombie);

    match sim.columns.kinds[victim] {
        AgentKind::Civilian => {
            let (allies, horde) = count_allies_near(sim, sim.columns.positions[victim]);
            let roll = sim.rng.random::<f32>();
            match civilian_outcome(roll, allies, horde) {
                CivilianOutcome::KillZombie => {
                    mark_zombie_dead(sim, zombie);
                    release_from_fight(sim, victim);
                }
                CivilianOutcome::KillZombieButBitten => {
                    mark_zombie_dead(sim, zombie);
                    bite(sim, victim);
                }
                CivilianOutcome::BittenEscape => {
                    bite(sim, victim);
                    release_from_fight(sim, zombie);
                }
                CivilianOutcome::Death => {
                    lay_corpse(sim, victim);
                    release_from_fight(sim, zombie);
                }
            }
        }
        AgentKind::Hero => {
            let roll = sim.rng.random::<f32>();
            match hero_outcome(roll) {
                HeroOutcome::ZombieDies => {
                    mark_zombie_dead(sim, zombie);
                    release_from_fight(sim, victim);
                }
                HeroOutcome::BothWounded => {
                    sim.columns.healths[zombie] = sim.columns.healths[zombie].saturating_sub(1);
                    if sim.columns.healths[zombie] == 0 {
                        mark_zombie_dead(sim, zombie);
                    } else {
                        release_from_fight(sim, zombie);
                    }
                    sim.columns.healths[victim] = sim.columns.healths[victim].saturating_sub(1);
                    if sim.columns.healths[victim] == 0 {
                        turn_hero(sim, victim);
                    } else {
                        release_from_fight(sim, victim);
                    }
                }
            }
        }
        AgentKind::Zombie => unreachable!("zombie locked against zombie"),
    }

    push_apart(sim, i, j);
}

/// Scan zombies off cooldown for adjacent targets and lock new fights.
fn initiate_fights(sim: &mut Simulation) {
    let n = sim.columns.len();
    let melee = sim.config.melee_radius;
    let melee_sq = melee * melee;
    let mut candidates = Vec::with_capacity(16);

    for z in 0..n {
        if sim.columns.kinds[z] != AgentKind::Zombie {
            continue;
        }
        if matches!(
            sim.columns.states[z],
            AgentState::Fighting | AgentState::Dead
        ) || sim.columns.combat_cooldowns[z] > 0.0
        {
            continue;
        }
        let pos = sim.columns.positions[z];
        sim.grid.query_neighbors(pos.x, pos.y, melee, &mut candidates);

        let mut best: Option<(usize, f32)> = None;
        for &t in &candidates {
            let t = t as usize;
            if t == z || sim.columns.kinds[t] == AgentKind::Zombie {
                continue;
            }
            if matches!(
                sim.columns.states[t],
                AgentState::Fighting | AgentState::Dead | AgentState::Bitten
            ) || sim.columns.combat_cooldowns[t] > 0.0
            {
                continue;
            }
            let d_sq = pos.distance_sq(sim.columns.positions[t]);
            if d_sq <= melee_sq && best.is_none_or(|(_, b)| d_sq < b) {
                best = Some((t, d_sq));
            }
        }

        if let Some((t, _)) = best {
            lock_fight(sim, z, t);
        }
    }
}

fn lock_fight(sim: &mut Simulation, zombie: usize, target: usize) {
    let duration = if sim.columns.kinds[target] == AgentKind::Hero {
        sim.rng
            .random_range(sim.config.hero_combat_time_min..=sim.config.hero_combat_time_max)
    } else {
        sim.rng
            .random_range(sim.config.combat_time_min..=sim.config.combat_time_max)
    };
    for &idx in &[zombie, target] {
        sim.columns.states[idx] = AgentState::Fighting;
        sim.columns.velocities[idx] = Vec2::ZERO;
        sim.columns.combat_timers[idx] = duration;
    }
    sim.columns.combat_targets[zombie] = target as u32;
    sim.columns.combat_targets[target] = zombie as u32;
}

fn advance_infection(sim: &mut Simulation, dt: f32) {
    let n = sim.columns.len();
    for i in 0..n {
        if sim.columns.states[i] != AgentState::Bitten {
            continue;
        }
        let timer = sim.columns.infection_timers[i];
        if timer > 0.0 {
            // d(progress)/dt = (1 - progress) / remaining integrates to a
            // linear ramp hitting 1.0 exactly when the timer expires.
            let step = dt.min(timer);
            let progress = sim.columns.infection_progress[i];
            sim.columns.infection_progress[i] =
                (progress + step * (1.0 - progress) / timer).min(1.0);
            sim.columns.infection_timers[i] = timer - dt;
        }
        if sim.columns.infection_timers[i] <= 0.0 {
            sim.columns.infection_progress[i] = 1.0;
            lay_corpse(sim, i);
        }
    }
}

fn advance_reanimation(sim: &mut Simulation, dt: f32) {
    let n = sim.columns.len();
    for i in 0..n {
        if sim.columns.kinds[i] != AgentKind::Civilian || sim.columns.states[i] != AgentState::Dead
        {
            continue;
        }
        sim.columns.reanimation_timers[i] -= dt;
        if sim.columns.reanimation_timers[i] <= 0.0 {
            sim.columns.kinds[i] = AgentKind::Zombie;
            sim.columns.healths[i] = sim.config.zombie_health;
            sim.columns.states[i] = AgentState::Patrol;
            sim.columns.patrol_timers[i] = 0.0;
            sim.columns.infection_timers[i] = 0.0;
            sim.columns.infection_progress[i] = 0.0;
            sim.columns.reanimation_timers[i] = 0.0;
        }
    }
}

/// Injured zombies adjacent to a civilian corpse consume it for one hit
/// point. A per-tick claim list keeps two zombies off the same corpse, and
/// each zombie eats at most once per tick.
fn feed_on_corpses(sim: &mut Simulation) {
    let n = sim.columns.len();
    let melee = sim.config.melee_radius;
    let melee_sq = melee * melee;
    let mut candidates = Vec::with_capacity(16);
    let mut claimed: Vec<usize> = Vec::new();

    for z in 0..n {
        if sim.columns.kinds[z] != AgentKind::Zombie
            || matches!(
                sim.columns.states[z],
                AgentState::Fighting | AgentState::Dead
            )
            || sim.columns.healths[z] >= sim.config.zombie_health
        {
            continue;
        }
        let pos = sim.columns.positions[z];
        sim.grid.query_neighbors(pos.x, pos.y, melee, &mut candidates);
        let corpse = candidates.iter().map(|&c| c as usize).find(|&c| {
            c != z
                && sim.columns.kinds[c] == AgentKind::Civilian
                && sim.columns.states[c] == AgentState::Dead
                && !claimed.contains(&c)
                && pos.distance_sq(sim.columns.positions[c]) <= melee_sq
        });
        if let Some(c) = corpse {
            claimed.push(c);
            sim.columns.healths[z] += 1;
            sim.death_list.push(c);
        }
    }
}

/// Dedup the death list, remove rows from the top down, and repoint any
/// combat target that referenced the row swapped in from the tail.
fn apply_deaths(sim: &mut Simulation) {
    if sim.death_list.is_empty() {
        return;
    }
    let mut deaths = std::mem::take(&mut sim.death_list);
    deaths.sort_unstable_by(|a, b| b.cmp(a));
    deaths.dedup();

    for d in deaths.drain(..) {
        let last = sim.columns.len() - 1;
        debug_assert!(d <= last);
        debug_assert_eq!(sim.columns.states[d], AgentState::Dead);
        if d != last && sim.columns.states[last] == AgentState::Fighting {
            let partner = sim.columns.combat_targets[last] as usize;
            if partner < sim.columns.len() && sim.columns.combat_targets[partner] == last as u32 {
                sim.columns.combat_targets[partner] = d as u32;
            }
        }
        sim.columns.kill(d);
    }
    sim.death_list = deaths;
}

// --- shared transitions ----------------------------------------------------

/// Release one side of a resolved fight back into play.
pub(crate) fn release_from_fight(sim: &mut Simulation, idx: usize) {
    sim.columns.combat_targets[idx] = NO_TARGET;
    sim.columns.combat_timers[idx] = 0.0;
    sim.columns.combat_cooldowns[idx] = sim.config.combat_cooldown;
    sim.columns.states[idx] = match sim.columns.kinds[idx] {
        AgentKind::Civilian => AgentState::Fleeing,
        AgentKind::Zombie | AgentKind::Hero => AgentState::Pursuing,
    };
}

/// Queue a zombie for deletion, releasing any partner it was locked with.
fn mark_zombie_dead(sim: &mut Simulation, idx: usize) {
    debug_assert_eq!(sim.columns.kinds[idx], AgentKind::Zombie);
    if sim.columns.states[idx] == AgentState::Fighting {
        let partner = sim.columns.combat_targets[idx] as usize;
        if partner < sim.columns.len() && sim.columns.combat_targets[partner] == idx as u32 {
            release_from_fight(sim, partner);
        }
    }
    sim.columns.states[idx] = AgentState::Dead;
    sim.columns.velocities[idx] = Vec2::ZERO;
    sim.columns.combat_targets[idx] = NO_TARGET;
    sim.death_list.push(idx);
}

/// Leave a civilian corpse that may reanimate or be consumed.
fn lay_corpse(sim: &mut Simulation, idx: usize) {
    sim.columns.states[idx] = AgentState::Dead;
    sim.columns.velocities[idx] = Vec2::ZERO;
    sim.columns.combat_targets[idx] = NO_TARGET;
    sim.columns.combat_timers[idx] = 0.0;
    sim.columns.combat_cooldowns[idx] = 0.0;
    sim.columns.reanimation_timers[idx] = sim
        .rng
        .random_range(sim.config.reanimation_time_min..=sim.config.reanimation_time_max);
}

/// Infect a civilian; still alive and moving, on a countdown.
fn bite(sim: &mut Simulation, idx: usize) {
    sim.columns.states[idx] = AgentState::Bitten;
    sim.columns.combat_targets[idx] = NO_TARGET;
    sim.columns.combat_timers[idx] = 0.0;
    sim.columns.combat_cooldowns[idx] = sim.config.combat_cooldown;
    sim.columns.infection_timers[idx] = sim
        .rng
        .random_range(sim.config.infection_time_min..=sim.config.infection_time_max);
    sim.columns.infection_progress[idx] = 0.0;
}

/// An exhausted hero turns: same row, new kind.
fn turn_hero(sim: &mut Simulation, idx: usize) {
    debug_assert_eq!(sim.columns.kinds[idx], AgentKind::Hero);
    sim.columns.kinds[idx] = AgentKind::Zombie;
    sim.columns.healths[idx] = sim.config.zombie_health;
    sim.columns.states[idx] = AgentState::Patrol;
    sim.columns.patrol_timers[idx] = 0.0;
    sim.columns.combat_targets[idx] = NO_TARGET;
    sim.columns.combat_timers[idx] = 0.0;
    sim.columns.combat_cooldowns[idx] = sim.config.combat_cooldown;
    sim.columns.aim_timers[idx] = 0.0;
    sim.columns.shoot_cooldowns[idx] = 0.0;
    sim.columns.pending_shots[idx] = None;
}

/// Count live civilians and zombies near a fight.
fn count_allies_near(sim: &Simulation, pos: Vec2) -> (u32, u32) {
    let radius = sim.config.ally_radius;
    let radius_sq = radius * radius;
    let mut candidates = Vec::with_capacity(32);
    sim.grid
        .query_neighbors(pos.x, pos.y, radius, &mut candidates);
    let mut civilians: u32 = 0;
    let mut zombies: u32 = 0;
    for &c in &candidates {
        let c = c as usize;
        if sim.columns.states[c] == AgentState::Dead {
            continue;
        }
        if pos.distance_sq(sim.columns.positions[c]) > radius_sq {
            continue;
        }
        match sim.columns.kinds[c] {
            AgentKind::Civilian => civilians += 1,
            AgentKind::Zombie => zombies += 1,
            AgentKind::Hero => {}
        }
    }
    // The two combatants themselves sit inside the radius.
    (civilians.saturating_sub(1), zombies.saturating_sub(1))
}

/// Shove resolved combatants apart so they do not immediately re-engage.
fn push_apart(sim: &mut Simulation, i: usize, j: usize) {
    if sim.columns.states[i] == AgentState::Dead && sim.columns.states[j] == AgentState::Dead {
        return;
    }
    let dir = (sim.columns.positions[i] - sim.columns.positions[j])
        .normalized_or(Vec2::new(1.0, 0.0));
    let half = sim.config.combat_separation * 0.5;
    let w = sim.config.world_width;
    let h = sim.config.world_height;
    let clamp = |p: Vec2| Vec2::new(p.x.clamp(0.0, w), p.y.clamp(0.0, h));
    if sim.columns.states[i] != AgentState::Dead {
        sim.columns.positions[i] = clamp(sim.columns.positions[i] + dir * half);
    }
    if sim.columns.states[j] != AgentState::Dead {
        sim.columns.positions[j] = clamp(sim.columns.positions[j] - dir * half);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civilian_table_edges() {
        // Low rolls kill the zombie, high rolls kill the civilian.
        assert_eq!(civilian_outcome(0.0, 0, 0), CivilianOutcome::KillZombie);
        assert_eq!(civilian_outcome(1.0, 0, 0), CivilianOutcome::Death);
    }

    #[test]
    fn civilian_table_walks_the_cumulative() {
        // With no allies the weights are 0.15 / 0.10 / 0.30 / 0.45.
        assert_eq!(civilian_outcome(0.10, 0, 0), CivilianOutcome::KillZombie);
        assert_eq!(
            civilian_outcome(0.20, 0, 0),
            CivilianOutcome::KillZombieButBitten
        );
        assert_eq!(civilian_outcome(0.40, 0, 0), CivilianOutcome::BittenEscape);
        assert_eq!(civilian_outcome(0.80, 0, 0), CivilianOutcome::Death);
    }

    #[test]
    fn civilian_allies_improve_the_odds() {
        // Full survival bonus: kill weight doubles from 0.15 to 0.45 while
        // the death weight falls to 0.15.
        let with_allies = civilian_outcome(0.30, 4, 0);
        assert_eq!(with_allies, CivilianOutcome::KillZombie);
        let without = civilian_outcome(0.30, 0, 0);
        assert_ne!(without, CivilianOutcome::KillZombie);
    }

    #[test]
    fn zombie_allies_cap_out() {
        // The horde bonus saturates at +0.25 regardless of the count.
        let capped = civilian_outcome(0.999, 0, 3);
        let over = civilian_outcome(0.999, 0, 300);
        assert_eq!(capped, over);
        assert_eq!(capped, CivilianOutcome::Death);
    }

    #[test]
    fn hero_table_splits_at_eighty_percent() {
        assert_eq!(hero_outcome(0.0), HeroOutcome::ZombieDies);
        assert_eq!(hero_outcome(0.79), HeroOutcome::ZombieDies);
        assert_eq!(hero_outcome(0.80), HeroOutcome::BothWounded);
        assert_eq!(hero_outcome(1.0), HeroOutcome::BothWounded);
    }
}
