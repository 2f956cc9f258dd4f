use outbreak_core::{
    AgentKind, AgentState, HeroRole, PopulationCounts, SimConfig, Simulation, Vec2, FACING_EPSILON,
    NO_TARGET,
};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn open_field_config(seed: u64) -> SimConfig {
    SimConfig {
        rng_seed: Some(seed),
        worker_threads: Some(2),
        building_count: 0,
        tree_count: 0,
        ..SimConfig::default()
    }
}

fn empty_sim(seed: u64) -> Simulation {
    Simulation::new(open_field_config(seed)).expect("simulation")
}

/// Spawn a hand-placed agent, bypassing the ratio spawner.
fn place(
    sim: &mut Simulation,
    pos: Vec2,
    kind: AgentKind,
    role: HeroRole,
    health: u8,
    stream_seed: u64,
) -> usize {
    let (w, h, timeout) = {
        let config = sim.config();
        (config.world_width, config.world_height, config.patrol_timeout)
    };
    sim.columns_mut().spawn(
        pos,
        Vec2::ZERO,
        kind,
        role,
        health,
        w,
        h,
        SmallRng::seed_from_u64(stream_seed),
        timeout,
    );
    sim.columns().positions().len() - 1
}

fn assert_invariants(sim: &Simulation) {
    let n = sim.agent_count();
    let columns = sim.columns();
    assert_eq!(columns.positions().len(), n);
    assert_eq!(columns.states().len(), n);
    assert_eq!(columns.kinds().len(), n);
    assert_eq!(columns.healths().len(), n);
    assert_eq!(columns.combat_targets().len(), n);

    let counts: PopulationCounts = sim.population();
    assert_eq!(counts.total(), n, "population buckets must partition");

    let (w, h) = (sim.config().world_width, sim.config().world_height);
    for view in sim.agents() {
        assert!(
            view.pos.x >= 0.0 && view.pos.x <= w && view.pos.y >= 0.0 && view.pos.y <= h,
            "agent {} outside the world at {:?}",
            view.index,
            view.pos
        );
    }

    let states = columns.states();
    let targets = columns.combat_targets();
    for i in 0..n {
        if states[i] == AgentState::Fighting {
            let j = targets[i] as usize;
            assert!(j < n, "combat target of {i} out of range");
            assert_eq!(states[j], AgentState::Fighting, "partner of {i} not fighting");
            assert_eq!(targets[j], i as u32, "lock of {i} not mutual");
        } else if states[i] == AgentState::Dead {
            assert_eq!(columns.velocities()[i], Vec2::ZERO, "dead agent {i} moving");
        }
    }

    for i in 0..n {
        if columns.velocities()[i].length_sq() > FACING_EPSILON * FACING_EPSILON {
            let len = columns.facings()[i].length();
            assert!((len - 1.0).abs() < 1e-3, "facing of {i} not unit ({len})");
        }
    }

    for i in 0..n {
        if columns.kinds()[i] == AgentKind::Hero {
            assert!(columns.healths()[i] >= 1, "exhausted hero {i} did not turn");
        }
    }
}

#[test]
fn fight_locks_form_and_resolve() {
    // A civilian and a zombie 15 units apart end up in a mutual lock that
    // resolves within the 2-4 s combat window.
    let mut sim = empty_sim(0);
    let civ = place(
        &mut sim,
        Vec2::new(640.0, 360.0),
        AgentKind::Civilian,
        HeroRole::Defender,
        0,
        1,
    );
    let zom = place(
        &mut sim,
        Vec2::new(655.0, 360.0),
        AgentKind::Zombie,
        HeroRole::Defender,
        3,
        2,
    );

    let dt = sim.config().fixed_dt;
    let mut locked = false;
    for _ in 0..240 {
        sim.tick(dt);
        let states = sim.columns().states();
        if states.iter().any(|&s| s == AgentState::Fighting) {
            locked = true;
            break;
        }
    }
    assert!(locked, "no fight formed within four seconds");

    let columns = sim.columns();
    assert_eq!(columns.states()[civ], AgentState::Fighting);
    assert_eq!(columns.states()[zom], AgentState::Fighting);
    assert_eq!(columns.combat_targets()[civ], zom as u32);
    assert_eq!(columns.combat_targets()[zom], civ as u32);
    assert_eq!(columns.velocities()[civ], Vec2::ZERO);
    assert_eq!(columns.velocities()[zom], Vec2::ZERO);
    let timer = columns.combat_timers()[civ];
    assert!((2.0..=4.0).contains(&timer), "combat timer {timer} out of range");

    // Resolution happens once the timer runs out.
    let max_ticks = (4.5 / dt) as usize;
    let mut resolved = false;
    for _ in 0..max_ticks {
        sim.tick(dt);
        if sim
            .columns()
            .states()
            .iter()
            .all(|&s| s != AgentState::Fighting)
        {
            resolved = true;
            break;
        }
    }
    assert!(resolved, "fight never resolved");
    assert_invariants(&sim);

    // Whatever the outcome, no survivor keeps a stale lock.
    for &target in sim.columns().combat_targets() {
        assert_eq!(target, NO_TARGET);
    }
}

#[test]
fn heroes_shoot_nearby_zombies() {
    // Hero 80 units from a zombie: after the 0.3-0.6 s aim window a beam
    // and a sound appear, the zombie loses a hit point, and the cooldown
    // rearms at 1.5 s.
    let mut sim = empty_sim(3);
    let hero = place(
        &mut sim,
        Vec2::new(400.0, 300.0),
        AgentKind::Hero,
        HeroRole::Hunter,
        5,
        10,
    );
    let zom = place(
        &mut sim,
        Vec2::new(480.0, 300.0),
        AgentKind::Zombie,
        HeroRole::Defender,
        3,
        11,
    );

    let dt = sim.config().fixed_dt;
    let mut fired = false;
    for _ in 0..120 {
        sim.tick(dt);
        if !sim.beams().is_empty() {
            fired = true;
            break;
        }
    }
    assert!(fired, "hero never fired");
    assert!(!sim.sounds().is_empty(), "gunshot left no audible marker");

    let columns = sim.columns();
    assert_eq!(columns.healths()[zom], 2);
    assert!(
        columns.shoot_cooldowns()[hero] > 1.0,
        "cooldown did not rearm"
    );
    let beam = sim.beams()[0];
    assert!(beam.from.distance(columns.positions()[hero]) < 50.0);
}

#[test]
fn bitten_civilians_die_and_reanimate() {
    // An almost-expired infection kills on the next tick; the corpse
    // reanimates as a zombie inside its 3-8 s window.
    let mut sim = empty_sim(4);
    let civ = place(
        &mut sim,
        Vec2::new(640.0, 360.0),
        AgentKind::Civilian,
        HeroRole::Defender,
        0,
        20,
    );
    sim.columns_mut().states_mut()[civ] = AgentState::Bitten;
    sim.columns_mut().infection_timers_mut()[civ] = 0.016;

    let dt = sim.config().fixed_dt;
    sim.tick(dt);

    {
        let columns = sim.columns();
        assert_eq!(columns.states()[civ], AgentState::Dead);
        assert_eq!(columns.velocities()[civ], Vec2::ZERO);
        let timer = columns.reanimation_timers()[civ];
        assert!(
            (3.0..=8.0).contains(&timer),
            "reanimation timer {timer} out of range"
        );
    }

    let max_ticks = (8.5 / dt) as usize;
    let mut turned = false;
    for _ in 0..max_ticks {
        sim.tick(dt);
        if sim.columns().kinds()[civ] == AgentKind::Zombie {
            turned = true;
            break;
        }
    }
    assert!(turned, "corpse never reanimated");
    let columns = sim.columns();
    assert_eq!(columns.healths()[civ], 3);
    assert_eq!(columns.states()[civ], AgentState::Patrol);
}

#[test]
fn injured_zombies_consume_corpses() {
    let mut sim = empty_sim(5);
    let corpse = place(
        &mut sim,
        Vec2::new(640.0, 360.0),
        AgentKind::Civilian,
        HeroRole::Defender,
        0,
        30,
    );
    sim.columns_mut().states_mut()[corpse] = AgentState::Dead;
    // Keep the corpse from reanimating mid-test.
    sim.columns_mut().reanimation_timers_mut()[corpse] = 100.0;

    let zom = place(
        &mut sim,
        Vec2::new(643.0, 360.0),
        AgentKind::Zombie,
        HeroRole::Defender,
        1,
        31,
    );

    sim.tick(sim.config().fixed_dt);

    assert_eq!(sim.agent_count(), 1, "corpse was not consumed");
    // The zombie is the sole survivor; swap-delete may have moved it.
    assert_eq!(sim.columns().kinds()[0], AgentKind::Zombie);
    assert_eq!(sim.columns().healths()[0], 2);
    let _ = zom;
}

#[test]
fn pause_freezes_everything_including_events() {
    let mut sim = empty_sim(6);
    sim.init(300);
    let dt = sim.config().fixed_dt;
    for _ in 0..180 {
        sim.tick(dt);
    }

    let positions = sim.columns().positions().to_vec();
    let states = sim.columns().states().to_vec();
    let healths = sim.columns().healths().to_vec();
    let sounds = sim.sounds().to_vec();
    let beams = sim.beams().to_vec();
    let ticks = sim.tick_count();

    sim.toggle_pause();
    for _ in 0..10 {
        let alpha = sim.advance(dt);
        assert!(alpha < 1.0);
    }

    assert_eq!(sim.tick_count(), ticks);
    assert_eq!(sim.columns().positions(), &positions[..]);
    assert_eq!(sim.columns().states(), &states[..]);
    assert_eq!(sim.columns().healths(), &healths[..]);
    assert_eq!(sim.sounds(), &sounds[..]);
    assert_eq!(sim.beams(), &beams[..]);

    sim.toggle_pause();
    sim.tick(dt);
    assert_eq!(sim.tick_count(), ticks + 1);
}

#[test]
fn invariants_hold_across_a_long_run() {
    let mut sim = empty_sim(0xBEEF);
    sim.init(500);
    let dt = sim.config().fixed_dt;
    for tick in 0..300 {
        sim.tick(dt);
        if tick % 10 == 0 {
            assert_invariants(&sim);
        }
    }
    assert_invariants(&sim);
}

#[test]
fn spatial_index_mirrors_rebuild_positions() {
    // With a civilian-only population there are no deaths, so indices are
    // stable and the grid must place every agent in the cell that held it
    // at rebuild time (the previous-position snapshot).
    let config = SimConfig {
        civilian_share: 1.0,
        zombie_share: 0.0,
        hero_share: 0.0,
        ..open_field_config(7)
    };
    let mut sim = Simulation::new(config).expect("simulation");
    sim.init(200);
    let dt = sim.config().fixed_dt;
    for _ in 0..30 {
        sim.tick(dt);
        let grid = sim.grid();
        for (i, p) in sim.columns().prev_positions().iter().enumerate() {
            let (cx, cy) = grid.cell_coords(p.x, p.y);
            assert!(
                grid.cell_contents(cx, cy).contains(&(i as u32)),
                "agent {i} missing from its cell"
            );
        }
    }
}

#[test]
fn seeded_runs_are_identical() {
    let mut a = empty_sim(0xDEAD);
    let mut b = empty_sim(0xDEAD);
    a.init(200);
    b.init(200);
    let dt = a.config().fixed_dt;
    for _ in 0..60 {
        a.tick(dt);
        b.tick(dt);
    }
    assert_eq!(a.columns().positions(), b.columns().positions());
    assert_eq!(a.columns().states(), b.columns().states());
    assert_eq!(a.columns().healths(), b.columns().healths());
    assert_eq!(a.population(), b.population());

    let mut c = empty_sim(0xF00D);
    c.init(200);
    for _ in 0..60 {
        c.tick(dt);
    }
    assert_ne!(a.columns().positions(), c.columns().positions());
}

#[test]
fn hero_roles_are_split_at_spawn() {
    let config_shares = SimConfig {
        civilian_share: 0.0,
        zombie_share: 0.0,
        hero_share: 1.0,
        ..open_field_config(8)
    };
    let mut sim = Simulation::new(config_shares).expect("simulation");
    sim.init(100);
    let hunters = sim
        .columns()
        .hero_roles()
        .iter()
        .filter(|&&r| r == HeroRole::Hunter)
        .count();
    // A 50/50 draw over 100 spawns lands well inside [20, 80].
    assert!((20..=80).contains(&hunters), "suspicious split: {hunters}");
}

#[test]
fn shrinking_releases_cross_boundary_fights() {
    let mut sim = empty_sim(9);
    let civ = place(
        &mut sim,
        Vec2::new(640.0, 360.0),
        AgentKind::Civilian,
        HeroRole::Defender,
        0,
        40,
    );
    let zom = place(
        &mut sim,
        Vec2::new(645.0, 360.0),
        AgentKind::Zombie,
        HeroRole::Defender,
        3,
        41,
    );

    let dt = sim.config().fixed_dt;
    for _ in 0..240 {
        sim.tick(dt);
        if sim.columns().states()[civ] == AgentState::Fighting {
            break;
        }
    }
    assert_eq!(sim.columns().states()[civ], AgentState::Fighting);

    // Cut the zombie; the civilian's lock must not dangle.
    sim.set_agent_count(1);
    assert_eq!(sim.agent_count(), 1);
    assert_ne!(sim.columns().states()[0], AgentState::Fighting);
    assert_eq!(sim.columns().combat_targets()[0], NO_TARGET);
    let _ = zom;

    // The survivor still ticks fine.
    for _ in 0..30 {
        sim.tick(dt);
    }
    assert_invariants(&sim);
}
