//! Simulation kernel for the Outbreak crowd simulation.
//!
//! The kernel keeps tens of thousands of agents in Structure-of-Arrays
//! storage, accelerates neighbor lookups with a uniform spatial grid that is
//! rebuilt every tick, and fans the per-tick phases (separation, behavior,
//! movement) out across a fixed worker pool with a barrier between phases.
//! Topology changes (combat, infection, reanimation, deaths) run serially
//! on the main thread at the end of each tick. Rendering is left to the
//! host: the kernel yields interpolatable per-agent records and short-lived
//! gunshot events.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

mod behavior;
mod columns;
mod combat;
mod config;
mod environment;
mod sim;

pub use columns::AgentColumns;
pub use combat::{civilian_outcome, hero_outcome, CivilianOutcome, HeroOutcome};
pub use config::{ConfigError, SimConfig};
pub use environment::{Circle, Environment, Rect};
pub use sim::{PhaseTimings, PopulationCounts, Simulation};

/// Agents handled per worker job; amortizes queue overhead while keeping a
/// job's working set within L1/L2.
pub const JOB_CHUNK: usize = 256;

/// Sentinel for "no combat opponent locked".
pub const NO_TARGET: u32 = u32::MAX;

/// Velocities below this magnitude leave the facing direction untouched.
pub const FACING_EPSILON: f32 = 0.01;

/// Plain 2D vector used for positions, velocities, and facings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn length_sq(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[must_use]
    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        (self - other).length_sq()
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_sq(other).sqrt()
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector in this direction, or `fallback` when near-zero.
    #[must_use]
    pub fn normalized_or(self, fallback: Self) -> Self {
        let len = self.length();
        if len > 1e-6 {
            Self::new(self.x / len, self.y / len)
        } else {
            fallback
        }
    }

    /// Scale down to `max` length, leaving shorter vectors untouched.
    #[must_use]
    pub fn clamp_length(self, max: f32) -> Self {
        let len_sq = self.length_sq();
        if len_sq > max * max {
            let len = len_sq.sqrt();
            Self::new(self.x / len * max, self.y / len * max)
        } else {
            self
        }
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Population kind of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Civilian,
    Zombie,
    Hero,
}

/// Behavior state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentState {
    /// Standing still; transitions to Patrol on the next behavior pass.
    Idle,
    /// Wandering toward a random destination at reduced speed.
    Patrol,
    /// Running from a threat.
    Fleeing,
    /// Chasing a target.
    Pursuing,
    /// Heading to the last known target location on a timer.
    Searching,
    /// Locked in a mutual melee; resolved by the serial combat phase.
    Fighting,
    /// Infected civilian; alive, slowed, on an infection countdown.
    Bitten,
    /// Corpse. Civilian corpses may reanimate or be consumed.
    Dead,
}

/// Hero combat doctrine, assigned at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeroRole {
    /// Keeps distance and kites; sticks with other heroes.
    Defender,
    /// Closes to melee.
    Hunter,
}

/// How a fleeing civilian runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleePlan {
    AwayFromThreat,
    TowardHero,
}

/// Audible gunshot marker; attracts zombies while its lifetime runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunshotSound {
    pub pos: Vec2,
    pub ttl: f32,
}

/// Visual tracer from shooter to target; rendering only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GunshotBeam {
    pub from: Vec2,
    pub to: Vec2,
    pub ttl: f32,
}

/// Immutable per-agent record handed to the renderer.
#[derive(Debug, Clone, Copy)]
pub struct AgentView {
    pub index: usize,
    pub pos: Vec2,
    pub prev_pos: Vec2,
    pub kind: AgentKind,
    pub state: AgentState,
    pub health: u8,
    pub facing: Vec2,
}

impl AgentView {
    /// Position interpolated between the previous and current tick.
    ///
    /// A per-axis delta above half the world size indicates a teleport-sized
    /// discontinuity (combat push-apart, legacy wrap handling); those axes
    /// snap to the current position instead of stretching across the world.
    #[must_use]
    pub fn render_position(&self, alpha: f32, world_width: f32, world_height: f32) -> Vec2 {
        let alpha = alpha.clamp(0.0, 1.0);
        let delta = self.pos - self.prev_pos;
        let x = if delta.x.abs() > world_width * 0.5 {
            self.pos.x
        } else {
            self.prev_pos.x + delta.x * alpha
        };
        let y = if delta.y.abs() > world_height * 0.5 {
            self.pos.y
        } else {
            self.prev_pos.y + delta.y * alpha
        };
        Vec2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_arithmetic_behaves() {
        let a = Vec2::new(3.0, 4.0);
        assert!((a.length() - 5.0).abs() < 1e-6);
        assert_eq!(a + Vec2::new(1.0, -1.0), Vec2::new(4.0, 3.0));
        assert_eq!(a * 2.0, Vec2::new(6.0, 8.0));
        assert_eq!(-a, Vec2::new(-3.0, -4.0));
    }

    #[test]
    fn normalized_or_falls_back_on_zero() {
        let unit = Vec2::new(0.0, 2.0).normalized_or(Vec2::new(1.0, 0.0));
        assert!((unit.length() - 1.0).abs() < 1e-6);
        assert_eq!(
            Vec2::ZERO.normalized_or(Vec2::new(1.0, 0.0)),
            Vec2::new(1.0, 0.0)
        );
    }

    #[test]
    fn clamp_length_only_shrinks() {
        let long = Vec2::new(30.0, 40.0).clamp_length(5.0);
        assert!((long.length() - 5.0).abs() < 1e-4);
        let short = Vec2::new(1.0, 0.0).clamp_length(5.0);
        assert_eq!(short, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn render_position_interpolates() {
        let view = AgentView {
            index: 0,
            pos: Vec2::new(10.0, 20.0),
            prev_pos: Vec2::new(0.0, 20.0),
            kind: AgentKind::Civilian,
            state: AgentState::Patrol,
            health: 0,
            facing: Vec2::new(1.0, 0.0),
        };
        let mid = view.render_position(0.5, 1280.0, 720.0);
        assert_eq!(mid, Vec2::new(5.0, 20.0));
    }

    #[test]
    fn render_position_snaps_on_half_world_deltas() {
        let view = AgentView {
            index: 0,
            pos: Vec2::new(1270.0, 100.0),
            prev_pos: Vec2::new(5.0, 100.0),
            kind: AgentKind::Zombie,
            state: AgentState::Patrol,
            health: 3,
            facing: Vec2::new(1.0, 0.0),
        };
        let snapped = view.render_position(0.5, 1280.0, 720.0);
        assert_eq!(snapped.x, 1270.0);
        assert_eq!(snapped.y, 100.0);
    }
}
