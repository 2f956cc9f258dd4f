//! Static world geometry: building rectangles, tree circles, and the
//! graveyard spawn zone. Generated once at init and never mutated while the
//! simulation runs.

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{SimConfig, Vec2};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    #[must_use]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }

    /// Closest point of the rectangle to `p` (p itself when inside).
    #[must_use]
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
        )
    }

    /// Uniform random point inside the rectangle.
    #[must_use]
    pub fn sample(&self, rng: &mut SmallRng) -> Vec2 {
        Vec2::new(
            rng.random_range(self.min.x..self.max.x),
            rng.random_range(self.min.y..self.max.y),
        )
    }
}

/// Circle obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Static obstacle set plus the zombie spawn zone.
#[derive(Debug, Clone)]
pub struct Environment {
    pub buildings: Vec<Rect>,
    pub trees: Vec<Circle>,
    /// Spawn zone only; not an obstacle.
    pub graveyard: Rect,
}

impl Environment {
    /// Generate the static geometry from the main RNG.
    ///
    /// Buildings and trees keep a margin from the world edges so the
    /// boundary steering zone stays navigable. The graveyard sits in a
    /// corner away from the bulk of the map.
    #[must_use]
    pub fn generate(config: &SimConfig, rng: &mut SmallRng) -> Self {
        let w = config.world_width;
        let h = config.world_height;
        let margin = config.boundary_zone.min(w * 0.25).min(h * 0.25);

        let graveyard = Rect::new(
            Vec2::new(margin, margin),
            Vec2::new(margin + w * 0.12, margin + h * 0.18),
        );

        let mut buildings = Vec::with_capacity(config.building_count);
        for _ in 0..config.building_count {
            let bw = rng.random_range(60.0..160.0_f32).min(w * 0.3);
            let bh = rng.random_range(40.0..120.0_f32).min(h * 0.3);
            let x = rng.random_range(margin..(w - margin - bw).max(margin + 1.0));
            let y = rng.random_range(margin..(h - margin - bh).max(margin + 1.0));
            buildings.push(Rect::new(Vec2::new(x, y), Vec2::new(x + bw, y + bh)));
        }

        let mut trees = Vec::with_capacity(config.tree_count);
        for _ in 0..config.tree_count {
            let radius = rng.random_range(8.0..20.0_f32);
            let x = rng.random_range(margin..(w - margin).max(margin + 1.0));
            let y = rng.random_range(margin..(h - margin).max(margin + 1.0));
            trees.push(Circle {
                center: Vec2::new(x, y),
                radius,
            });
        }

        Self {
            buildings,
            trees,
            graveyard,
        }
    }

    /// Environment with no obstacles, for tests that need open ground.
    #[must_use]
    pub fn open(config: &SimConfig) -> Self {
        Self {
            buildings: Vec::new(),
            trees: Vec::new(),
            graveyard: Rect::new(
                Vec2::new(0.0, 0.0),
                Vec2::new(config.world_width * 0.1, config.world_height * 0.1),
            ),
        }
    }
}
