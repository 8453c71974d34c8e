//! Collision queries for the flight controller
//!
//! Two independent checks run each tick:
//! - the primary contact probe (sphere against pipe boxes and the ground),
//!   standing in for the contact signal a physics engine would report
//! - the fallback gap check, a coarse test against the gap window that
//!   catches anything the probe tunnels through at large time steps

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::stage::{Obstacle, ObstacleId};

/// Result of a collision check
#[derive(Debug, Clone, Copy)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Closest point on the box (if hit)
    pub point: Vec2,
    /// Surface normal pointing toward the sphere center
    pub normal: Vec2,
    /// Penetration depth
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            point: Vec2::ZERO,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Circle against axis-aligned box in the flight plane (x, y)
pub fn circle_box_collision(center: Vec2, radius: f32, min: Vec2, max: Vec2) -> CollisionResult {
    let closest = center.clamp(min, max);
    let delta = center - closest;
    let dist_sq = delta.length_squared();

    if dist_sq > radius * radius {
        return CollisionResult::miss();
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 {
        delta / dist
    } else {
        // Center inside the box: push out along the shallower axis
        let to_min = center - min;
        let to_max = max - center;
        let dx = to_min.x.min(to_max.x);
        let dy = to_min.y.min(to_max.y);
        if dx < dy {
            Vec2::new(if to_min.x < to_max.x { -1.0 } else { 1.0 }, 0.0)
        } else {
            Vec2::new(0.0, if to_min.y < to_max.y { -1.0 } else { 1.0 })
        }
    };

    CollisionResult {
        hit: true,
        point: closest,
        normal,
        penetration: radius - dist,
    }
}

/// What the vehicle touched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ContactKind {
    Obstacle(ObstacleId),
    Ground,
}

/// A contact reported to the flight controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub kind: ContactKind,
    /// Vehicle speed at impact
    pub impact_speed: f32,
}

/// Pipe geometry shared by the probes
#[derive(Debug, Clone, Copy)]
pub struct PipeShape {
    pub half_width: f32,
    pub height: f32,
}

impl PipeShape {
    /// (min, max) of the top and bottom pipe boxes for an obstacle
    pub fn boxes(&self, obstacle: &Obstacle) -> [(Vec2, Vec2); 2] {
        let top = obstacle.gap_top();
        let bottom = obstacle.gap_bottom().max(0.0);
        [
            (
                Vec2::new(obstacle.x - self.half_width, top),
                Vec2::new(obstacle.x + self.half_width, top + self.height),
            ),
            (
                Vec2::new(obstacle.x - self.half_width, 0.0),
                Vec2::new(obstacle.x + self.half_width, bottom),
            ),
        ]
    }
}

/// Primary contact probe: collision sphere against pipes, then the floor
pub fn probe_contact(
    position: Vec3,
    velocity: Vec3,
    radius: f32,
    ground_height: f32,
    pipe: PipeShape,
    obstacles: &[Obstacle],
) -> Option<Contact> {
    let center = position.truncate();
    let impact_speed = velocity.length();

    for obstacle in obstacles {
        if (obstacle.x - center.x).abs() > pipe.half_width + radius {
            continue;
        }
        for (min, max) in pipe.boxes(obstacle) {
            if max.y <= min.y {
                continue;
            }
            if circle_box_collision(center, radius, min, max).hit {
                return Some(Contact {
                    kind: ContactKind::Obstacle(obstacle.id),
                    impact_speed,
                });
            }
        }
    }

    if position.y <= ground_height {
        return Some(Contact {
            kind: ContactKind::Ground,
            impact_speed,
        });
    }

    None
}

/// Fallback gap check: any obstacle in horizontal reach whose safe window
/// `[gap_bottom + r, gap_top - r]` does not contain the vehicle's height
pub fn fallback_collision(
    position: Vec3,
    radius: f32,
    obstacle_half_width: f32,
    obstacles: &[Obstacle],
) -> Option<ObstacleId> {
    obstacles
        .iter()
        .filter(|o| (o.x - position.x).abs() <= obstacle_half_width + radius)
        .find(|o| {
            let low = o.gap_bottom() + radius;
            let high = o.gap_top() - radius;
            position.y < low || position.y > high
        })
        .map(|o| o.id)
}
