//! Flight dynamics
//!
//! The vehicle flies as one rigid body in the x/y plane: fixed forward speed,
//! vertical forces from flapping, wing lift and gravity, plus a roll angle
//! driven by torques. Once exploded the body is replaced by per-part debris.

use std::f32::consts::FRAC_PI_2;

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::collision::{self, Contact, ContactKind, PipeShape};
use super::part::{Part, PartId, PartTier, PartType};
use super::performance::VehiclePerformance;
use super::stage::{Obstacle, ObstacleId};
use crate::cell_center;
use crate::tuning::FlightTuning;

/// Fraction of base torque applied as self-righting when not flapping
const SELF_RIGHTING: f32 = 0.3;

/// The airborne vehicle body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightBody {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Roll about the depth (z) axis, radians
    pub angle: f32,
    pub angular_velocity: f32,
}

impl FlightBody {
    pub fn at(position: Vec3, forward_speed: f32) -> Self {
        Self {
            position,
            velocity: Vec3::new(forward_speed, 0.0, 0.0),
            angle: 0.0,
            angular_velocity: 0.0,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_z(self.angle)
    }
}

/// Per-tick input to the controller
#[derive(Debug, Clone, Copy, Default)]
pub struct FlightInput {
    /// Flap held (sampled at tick start)
    pub flap: bool,
    /// Contact reported by an external physics engine, if any.
    /// When `None` the built-in probe is used.
    pub contact: Option<Contact>,
}

/// What blew the vehicle up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ExplosionCause {
    /// Fallback check: outside an obstacle's safe window
    GapMiss(ObstacleId),
    /// Primary contact above the impact threshold
    Impact(Contact),
}

/// Result of one controller step
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlightStep {
    /// Whole distance units gained this tick
    pub score_delta: i64,
    pub explosion: Option<ExplosionCause>,
}

/// Read-only inputs the controller needs each tick
#[derive(Debug, Clone, Copy)]
pub struct FlightContext<'a> {
    pub performance: &'a VehiclePerformance,
    pub tuning: &'a FlightTuning,
    pub obstacles: &'a [Obstacle],
    pub vip: bool,
}

/// A part flung by an explosion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debris {
    pub part_id: PartId,
    pub part_type: PartType,
    pub tier: PartTier,
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

/// World placement of one part
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartTransform {
    pub part_id: PartId,
    pub position: Vec3,
    pub rotation: Quat,
}

/// Drives the body through the course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightController {
    body: FlightBody,
    /// Last whole x unit credited to the score
    scored_x: i64,
    debris: Vec<Debris>,
}

impl FlightController {
    pub fn new(position: Vec3, forward_speed: f32) -> Self {
        Self {
            body: FlightBody::at(position, forward_speed),
            scored_x: position.x.floor() as i64,
            debris: Vec::new(),
        }
    }

    pub fn body(&self) -> &FlightBody {
        &self.body
    }

    pub fn debris(&self) -> &[Debris] {
        &self.debris
    }

    /// Rebuild the body at `position` moving forward. Vertical velocity, roll
    /// and spin carry over from the body as it was when it exploded. Score
    /// credit continues from the current x.
    pub fn respawn(&mut self, position: Vec3, forward_speed: f32) {
        let last = self.body;
        self.body = FlightBody {
            position,
            velocity: Vec3::new(forward_speed, last.velocity.y, 0.0),
            angle: last.angle,
            angular_velocity: last.angular_velocity,
        };
        self.scored_x = self.scored_x.max(position.x.floor() as i64);
        self.debris.clear();
    }

    /// Advance one fixed step. Stops at the first explosion.
    pub fn step(&mut self, input: &FlightInput, ctx: &FlightContext<'_>, dt: f32) -> FlightStep {
        let tuning = ctx.tuning;
        let perf = ctx.performance;
        let radius = tuning.vehicle_radius(ctx.vip);
        let mut result = FlightStep::default();

        // Fallback gap check
        if let Some(id) = collision::fallback_collision(
            self.body.position,
            radius,
            tuning.obstacle_half_width(),
            ctx.obstacles,
        ) {
            result.explosion = Some(ExplosionCause::GapMiss(id));
            return result;
        }

        // Height limits
        let body = &mut self.body;
        body.position.y = body.position.y.clamp(tuning.min_height, tuning.max_height);
        let at_ceiling = body.position.y >= tuning.max_height;
        if at_ceiling && body.velocity.y > 0.0 {
            body.velocity.y = 0.0;
        }

        // Plane lock
        body.velocity.x = tuning.forward_speed;
        body.velocity.z = 0.0;
        body.position.z = 0.0;

        // Score whole units crossed
        let whole_x = body.position.x.floor() as i64;
        if whole_x > self.scored_x {
            result.score_delta = whole_x - self.scored_x;
            self.scored_x = whole_x;
        }

        let mut force_y = 0.0;
        let mut torque = 0.0;

        if !perf.can_fly {
            force_y -= tuning.fall_force_per_mass * perf.total_mass;
        } else {
            if input.flap && perf.total_thrust > 0.0 && !at_ceiling {
                force_y += tuning.flap_force * perf.total_thrust;
                torque += tuning.base_torque * (2.0 - perf.stability_score);
            } else {
                torque -= tuning.base_torque * SELF_RIGHTING * perf.stability_score;
            }

            if perf.total_lift > 0.0 {
                force_y += perf.total_lift * body.velocity.x.abs() * tuning.lift_factor;
                if perf.wing_balance > 0.5 {
                    let speed = body.velocity.length();
                    torque -= (perf.wing_balance - 0.5) * speed * tuning.lift_stabilize_gain;
                }
            }
        }

        integrate(body, force_y, torque, perf.total_mass, tuning, dt);

        // Primary contact
        let contact = input.contact.or_else(|| {
            collision::probe_contact(
                body.position,
                body.velocity,
                radius,
                tuning.min_height,
                PipeShape {
                    half_width: tuning.obstacle_half_width(),
                    height: tuning.obstacle_height,
                },
                ctx.obstacles,
            )
        });
        if let Some(contact) = contact
            && contact.impact_speed > tuning.collision_threshold(ctx.vip)
        {
            result.explosion = Some(ExplosionCause::Impact(contact));
        }

        result
    }

    /// Break the vehicle into debris around the body's current position
    pub fn explode<R: Rng>(&mut self, parts: &[Part], tuning: &FlightTuning, rng: &mut R) {
        let center = self.body.position;
        let transforms = part_world_transforms(parts, &self.body);

        self.debris = parts
            .iter()
            .zip(transforms)
            .map(|(part, transform)| {
                let offset = transform.position - center;
                let dir = if offset.length_squared() > 1e-6 {
                    offset.normalize()
                } else {
                    Vec3::Y
                };
                let force = rng.random_range(tuning.explosion_force_min..=tuning.explosion_force_max);
                let impulse = Vec3::new(
                    dir.x + (rng.random::<f32>() - 0.5) * 0.5,
                    dir.y + rng.random::<f32>() * 0.5 + 0.5,
                    dir.z + (rng.random::<f32>() - 0.5) * 0.5,
                ) * force;
                let spin = tuning.explosion_spin;
                let angular_velocity = Vec3::new(
                    (rng.random::<f32>() - 0.5) * spin,
                    (rng.random::<f32>() - 0.5) * spin,
                    (rng.random::<f32>() - 0.5) * spin,
                );

                Debris {
                    part_id: part.id,
                    part_type: part.part_type,
                    tier: part.tier,
                    position: transform.position,
                    velocity: impulse,
                    rotation: transform.rotation,
                    angular_velocity,
                }
            })
            .collect();

        log::info!("Vehicle exploded at ({:.1}, {:.1})", center.x, center.y);
    }

    /// Ballistic motion for debris (visual only)
    pub fn step_debris(&mut self, tuning: &FlightTuning, dt: f32) {
        let retention = (1.0 - tuning.linear_damping).max(0.0).powf(dt);
        for piece in &mut self.debris {
            piece.velocity.y += tuning.gravity * dt;
            piece.velocity *= retention;
            piece.position += piece.velocity * dt;
            let spin = piece.angular_velocity * dt;
            piece.rotation = (Quat::from_euler(EulerRot::XYZ, spin.x, spin.y, spin.z)
                * piece.rotation)
                .normalize();
        }
    }

    /// Contact kind helper for hosts that want to tell ground from pipes
    pub fn is_ground(cause: &ExplosionCause) -> bool {
        matches!(
            cause,
            ExplosionCause::Impact(Contact {
                kind: ContactKind::Ground,
                ..
            })
        )
    }
}

/// Semi-implicit Euler with per-second damping retention
fn integrate(
    body: &mut FlightBody,
    force_y: f32,
    torque: f32,
    mass: f32,
    tuning: &FlightTuning,
    dt: f32,
) {
    let mass = mass.max(f32::EPSILON);
    let inertia = mass;

    body.velocity.y += (tuning.gravity + force_y / mass) * dt;
    body.velocity.y *= (1.0 - tuning.linear_damping).max(0.0).powf(dt);
    body.angular_velocity += torque / inertia * dt;
    body.angular_velocity *= (1.0 - tuning.angular_damping).max(0.0).powf(dt);

    body.position += body.velocity * dt;
    body.angle += body.angular_velocity * dt;
}

/// Unweighted centroid of the part cells, in world units
fn geometric_center(parts: &[Part]) -> Vec3 {
    if parts.is_empty() {
        return Vec3::ZERO;
    }
    let sum: Vec3 = parts.iter().map(|p| cell_center(p.position)).sum();
    sum / parts.len() as f32
}

/// World transform of every part while flying.
///
/// Parts are re-centered on their centroid, turned to face the flight
/// direction (-90 degrees about y), rolled with the body, then placed at
/// the body position.
pub fn part_world_transforms(parts: &[Part], body: &FlightBody) -> Vec<PartTransform> {
    let center = geometric_center(parts);
    let facing = Quat::from_rotation_y(-FRAC_PI_2);
    let orientation = body.rotation() * facing;

    parts
        .iter()
        .map(|part| {
            let local = cell_center(part.position) - center;
            let own = Quat::from_euler(
                EulerRot::XYZ,
                part.rotation.x,
                part.rotation.y,
                part.rotation.z,
            );
            PartTransform {
                part_id: part.id,
                position: body.position + orientation * local,
                rotation: orientation * own,
            }
        })
        .collect()
}

/// World transform of every part on the build grid
pub fn part_build_transforms(parts: &[Part]) -> Vec<PartTransform> {
    parts
        .iter()
        .map(|part| PartTransform {
            part_id: part.id,
            position: cell_center(part.position),
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                part.rotation.x,
                part.rotation.y,
                part.rotation.z,
            ),
        })
        .collect()
}
