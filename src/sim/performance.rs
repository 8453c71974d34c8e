//! Vehicle performance aggregation
//!
//! Converts a part list into the scalar flight parameters the dynamics
//! controller consumes. Pure: recompute whenever the parts change.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::part::{Part, PartType};

/// Wings closer than this to the centroid (along x) count as centered
pub const WING_CENTER_TOLERANCE: f32 = 0.5;
/// Mean weighted distance that maps to a full mass-distribution score
pub const MASS_SPREAD_NORMALIZER: f32 = 2.0;
/// Score above which a vehicle is reported as balanced
pub const BALANCED_THRESHOLD: f32 = 0.6;

const BALANCE_CENTER_ONLY: f32 = 0.7;
const BALANCE_ONE_SIDED: f32 = 0.3;
const BALANCE_NO_WINGS: f32 = 0.2;

/// Derived flight parameters for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VehiclePerformance {
    pub total_mass: f32,
    pub total_thrust: f32,
    pub total_lift: f32,
    pub can_fly: bool,
    /// Mass-weighted centroid in grid space (zero when massless)
    pub center_of_mass: Vec3,
    /// Wing symmetry component in [0, 1]
    pub wing_balance: f32,
    /// Mass spread component in [0, 1]
    pub mass_distribution: f32,
    /// Combined stability in [0, 1]
    pub stability_score: f32,
}

impl VehiclePerformance {
    pub fn from_parts(parts: &[Part]) -> Self {
        if parts.is_empty() {
            return Self::default();
        }

        let mut total_mass = 0.0;
        let mut total_thrust = 0.0;
        let mut total_lift = 0.0;
        let mut weighted_sum = Vec3::ZERO;
        let mut has_cockpit = false;

        for part in parts {
            let stats = part.stats();
            total_mass += stats.weight;
            weighted_sum += part.position.as_vec3() * stats.weight;
            match part.part_type {
                PartType::Engine => total_thrust += stats.power,
                PartType::Wing => total_lift += stats.lift,
                PartType::Cockpit => has_cockpit = true,
                PartType::Fuselage => {}
            }
        }

        let center_of_mass = if total_mass > 0.0 {
            weighted_sum / total_mass
        } else {
            Vec3::ZERO
        };

        let wing_balance = wing_balance(parts, center_of_mass);
        let mass_distribution = mass_distribution(parts, center_of_mass, total_mass);
        let stability_score = (0.6 * wing_balance + 0.4 * mass_distribution).clamp(0.0, 1.0);

        Self {
            total_mass,
            total_thrust,
            total_lift,
            can_fly: total_thrust > 0.0 && has_cockpit,
            center_of_mass,
            wing_balance,
            mass_distribution,
            stability_score,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.stability_score > BALANCED_THRESHOLD
    }
}

/// Symmetry of wings about the centroid's transverse (x) axis
fn wing_balance(parts: &[Part], center_of_mass: Vec3) -> f32 {
    let mut left = 0u32;
    let mut right = 0u32;
    let mut center = 0u32;

    for wing in parts.iter().filter(|p| p.part_type == PartType::Wing) {
        let offset = wing.position.x as f32 - center_of_mass.x;
        if offset < -WING_CENTER_TOLERANCE {
            left += 1;
        } else if offset > WING_CENTER_TOLERANCE {
            right += 1;
        } else {
            center += 1;
        }
    }

    match (left, right, center) {
        (0, 0, 0) => BALANCE_NO_WINGS,
        (0, 0, _) => BALANCE_CENTER_ONLY,
        (l, r, _) if l > 0 && r > 0 => 0.5 + 0.5 * (l.min(r) as f32 / l.max(r) as f32),
        _ => BALANCE_ONE_SIDED,
    }
}

/// Mean mass-weighted distance from the centroid, normalized to [0, 1]
fn mass_distribution(parts: &[Part], center_of_mass: Vec3, total_mass: f32) -> f32 {
    if total_mass <= 0.0 {
        return 0.0;
    }
    let spread: f32 = parts
        .iter()
        .map(|p| p.stats().weight * p.position.as_vec3().distance(center_of_mass))
        .sum();
    (spread / total_mass / MASS_SPREAD_NORMALIZER).clamp(0.0, 1.0)
}
