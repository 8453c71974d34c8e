//! SkyTinker - build a vehicle from grid parts, then fly it
//!
//! Core modules:
//! - `sim`: Simulation (assembly, performance, flight physics, stages, session)
//! - `tuning`: Data-driven game balance
//! - `persistence`: Storage collaborator and persisted progress
//! - `highscores`: Local best-run table
//! - `backend`: Fire-and-forget leaderboard / referral worker
//! - `audio`: Injected audio service interface
//! - `runtime`: Fixed-timestep driver wiring the session to its collaborators

pub mod audio;
pub mod backend;
pub mod highscores;
pub mod persistence;
pub mod runtime;
pub mod sim;
pub mod tuning;

pub use highscores::HighScores;
pub use tuning::Tuning;

use glam::{IVec3, Vec3};

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz for smooth physics)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Edge length of one build grid cell (world units)
    pub const GRID_UNIT: f32 = 1.0;
    /// Build area half extent, in grid cells from the origin on x and z
    pub const BUILD_AREA_LIMIT: i32 = 10;

    /// Part count limits
    pub const MAX_TOTAL_PARTS: usize = 12;
    pub const MAX_PARTS_PER_TYPE: usize = 4;

    /// Score distance per stage
    pub const STAGE_THRESHOLD: i64 = 500;

    /// Delay between explosion and game over (seconds)
    pub const GAME_OVER_DELAY: f32 = 1.5;
}

/// Round a world coordinate to the nearest grid cell
#[inline]
pub fn snap_to_grid(world: Vec3) -> IVec3 {
    (world / consts::GRID_UNIT).round().as_ivec3()
}

/// Ground-plane placement: snap x/z, sit on layer 0
#[inline]
pub fn ground_position(point: Vec3) -> IVec3 {
    let snapped = snap_to_grid(point);
    IVec3::new(snapped.x, 0, snapped.z)
}

/// Placement when stacking onto an existing part's face.
///
/// Offsets by exactly one cell along the dominant axis of the face normal.
/// Ties prefer y, then x. Never goes below the ground layer.
pub fn stack_position(existing: IVec3, face_normal: Vec3) -> IVec3 {
    let abs = face_normal.abs();
    let sign = |v: f32| if v < 0.0 { -1 } else { 1 };

    let offset = if abs.y >= abs.x && abs.y >= abs.z {
        IVec3::new(0, sign(face_normal.y), 0)
    } else if abs.x >= abs.z {
        IVec3::new(sign(face_normal.x), 0, 0)
    } else {
        IVec3::new(0, 0, sign(face_normal.z))
    };

    let mut target = existing + offset;
    target.y = target.y.max(0);
    target
}

/// World-space center of a grid cell (parts rest half a cell above ground)
#[inline]
pub fn cell_center(cell: IVec3) -> Vec3 {
    let unit = consts::GRID_UNIT;
    Vec3::new(
        cell.x as f32 * unit,
        cell.y as f32 * unit + unit / 2.0,
        cell.z as f32 * unit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snap_to_grid_rounds_each_axis() {
        assert_eq!(snap_to_grid(Vec3::new(0.49, 1.5, -2.6)), IVec3::new(0, 2, -3));
        assert_eq!(ground_position(Vec3::new(3.2, 7.0, -0.7)), IVec3::new(3, 0, -1));
    }

    #[test]
    fn test_stack_position_uses_dominant_axis() {
        let base = IVec3::new(2, 0, 1);
        assert_eq!(stack_position(base, Vec3::new(0.0, 1.0, 0.0)), IVec3::new(2, 1, 1));
        assert_eq!(stack_position(base, Vec3::new(-0.9, 0.1, 0.2)), IVec3::new(1, 0, 1));
        assert_eq!(stack_position(base, Vec3::new(0.1, 0.2, 0.9)), IVec3::new(2, 0, 2));
        // Ties favour y
        assert_eq!(stack_position(base, Vec3::new(0.5, 0.5, 0.5)), IVec3::new(2, 1, 1));
    }

    #[test]
    fn test_stack_position_clamps_to_ground() {
        let base = IVec3::new(0, 0, 0);
        assert_eq!(stack_position(base, Vec3::new(0.0, -1.0, 0.0)), IVec3::ZERO);
    }
}
