//! Procedural stage progression and obstacle field
//!
//! Stage is a pure function of score. Each stage picks a difficulty profile
//! (gap size, spacing, gap height range) and a cosmetic theme; the obstacle
//! field spawns pipes ahead of the vehicle and retires them behind it.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::part::{EquipmentKey, PartTier, UnlockedEquipment};
use crate::consts::STAGE_THRESHOLD;
use crate::tuning::{DifficultyProfile, GapSizes, LevelTuning};

/// Unique obstacle identifier within a run
pub type ObstacleId = u32;

/// A pipe pair with a gap to fly through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: ObstacleId,
    pub x: f32,
    pub gap_center_y: f32,
    pub gap_size: f32,
    /// Index into the obstacle palette table
    pub color_theme: usize,
}

impl Obstacle {
    #[inline]
    pub fn gap_top(&self) -> f32 {
        self.gap_center_y + self.gap_size / 2.0
    }

    #[inline]
    pub fn gap_bottom(&self) -> f32 {
        self.gap_center_y - self.gap_size / 2.0
    }
}

/// Used only when a tuning file supplies no profiles at all
const FALLBACK_PROFILE: DifficultyProfile = DifficultyProfile {
    gap_size: GapSizes {
        normal: 10.0,
        vip: 16.0,
    },
    spacing: 13.0,
    gap_y_range: (10.0, 30.0),
};

/// Stage reached at `score`. Always >= 1.
pub fn stage_for_score(score: i64) -> u32 {
    if score < 0 {
        return 1;
    }
    let stage = score / STAGE_THRESHOLD + 1;
    u32::try_from(stage).unwrap_or(u32::MAX)
}

/// Generation parameters for `stage`.
///
/// Stages inside the profile table read it directly. Past the table the gap
/// shrinks by `gap_reduction_rate` per stage and spacing by `spacing_step`,
/// each held at its floor; the gap height range stays at the last entry's.
pub fn difficulty_profile(stage: u32, level: &LevelTuning) -> DifficultyProfile {
    let table_len = level.profiles.len().max(1) as u32;
    let stage = stage.max(1);
    let last = level.profiles.last().copied().unwrap_or(FALLBACK_PROFILE);

    if stage <= table_len && !level.profiles.is_empty() {
        return level.profiles[(stage - 1) as usize];
    }

    let extra = (stage - table_len) as f32;
    let factor = 1.0 - level.gap_reduction_rate * extra;
    DifficultyProfile {
        gap_size: GapSizes {
            normal: (last.gap_size.normal * factor).max(level.min_gap_normal),
            vip: (last.gap_size.vip * factor).max(level.min_gap_vip),
        },
        spacing: (last.spacing - level.spacing_step * extra).max(level.min_spacing),
        gap_y_range: last.gap_y_range,
    }
}

/// Position of `stage` in a cyclic theme table of length `len`
#[inline]
pub fn theme_index(stage: u32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (stage.max(1) as usize - 1) % len
}

/// Theme entry for `stage`, cycling through the table
pub fn theme_for_stage<T>(stage: u32, table: &[T]) -> Option<&T> {
    table.get(theme_index(stage, table.len()))
}

/// Current stage plus the persisted best
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: u32,
    pub highest_stage: u32,
}

impl Default for StageProgress {
    fn default() -> Self {
        Self {
            stage: 1,
            highest_stage: 1,
        }
    }
}

impl StageProgress {
    pub fn new(highest_stage: u32) -> Self {
        Self {
            stage: 1,
            highest_stage: highest_stage.max(1),
        }
    }

    /// Recompute the stage from `score`.
    ///
    /// On a transition, every stage crossed grants its unlocks (idempotent)
    /// and the historical best is raised. Returns the newly unlocked keys.
    pub fn update(
        &mut self,
        score: i64,
        level: &LevelTuning,
        unlocked: &mut UnlockedEquipment,
    ) -> Vec<EquipmentKey> {
        let new_stage = stage_for_score(score);
        let mut fresh = Vec::new();
        if new_stage == self.stage {
            return fresh;
        }

        if new_stage > self.stage {
            for stage in self.stage + 1..=new_stage {
                for &key in level.unlocks_at(stage) {
                    if unlocked.unlock(key) {
                        fresh.push(key);
                    }
                }
            }
        }

        log::info!("Stage {} -> {}", self.stage, new_stage);
        self.stage = new_stage;
        self.highest_stage = self.highest_stage.max(new_stage);
        fresh
    }

    /// Back to stage 1 for a new run. The best is kept.
    pub fn reset(&mut self) {
        self.stage = 1;
    }
}

/// Live obstacles ahead of and around the vehicle
#[derive(Debug, Clone)]
pub struct ObstacleField {
    obstacles: Vec<Obstacle>,
    last_spawn_x: f32,
    next_id: ObstacleId,
    rng: Pcg32,
}

impl ObstacleField {
    pub fn new(seed: u64, level: &LevelTuning) -> Self {
        Self {
            obstacles: Vec::new(),
            last_spawn_x: level.spawn_lookahead,
            next_id: 1,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Drop every obstacle and restart spawning from the initial x
    pub fn reset(&mut self, seed: u64, level: &LevelTuning) {
        *self = Self::new(seed, level);
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn last_spawn_x(&self) -> f32 {
        self.last_spawn_x
    }

    fn next_obstacle_id(&mut self) -> ObstacleId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Spawn ahead of `vehicle_x` and retire obstacles left behind
    pub fn update(
        &mut self,
        vehicle_x: f32,
        stage: u32,
        tier: PartTier,
        level: &LevelTuning,
        palette_len: usize,
    ) {
        let profile = difficulty_profile(stage, level);
        let spacing = profile.spacing.max(f32::EPSILON);

        while vehicle_x + level.spawn_lookahead > self.last_spawn_x {
            let x = self.last_spawn_x + spacing;
            let (lo, hi) = profile.gap_y_range;
            let gap_center_y = if hi > lo {
                self.rng.random_range(lo..=hi)
            } else {
                lo
            };
            let id = self.next_obstacle_id();
            let obstacle = Obstacle {
                id,
                x,
                gap_center_y,
                gap_size: profile.gap_size.for_tier(tier),
                color_theme: theme_index(stage, palette_len),
            };
            log::debug!(
                "Spawned obstacle {} at x={:.1} gap={:.1}@{:.1}",
                id,
                x,
                obstacle.gap_size,
                gap_center_y
            );
            self.obstacles.push(obstacle);
            self.last_spawn_x = x;
        }

        let cutoff = vehicle_x - level.cleanup_distance;
        self.obstacles.retain(|o| {
            let keep = o.x > cutoff;
            if !keep {
                log::debug!("Retired obstacle {} at x={:.1}", o.id, o.x);
            }
            keep
        });
    }

    /// Retire obstacles horizontally within `radius` of `x`
    pub fn clear_near(&mut self, x: f32, radius: f32) -> usize {
        let before = self.obstacles.len();
        self.obstacles.retain(|o| (o.x - x).abs() > radius);
        before - self.obstacles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::part::PartType;
    use proptest::prelude::*;

    #[test]
    fn test_stage_for_score() {
        assert_eq!(stage_for_score(-10), 1);
        assert_eq!(stage_for_score(0), 1);
        assert_eq!(stage_for_score(499), 1);
        assert_eq!(stage_for_score(500), 2);
        assert_eq!(stage_for_score(1499), 3);
    }

    #[test]
    fn test_table_profiles() {
        let level = LevelTuning::default();
        let p1 = difficulty_profile(1, &level);
        assert_eq!(p1.gap_size.normal, 14.0);
        assert_eq!(p1.gap_size.vip, 20.0);
        assert_eq!(p1.spacing, 17.0);
        assert_eq!(p1.gap_y_range, (14.0, 26.0));

        let p5 = difficulty_profile(5, &level);
        assert_eq!(p5.spacing, 13.0);
        assert_eq!(p5.gap_y_range, (10.0, 30.0));
    }

    #[test]
    fn test_extrapolated_profile() {
        let level = LevelTuning::default();
        let p7 = difficulty_profile(7, &level);
        assert!((p7.gap_size.normal - 9.0).abs() < 1e-4);
        assert!((p7.gap_size.vip - 14.4).abs() < 1e-4);
        assert!((p7.spacing - 12.0).abs() < 1e-4);
        assert_eq!(p7.gap_y_range, (10.0, 30.0));

        let deep = difficulty_profile(100, &level);
        assert_eq!(deep.gap_size.normal, 5.0);
        assert_eq!(deep.gap_size.vip, 10.0);
        assert_eq!(deep.spacing, 8.0);
    }

    #[test]
    fn test_theme_cycles() {
        let table = ["a", "b", "c", "d", "e", "f", "g"];
        assert_eq!(theme_for_stage(1, &table), Some(&"a"));
        assert_eq!(theme_for_stage(7, &table), Some(&"g"));
        assert_eq!(theme_for_stage(8, &table), Some(&"a"));
        assert_eq!(theme_for_stage(15, &table), Some(&"a"));
        let empty: [u8; 0] = [];
        assert_eq!(theme_for_stage(3, &empty), None);
    }

    #[test]
    fn test_first_spawns() {
        let level = LevelTuning::default();
        let mut field = ObstacleField::new(42, &level);
        field.update(0.0, 1, PartTier::Normal, &level, 7);

        // Lookahead 50 equals the initial spawn x: nothing yet
        assert!(field.obstacles().is_empty());

        field.update(1.0, 1, PartTier::Normal, &level, 7);
        let first = &field.obstacles()[0];
        assert_eq!(first.x, 67.0);
        assert_eq!(first.gap_size, 14.0);
        assert!((14.0..=26.0).contains(&first.gap_center_y));
        assert_eq!(first.color_theme, 0);
    }

    #[test]
    fn test_spawn_spacing_and_vip_gap() {
        let level = LevelTuning::default();
        let mut field = ObstacleField::new(7, &level);
        field.update(60.0, 1, PartTier::Vip, &level, 7);

        let xs: Vec<f32> = field.obstacles().iter().map(|o| o.x).collect();
        assert_eq!(xs, vec![67.0, 84.0, 101.0, 118.0]);
        assert!(field.obstacles().iter().all(|o| o.gap_size == 20.0));
        assert!(field.last_spawn_x() >= 60.0 + level.spawn_lookahead);
    }

    #[test]
    fn test_cleanup_behind_vehicle() {
        let level = LevelTuning::default();
        let mut field = ObstacleField::new(1, &level);
        field.update(60.0, 1, PartTier::Normal, &level, 7);
        field.update(97.0, 1, PartTier::Normal, &level, 7);
        // 67 is exactly 30 behind
        assert!(field.obstacles().iter().all(|o| o.x > 67.0));
        assert!(field.obstacles().iter().any(|o| o.x == 84.0));
    }

    #[test]
    fn test_clear_near() {
        let level = LevelTuning::default();
        let mut field = ObstacleField::new(3, &level);
        field.update(60.0, 1, PartTier::Normal, &level, 7);
        assert_eq!(field.clear_near(70.0, 12.0), 1);
        assert!(field.obstacles().iter().all(|o| (o.x - 70.0).abs() > 12.0));
    }

    #[test]
    fn test_unlock_on_stage_transitions() {
        let level = LevelTuning::default();
        let mut unlocked = UnlockedEquipment::from_items(level.base_equipment());
        let mut progress = StageProgress::default();

        assert!(progress.update(500, &level, &mut unlocked).is_empty());
        assert_eq!(progress.stage, 2);

        let fresh = progress.update(1000, &level, &mut unlocked);
        assert_eq!(fresh, vec![EquipmentKey::new(PartType::Wing, PartTier::Vip)]);
        assert_eq!(unlocked.len(), 5);

        // Replaying the transition grants nothing new
        progress.reset();
        assert!(progress.update(1000, &level, &mut unlocked).is_empty());
        assert_eq!(unlocked.len(), 5);
        assert_eq!(progress.highest_stage, 3);
    }

    #[test]
    fn test_skipped_stages_still_unlock() {
        let level = LevelTuning::default();
        let mut unlocked = UnlockedEquipment::from_items(level.base_equipment());
        let mut progress = StageProgress::default();
        let fresh = progress.update(2600, &level, &mut unlocked);
        assert_eq!(progress.stage, 6);
        assert_eq!(fresh.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_stage_is_monotonic(a in -10_000i64..1_000_000, b in -10_000i64..1_000_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(stage_for_score(lo) <= stage_for_score(hi));
            if lo >= 0 {
                prop_assert_eq!(stage_for_score(lo) as i64, lo / 500 + 1);
            } else {
                prop_assert_eq!(stage_for_score(lo), 1);
            }
        }

        #[test]
        fn prop_difficulty_never_eases(stage in 1u32..200) {
            let level = LevelTuning::default();
            let cur = difficulty_profile(stage, &level);
            let next = difficulty_profile(stage + 1, &level);
            prop_assert!(next.gap_size.normal <= cur.gap_size.normal);
            prop_assert!(next.gap_size.vip <= cur.gap_size.vip);
            prop_assert!(next.spacing <= cur.spacing);
            prop_assert!(next.gap_size.normal >= 5.0);
            prop_assert!(next.gap_size.vip >= 10.0);
            prop_assert!(next.spacing >= 8.0);
        }

        #[test]
        fn prop_highest_stage_is_max_seen(scores in proptest::collection::vec(0i64..20_000, 1..40)) {
            let level = LevelTuning::default();
            let mut unlocked = UnlockedEquipment::from_items(level.base_equipment());
            let mut progress = StageProgress::default();
            for &score in &scores {
                progress.update(score, &level, &mut unlocked);
            }
            let expected = scores.iter().map(|&s| stage_for_score(s)).max().unwrap_or(1);
            prop_assert_eq!(progress.highest_stage, expected.max(1));
        }
    }
}
