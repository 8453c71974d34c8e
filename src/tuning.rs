//! Data-driven game balance
//!
//! Every number the simulation reads for feel or difficulty lives here, so a
//! JSON file can override it without a rebuild. Missing fields fall back to
//! the built-in defaults.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sim::part::{EquipmentKey, PartTier, PartType};

/// Flight physics constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightTuning {
    /// Fixed forward speed (units/s)
    pub forward_speed: f32,
    /// Upward force per unit of engine thrust while flapping
    pub flap_force: f32,
    /// Base spin torque
    pub base_torque: f32,
    /// Gravity (negative = down)
    pub gravity: f32,
    /// Per-second linear velocity loss fraction
    pub linear_damping: f32,
    /// Per-second angular velocity loss fraction
    pub angular_damping: f32,
    /// Downward force per unit of mass when the vehicle cannot fly
    pub fall_force_per_mass: f32,
    /// Wing lift factor (force = lift * |vx| * factor)
    pub lift_factor: f32,
    /// Counter-torque gain for balanced wings
    pub lift_stabilize_gain: f32,
    /// Flight height limits
    pub min_height: f32,
    pub max_height: f32,
    /// Body spawn height at takeoff
    pub spawn_height: f32,
    /// Impact speed tolerated before exploding
    pub collision_threshold_normal: f32,
    pub collision_threshold_vip: f32,
    /// Collision sphere radius
    pub vehicle_radius_normal: f32,
    pub vehicle_radius_vip: f32,
    /// Obstacle pipe geometry
    pub obstacle_width: f32,
    pub obstacle_height: f32,
    /// Explosion impulse magnitude range
    pub explosion_force_min: f32,
    pub explosion_force_max: f32,
    /// Explosion spin range (per axis, symmetric)
    pub explosion_spin: f32,
    /// Obstacles closer than this are cleared when reviving
    pub revive_clearance: f32,
}

impl Default for FlightTuning {
    fn default() -> Self {
        Self {
            forward_speed: 8.0,
            flap_force: 55.0,
            base_torque: 2.0,
            gravity: -12.0,
            linear_damping: 0.1,
            angular_damping: 0.9,
            fall_force_per_mass: 20.0,
            lift_factor: 0.8,
            lift_stabilize_gain: 0.5,
            min_height: 1.0,
            max_height: 100.0,
            spawn_height: 10.0,
            collision_threshold_normal: 2.0,
            collision_threshold_vip: 8.0,
            vehicle_radius_normal: 1.5,
            vehicle_radius_vip: 2.5,
            obstacle_width: 3.0,
            obstacle_height: 100.0,
            explosion_force_min: 8.0,
            explosion_force_max: 20.0,
            explosion_spin: 15.0,
            revive_clearance: 12.0,
        }
    }
}

impl FlightTuning {
    pub fn vehicle_radius(&self, vip: bool) -> f32 {
        if vip {
            self.vehicle_radius_vip
        } else {
            self.vehicle_radius_normal
        }
    }

    pub fn collision_threshold(&self, vip: bool) -> f32 {
        if vip {
            self.collision_threshold_vip
        } else {
            self.collision_threshold_normal
        }
    }

    #[inline]
    pub fn obstacle_half_width(&self) -> f32 {
        self.obstacle_width / 2.0
    }
}

/// Gap size per player tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapSizes {
    pub normal: f32,
    pub vip: f32,
}

impl GapSizes {
    pub fn for_tier(&self, tier: PartTier) -> f32 {
        match tier {
            PartTier::Normal => self.normal,
            PartTier::Vip => self.vip,
        }
    }
}

/// Obstacle generation parameters for one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    pub gap_size: GapSizes,
    /// Distance between consecutive obstacles
    pub spacing: f32,
    /// Allowed range for the gap center (min, max)
    pub gap_y_range: (f32, f32),
}

/// Equipment granted when a stage is first reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRule {
    pub stage: u32,
    pub items: Vec<EquipmentKey>,
}

/// Stage progression and obstacle field parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTuning {
    /// Fixed profiles for stages 1..=len
    pub profiles: Vec<DifficultyProfile>,
    pub min_gap_normal: f32,
    pub min_gap_vip: f32,
    pub min_spacing: f32,
    /// Fractional gap shrink per stage past the table
    pub gap_reduction_rate: f32,
    /// Spacing shrink per stage past the table
    pub spacing_step: f32,
    /// First obstacle x and lookahead distance for spawning
    pub spawn_lookahead: f32,
    /// Obstacles further behind than this are retired
    pub cleanup_distance: f32,
    pub unlocks: Vec<UnlockRule>,
}

impl Default for LevelTuning {
    fn default() -> Self {
        let profile = |normal: f32, vip: f32, spacing: f32, lo: f32, hi: f32| DifficultyProfile {
            gap_size: GapSizes { normal, vip },
            spacing,
            gap_y_range: (lo, hi),
        };
        let item = |part_type, tier| EquipmentKey { part_type, tier };

        Self {
            profiles: vec![
                profile(14.0, 20.0, 17.0, 14.0, 26.0),
                profile(13.0, 19.0, 16.0, 13.0, 27.0),
                profile(12.0, 18.0, 15.0, 12.0, 28.0),
                profile(11.0, 17.0, 14.0, 11.0, 29.0),
                profile(10.0, 16.0, 13.0, 10.0, 30.0),
            ],
            min_gap_normal: 5.0,
            min_gap_vip: 10.0,
            min_spacing: 8.0,
            gap_reduction_rate: 0.05,
            spacing_step: 0.5,
            spawn_lookahead: 50.0,
            cleanup_distance: 30.0,
            unlocks: vec![
                UnlockRule {
                    stage: 1,
                    items: vec![
                        item(PartType::Wing, PartTier::Normal),
                        item(PartType::Engine, PartTier::Normal),
                        item(PartType::Fuselage, PartTier::Normal),
                        item(PartType::Cockpit, PartTier::Normal),
                    ],
                },
                UnlockRule { stage: 3, items: vec![item(PartType::Wing, PartTier::Vip)] },
                UnlockRule { stage: 5, items: vec![item(PartType::Engine, PartTier::Vip)] },
                UnlockRule { stage: 7, items: vec![item(PartType::Fuselage, PartTier::Vip)] },
                UnlockRule { stage: 10, items: vec![item(PartType::Cockpit, PartTier::Vip)] },
            ],
        }
    }
}

impl LevelTuning {
    /// Items unlocked on reaching exactly `stage`
    pub fn unlocks_at(&self, stage: u32) -> &[EquipmentKey] {
        self.unlocks
            .iter()
            .find(|rule| rule.stage == stage)
            .map(|rule| rule.items.as_slice())
            .unwrap_or(&[])
    }

    /// The default unlock set (stage 1 items)
    pub fn base_equipment(&self) -> Vec<EquipmentKey> {
        self.unlocks_at(1).to_vec()
    }
}

/// Obstacle pipe colors (hex)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstaclePalette {
    pub top: String,
    pub bottom: String,
}

/// Sky and lighting preset for the backdrop renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackdropTheme {
    pub sun_position: [f32; 3],
    pub inclination: f32,
    pub azimuth: f32,
    pub ambient_intensity: f32,
    pub directional_intensity: f32,
    pub star_count: u32,
    pub star_fade: bool,
    pub star_speed: f32,
}

/// Oscillator waveform for ambient music voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// Ambient music profile for one stage theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientProfile {
    pub chords: Vec<[f32; 3]>,
    pub bass_notes: Vec<f32>,
    /// Melody steps in Hz, 0 = rest
    pub melody: Vec<f32>,
    pub chord_duration: f32,
    pub chord_waveform: Waveform,
    pub melody_waveform: Waveform,
}

/// Cosmetic theme tables, cycled by stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeTables {
    pub obstacle_palettes: Vec<ObstaclePalette>,
    pub backdrops: Vec<BackdropTheme>,
    pub ambient: Vec<AmbientProfile>,
}

impl Default for ThemeTables {
    fn default() -> Self {
        let palette = |top: &str, bottom: &str| ObstaclePalette {
            top: top.to_string(),
            bottom: bottom.to_string(),
        };
        let backdrop = |sun_y: f32, inclination, azimuth, ambient, directional, stars: u32, speed| {
            BackdropTheme {
                sun_position: [100.0, sun_y, 100.0],
                inclination,
                azimuth,
                ambient_intensity: ambient,
                directional_intensity: directional,
                star_count: stars,
                star_fade: stars > 0,
                star_speed: speed,
            }
        };
        use Waveform::*;
        let ambient = |chords: [[f32; 3]; 4],
                       bass: [f32; 4],
                       melody: [f32; 16],
                       chord_duration: f32,
                       chord_waveform: Waveform,
                       melody_waveform: Waveform| AmbientProfile {
            chords: chords.to_vec(),
            bass_notes: bass.to_vec(),
            melody: melody.to_vec(),
            chord_duration,
            chord_waveform,
            melody_waveform,
        };

        Self {
            // Red, orange, yellow, green, cyan, blue, violet
            obstacle_palettes: vec![
                palette("#ef4444", "#dc2626"),
                palette("#f97316", "#ea580c"),
                palette("#eab308", "#ca8a04"),
                palette("#22c55e", "#16a34a"),
                palette("#06b6d4", "#0891b2"),
                palette("#3b82f6", "#2563eb"),
                palette("#8b5cf6", "#7c3aed"),
            ],
            // Day, dusk, night, aurora dawn, desert noon, deep sea, violet haze
            backdrops: vec![
                backdrop(20.0, 0.5, 0.25, 0.4, 1.0, 0, 0.0),
                backdrop(5.0, 0.49, 0.15, 0.3, 0.7, 500, 0.5),
                backdrop(-10.0, 0.48, 0.05, 0.15, 0.3, 3000, 1.5),
                backdrop(2.0, 0.52, 0.35, 0.35, 0.6, 1500, 2.0),
                backdrop(40.0, 0.55, 0.25, 0.6, 1.5, 0, 0.0),
                backdrop(-5.0, 0.47, 0.1, 0.2, 0.4, 800, 0.8),
                backdrop(10.0, 0.51, 0.3, 0.35, 0.8, 2000, 1.2),
            ],
            ambient: vec![
                ambient(
                    [[329.6, 392.0, 493.9], [261.6, 329.6, 392.0], [196.0, 246.9, 293.7], [293.7, 370.0, 440.0]],
                    [164.8, 130.8, 98.0, 146.8],
                    [659.3, 0.0, 784.0, 659.3, 587.3, 0.0, 523.3, 587.3, 659.3, 0.0, 784.0, 880.0, 784.0, 0.0, 659.3, 0.0],
                    2.8,
                    Triangle,
                    Sine,
                ),
                ambient(
                    [[261.6, 329.6, 392.0], [220.0, 277.2, 329.6], [196.0, 246.9, 293.7], [246.9, 311.1, 370.0]],
                    [130.8, 110.0, 98.0, 123.5],
                    [523.3, 0.0, 493.9, 440.0, 392.0, 0.0, 440.0, 493.9, 523.3, 0.0, 587.3, 523.3, 493.9, 0.0, 440.0, 0.0],
                    3.5,
                    Sine,
                    Sine,
                ),
                ambient(
                    [[293.7, 370.0, 440.0], [261.6, 329.6, 415.3], [220.0, 293.7, 370.0], [246.9, 329.6, 392.0]],
                    [146.8, 130.8, 110.0, 123.5],
                    [880.0, 0.0, 784.0, 0.0, 659.3, 0.0, 587.3, 0.0, 659.3, 0.0, 784.0, 0.0, 880.0, 0.0, 0.0, 0.0],
                    4.0,
                    Sine,
                    Triangle,
                ),
                ambient(
                    [[246.9, 311.1, 392.0], [277.2, 349.2, 440.0], [293.7, 370.0, 466.2], [329.6, 415.3, 523.3]],
                    [123.5, 138.6, 146.8, 164.8],
                    [493.9, 523.3, 587.3, 659.3, 0.0, 784.0, 880.0, 0.0, 987.8, 880.0, 784.0, 0.0, 659.3, 587.3, 523.3, 0.0],
                    3.2,
                    Triangle,
                    Sine,
                ),
                ambient(
                    [[329.6, 415.3, 493.9], [349.2, 440.0, 523.3], [293.7, 370.0, 440.0], [311.1, 392.0, 466.2]],
                    [164.8, 174.6, 146.8, 155.6],
                    [659.3, 784.0, 659.3, 784.0, 880.0, 784.0, 659.3, 784.0, 880.0, 987.8, 880.0, 784.0, 659.3, 784.0, 659.3, 0.0],
                    2.0,
                    Sawtooth,
                    Square,
                ),
                ambient(
                    [[196.0, 246.9, 311.1], [174.6, 220.0, 277.2], [164.8, 207.7, 261.6], [185.0, 233.1, 293.7]],
                    [98.0, 87.3, 82.4, 92.5],
                    [392.0, 0.0, 370.0, 329.6, 0.0, 293.7, 329.6, 0.0, 370.0, 392.0, 440.0, 0.0, 392.0, 370.0, 0.0, 329.6],
                    3.8,
                    Sine,
                    Sine,
                ),
                ambient(
                    [[277.2, 349.2, 440.0], [311.1, 392.0, 493.9], [261.6, 329.6, 415.3], [293.7, 370.0, 466.2]],
                    [138.6, 155.6, 130.8, 146.8],
                    [554.4, 659.3, 0.0, 784.0, 880.0, 0.0, 784.0, 659.3, 554.4, 0.0, 659.3, 784.0, 880.0, 0.0, 987.8, 0.0],
                    3.0,
                    Triangle,
                    Triangle,
                ),
            ],
        }
    }
}

/// Failure loading a tuning file
#[derive(Debug)]
pub enum TuningError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    /// A table the simulation indexes into is empty
    EmptyTable(&'static str),
}

impl fmt::Display for TuningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuningError::Io(e) => write!(f, "failed to read tuning file: {}", e),
            TuningError::Parse(e) => write!(f, "invalid tuning JSON: {}", e),
            TuningError::EmptyTable(name) => write!(f, "tuning table `{}` must not be empty", name),
        }
    }
}

impl std::error::Error for TuningError {}

/// All balance data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub flight: FlightTuning,
    pub level: LevelTuning,
    pub themes: ThemeTables,
}

impl Tuning {
    /// Parse tuning from JSON text
    pub fn from_json(json: &str) -> Result<Self, TuningError> {
        let tuning: Tuning = serde_json::from_str(json).map_err(TuningError::Parse)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load tuning from a JSON file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, TuningError> {
        let json = std::fs::read_to_string(path).map_err(TuningError::Io)?;
        Self::from_json(&json)
    }

    /// Load tuning from a JSON file, using defaults if anything goes wrong
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_path(path) {
            Ok(tuning) => {
                log::info!("Loaded tuning from {}", path.display());
                tuning
            }
            Err(e) => {
                log::warn!("Using default tuning ({})", e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), TuningError> {
        if self.level.profiles.is_empty() {
            return Err(TuningError::EmptyTable("level.profiles"));
        }
        if self.themes.obstacle_palettes.is_empty() {
            return Err(TuningError::EmptyTable("themes.obstacle_palettes"));
        }
        if self.themes.backdrops.is_empty() {
            return Err(TuningError::EmptyTable("themes.backdrops"));
        }
        if self.themes.ambient.is_empty() {
            return Err(TuningError::EmptyTable("themes.ambient"));
        }
        Ok(())
    }
}
