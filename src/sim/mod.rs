//! Simulation module
//!
//! All gameplay logic lives here. No rendering, audio or storage:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Side effects leave through the session's event queue

pub mod assembly;
pub mod collision;
pub mod flight;
pub mod part;
pub mod performance;
pub mod session;
pub mod stage;
pub mod timers;

pub use assembly::{ConnectivityReport, PlacementError, Vehicle};
pub use collision::{Contact, ContactKind};
pub use flight::{Debris, ExplosionCause, FlightBody, PartTransform};
pub use part::{EquipmentKey, Part, PartId, PartStats, PartTier, PartType, UnlockedEquipment};
pub use performance::VehiclePerformance;
pub use session::{
    PlayerProfile, ReviveFlags, ReviveKind, Session, SessionError, SessionEvent, SessionSnapshot,
    SessionState,
};
pub use stage::{Obstacle, ObstacleId, difficulty_profile, stage_for_score, theme_for_stage};
