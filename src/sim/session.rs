//! Session lifecycle
//!
//! `Session` owns every piece of run state and is mutated only through its
//! command methods and [`Session::tick`]. Side effects the host must carry
//! out (saving, leaderboard calls, sounds) are queued as [`SessionEvent`]s
//! and drained after each tick.

use std::fmt;

use glam::{IVec3, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::assembly::{ConnectivityReport, PlacementError, Vehicle};
use super::collision::Contact;
use super::flight::{
    Debris, ExplosionCause, FlightBody, FlightContext, FlightController, FlightInput,
    PartTransform, part_build_transforms, part_world_transforms,
};
use super::part::{EquipmentKey, Part, PartId, PartTier, PartType, UnlockedEquipment};
use super::performance::VehiclePerformance;
use super::stage::{Obstacle, ObstacleField, StageProgress, theme_for_stage};
use super::timers::Timers;
use crate::consts::GAME_OVER_DELAY;
use crate::persistence::PersistedProgress;
use crate::tuning::{AmbientProfile, BackdropTheme, ObstaclePalette, Tuning};

/// Player identity supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    pub is_vip: bool,
}

impl PlayerProfile {
    pub fn tier(&self) -> PartTier {
        if self.is_vip {
            PartTier::Vip
        } else {
            PartTier::Normal
        }
    }
}

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Editing the vehicle on the grid
    #[default]
    Building,
    /// Vehicle in the obstacle course
    Flying,
    /// Blown up, game over pending
    Exploded,
    /// Run ended
    GameOver,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Building => "Building",
            SessionState::Flying => "Flying",
            SessionState::Exploded => "Exploded",
            SessionState::GameOver => "GameOver",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ways to continue a run after exploding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviveKind {
    Share,
    Referral,
}

/// Per-run revive bookkeeping. Survives revives, cleared by a new run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviveFlags {
    pub used_share_revive: bool,
    pub used_referral_revive: bool,
    pub referral_lives_remaining: u32,
}

/// Why a command was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// Command not accepted in the current state
    InvalidState {
        command: &'static str,
        state: SessionState,
    },
    /// Cannot fly without parts
    EmptyVehicle,
    /// Revive already used this run, or no credits left
    ReviveUnavailable(ReviveKind),
    Placement(PlacementError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidState { command, state } => {
                write!(f, "`{}` not allowed while {}", command, state)
            }
            SessionError::EmptyVehicle => f.write_str("vehicle has no parts"),
            SessionError::ReviveUnavailable(kind) => write!(f, "{:?} revive unavailable", kind),
            SessionError::Placement(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<PlacementError> for SessionError {
    fn from(e: PlacementError) -> Self {
        SessionError::Placement(e)
    }
}

/// Side effects for the host, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PartPlaced(PartId),
    PartRemoved(PartId),
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Flapped,
    StageChanged {
        stage: u32,
    },
    EquipmentUnlocked(EquipmentKey),
    Exploded(ExplosionCause),
    Revived(ReviveKind),
    GameOver {
        score: i64,
        stage: u32,
        new_high_score: bool,
        /// This run already reached game over once before a revive
        replaces_earlier: bool,
    },
    /// Write this progress to storage
    PersistProgress(PersistedProgress),
    /// Send a closed run's final score to the leaderboard
    SubmitScore {
        player: PlayerProfile,
        score: i64,
    },
    /// Spend one remote referral credit
    ConsumeReferralCredit {
        player: PlayerProfile,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeferredEvent {
    GameOver,
}

/// A live obstacle with its resolved colors
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveObstacle {
    #[serde(flatten)]
    pub obstacle: Obstacle,
    pub palette: Option<ObstaclePalette>,
}

/// Consistent copy of everything readers need, taken between ticks
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub parts: Vec<Part>,
    pub part_transforms: Vec<PartTransform>,
    pub performance: VehiclePerformance,
    pub connectivity: ConnectivityReport,
    pub selected: EquipmentKey,
    pub unlocked: Vec<EquipmentKey>,
    pub score: i64,
    pub stage: u32,
    pub highest_stage: u32,
    pub high_score: i64,
    pub body: Option<FlightBody>,
    pub debris: Vec<Debris>,
    pub obstacles: Vec<LiveObstacle>,
    pub backdrop: Option<BackdropTheme>,
    pub revive: ReviveFlags,
    pub can_share_revive: bool,
}

/// One player's build-and-fly session
pub struct Session {
    tuning: Tuning,
    profile: PlayerProfile,
    state: SessionState,
    vehicle: Vehicle,
    performance: VehiclePerformance,
    selected: EquipmentKey,
    unlocked: UnlockedEquipment,
    progress: StageProgress,
    high_score: i64,
    score: i64,
    flap: bool,
    flight: FlightController,
    field: ObstacleField,
    timers: Timers<DeferredEvent>,
    revive: ReviveFlags,
    /// Game over already reported for this run
    run_recorded: bool,
    /// Final score waiting for the run to close
    pending_submission: Option<i64>,
    seed: u64,
    runs: u64,
    rng: Pcg32,
    events: Vec<SessionEvent>,
}

impl Session {
    /// Start in `Building` with previously persisted progress
    pub fn new(tuning: Tuning, progress: PersistedProgress, profile: PlayerProfile, seed: u64) -> Self {
        let flight = FlightController::new(spawn_point(&tuning), tuning.flight.forward_speed);
        let field = ObstacleField::new(seed, &tuning.level);
        let mut unlocked = progress.unlocked_equipment;
        for key in tuning.level.base_equipment() {
            unlocked.unlock(key);
        }

        Self {
            profile,
            state: SessionState::Building,
            vehicle: Vehicle::new(),
            performance: VehiclePerformance::default(),
            selected: EquipmentKey::new(PartType::Fuselage, PartTier::Normal),
            unlocked,
            progress: StageProgress::new(progress.highest_stage),
            high_score: progress.high_score,
            score: 0,
            flap: false,
            flight,
            field,
            timers: Timers::new(),
            revive: ReviveFlags::default(),
            run_recorded: false,
            pending_submission: None,
            seed,
            runs: 0,
            rng: Pcg32::seed_from_u64(seed),
            events: Vec::new(),
            tuning,
        }
    }

    // === Commands ===

    /// Place a part on the build grid
    pub fn place_part(
        &mut self,
        part_type: PartType,
        tier: PartTier,
        target: IVec3,
    ) -> Result<PartId, SessionError> {
        self.require(SessionState::Building, "place_part")?;
        let id = self.vehicle.place_part(part_type, tier, target, &self.unlocked)?;
        self.performance = VehiclePerformance::from_parts(self.vehicle.parts());
        self.events.push(SessionEvent::PartPlaced(id));
        Ok(id)
    }

    /// Place the currently selected (type, tier)
    pub fn place_selected_part(&mut self, target: IVec3) -> Result<PartId, SessionError> {
        let key = self.selected;
        self.place_part(key.part_type, key.tier, target)
    }

    /// Remove whatever sits at `position`. Nothing there is not an error.
    pub fn remove_part_at(&mut self, position: IVec3) -> Result<Option<PartId>, SessionError> {
        self.require(SessionState::Building, "remove_part_at")?;
        let removed = self.vehicle.remove_part_at(position).map(|p| p.id);
        if let Some(id) = removed {
            self.performance = VehiclePerformance::from_parts(self.vehicle.parts());
            self.events.push(SessionEvent::PartRemoved(id));
        }
        Ok(removed)
    }

    pub fn remove_part(&mut self, id: PartId) -> Result<bool, SessionError> {
        self.require(SessionState::Building, "remove_part")?;
        let removed = self.vehicle.remove_part(id).is_some();
        if removed {
            self.performance = VehiclePerformance::from_parts(self.vehicle.parts());
            self.events.push(SessionEvent::PartRemoved(id));
        }
        Ok(removed)
    }

    pub fn clear_parts(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Building, "clear_parts")?;
        for part in self.vehicle.parts() {
            self.events.push(SessionEvent::PartRemoved(part.id));
        }
        self.vehicle.clear();
        self.performance = VehiclePerformance::default();
        Ok(())
    }

    /// Choose what `place_selected_part` places. Accepted in any state.
    pub fn set_selected_part(&mut self, part_type: PartType, tier: PartTier) {
        self.selected = EquipmentKey::new(part_type, tier);
    }

    /// Flap held or released. Sampled at the start of each tick.
    pub fn set_flap_input(&mut self, held: bool) {
        if held && !self.flap && self.state == SessionState::Flying {
            self.events.push(SessionEvent::Flapped);
        }
        self.flap = held;
    }

    /// Host updates identity or VIP status
    pub fn set_player_profile(&mut self, profile: PlayerProfile) {
        self.profile = profile;
    }

    /// Launch the current vehicle into a fresh run
    pub fn start_flight(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Building, "start_flight")?;
        if self.vehicle.is_empty() {
            return Err(SessionError::EmptyVehicle);
        }

        self.runs += 1;
        self.reset_run();

        log::info!(
            "Flight started: {} parts, mass {:.1}, thrust {:.1}, stability {:.2}",
            self.vehicle.len(),
            self.performance.total_mass,
            self.performance.total_thrust,
            self.performance.stability_score
        );
        self.set_state(SessionState::Flying);
        self.events.push(SessionEvent::StageChanged {
            stage: self.progress.stage,
        });
        Ok(())
    }

    /// Leave the run and go back to the grid
    pub fn return_to_build(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Building {
            return Err(self.invalid("return_to_build"));
        }
        self.reset_run();
        self.set_state(SessionState::Building);
        Ok(())
    }

    /// New run from any state. Vehicle, unlocks and best stage are kept.
    pub fn reset_game(&mut self) {
        self.reset_run();
        self.set_state(SessionState::Building);
    }

    /// Continue after a share. Once per run.
    pub fn request_share_revive(&mut self) -> Result<(), SessionError> {
        self.require_revivable("request_share_revive")?;
        if self.revive.used_share_revive {
            return Err(SessionError::ReviveUnavailable(ReviveKind::Share));
        }
        self.revive.used_share_revive = true;
        self.revive_now(ReviveKind::Share);
        Ok(())
    }

    /// Continue by spending a referral credit. Once per run, needs credits.
    pub fn request_referral_revive(&mut self, credits_available: u32) -> Result<(), SessionError> {
        self.require_revivable("request_referral_revive")?;
        if self.revive.used_referral_revive || credits_available == 0 {
            return Err(SessionError::ReviveUnavailable(ReviveKind::Referral));
        }
        self.revive.used_referral_revive = true;
        self.revive.referral_lives_remaining = credits_available - 1;
        self.events.push(SessionEvent::ConsumeReferralCredit {
            player: self.profile.clone(),
        });
        self.revive_now(ReviveKind::Referral);
        Ok(())
    }

    // === Simulation ===

    /// Advance the session by one step.
    ///
    /// `contact` is an impact reported by an external physics engine; pass
    /// `None` to use the built-in probe.
    pub fn tick(&mut self, dt: f32, contact: Option<Contact>) {
        for event in self.timers.advance(dt) {
            match event {
                DeferredEvent::GameOver => self.enter_game_over(),
            }
        }

        match self.state {
            SessionState::Building => {}
            SessionState::Flying => self.tick_flight(dt, contact),
            SessionState::Exploded | SessionState::GameOver => {
                self.flight.step_debris(&self.tuning.flight, dt);
            }
        }
    }

    fn tick_flight(&mut self, dt: f32, contact: Option<Contact>) {
        let input = FlightInput {
            flap: self.flap,
            contact,
        };
        let step = {
            let ctx = FlightContext {
                performance: &self.performance,
                tuning: &self.tuning.flight,
                obstacles: self.field.obstacles(),
                vip: self.profile.is_vip,
            };
            self.flight.step(&input, &ctx, dt)
        };

        self.add_score(step.score_delta);

        if let Some(cause) = step.explosion {
            self.explode(cause);
            return;
        }

        self.field.update(
            self.flight.body().position.x,
            self.progress.stage,
            self.profile.tier(),
            &self.tuning.level,
            self.tuning.themes.obstacle_palettes.len(),
        );
    }

    /// Credit distance and handle any stage transition it causes
    fn add_score(&mut self, delta: i64) {
        if delta <= 0 {
            return;
        }
        self.score += delta;

        let before = self.progress;
        let fresh = self
            .progress
            .update(self.score, &self.tuning.level, &mut self.unlocked);
        if self.progress.stage != before.stage {
            self.events.push(SessionEvent::StageChanged {
                stage: self.progress.stage,
            });
        }
        for key in &fresh {
            log::info!("Unlocked {}", key);
            self.events.push(SessionEvent::EquipmentUnlocked(*key));
        }
        if !fresh.is_empty() || self.progress.highest_stage != before.highest_stage {
            self.persist();
        }
    }

    fn explode(&mut self, cause: ExplosionCause) {
        self.flight
            .explode(self.vehicle.parts(), &self.tuning.flight, &mut self.rng);
        self.set_state(SessionState::Exploded);
        self.events.push(SessionEvent::Exploded(cause));
        self.timers.schedule(DeferredEvent::GameOver, GAME_OVER_DELAY);
    }

    fn enter_game_over(&mut self) {
        if self.state != SessionState::Exploded {
            return;
        }
        let new_high_score = self.score > self.high_score;
        if new_high_score {
            self.high_score = self.score;
        }
        self.set_state(SessionState::GameOver);
        log::info!(
            "Game over: score {}, stage {}{}",
            self.score,
            self.progress.stage,
            if new_high_score { " (new best)" } else { "" }
        );
        self.events.push(SessionEvent::GameOver {
            score: self.score,
            stage: self.progress.stage,
            new_high_score,
            replaces_earlier: self.run_recorded,
        });
        self.run_recorded = true;
        self.persist();
        // A revive may still continue the run, so submission waits for it to close
        self.pending_submission = (self.score > 0).then_some(self.score);
    }

    /// Close the current run, sending its final score if it reached game over.
    /// Leaving for the grid does this too; hosts call it before quitting.
    pub fn finish_run(&mut self) {
        if let Some(score) = self.pending_submission.take() {
            self.events.push(SessionEvent::SubmitScore {
                player: self.profile.clone(),
                score,
            });
        }
    }

    fn revive_now(&mut self, kind: ReviveKind) {
        self.timers.cancel_event(&DeferredEvent::GameOver);

        let flight_tuning = &self.tuning.flight;
        let x = self.flight.body().position.x;
        let cleared = self.field.clear_near(x, flight_tuning.revive_clearance);

        // Aim for the next gap ahead, otherwise the takeoff height
        let radius = flight_tuning.vehicle_radius(self.profile.is_vip);
        let target = self
            .field
            .obstacles()
            .iter()
            .filter(|o| o.x > x)
            .min_by(|a, b| a.x.total_cmp(&b.x))
            .map(|o| o.gap_center_y)
            .unwrap_or(flight_tuning.spawn_height);
        let low = flight_tuning.min_height + radius;
        let high = (flight_tuning.max_height - radius).max(low);
        let y = target.clamp(low, high);

        self.flight
            .respawn(Vec3::new(x, y, 0.0), flight_tuning.forward_speed);
        log::info!(
            "{:?} revive at x={:.1} y={:.1} (cleared {} obstacles)",
            kind,
            x,
            y,
            cleared
        );
        self.set_state(SessionState::Flying);
        self.events.push(SessionEvent::Revived(kind));
    }

    /// Close the run and clear per-run state: score, stage, revive flags,
    /// course and timers
    fn reset_run(&mut self) {
        self.finish_run();
        self.timers.clear();
        self.score = 0;
        self.progress.reset();
        self.revive = ReviveFlags::default();
        self.run_recorded = false;
        self.flap = false;

        let run_seed = self.seed.wrapping_add(self.runs);
        self.field.reset(run_seed, &self.tuning.level);
        self.rng = Pcg32::seed_from_u64(run_seed);
        self.flight = FlightController::new(spawn_point(&self.tuning), self.tuning.flight.forward_speed);
    }

    fn persist(&mut self) {
        let progress = self.persisted_progress();
        self.events.push(SessionEvent::PersistProgress(progress));
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        log::info!("Session {} -> {}", from, to);
        self.state = to;
        self.events.push(SessionEvent::StateChanged { from, to });
    }

    fn invalid(&self, command: &'static str) -> SessionError {
        SessionError::InvalidState {
            command,
            state: self.state,
        }
    }

    fn require(&self, state: SessionState, command: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(command))
        }
    }

    fn require_revivable(&self, command: &'static str) -> Result<(), SessionError> {
        match self.state {
            SessionState::Exploded | SessionState::GameOver => Ok(()),
            _ => Err(self.invalid(command)),
        }
    }

    /// Take the queued side effects
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // === Queries ===

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    pub fn parts(&self) -> &[Part] {
        self.vehicle.parts()
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    pub fn performance(&self) -> &VehiclePerformance {
        &self.performance
    }

    pub fn connectivity(&self) -> ConnectivityReport {
        self.vehicle.connectivity()
    }

    /// Where each part is drawn: on the grid while building, on the body in flight
    pub fn part_transforms(&self) -> Vec<PartTransform> {
        match self.state {
            SessionState::Building => part_build_transforms(self.vehicle.parts()),
            _ => part_world_transforms(self.vehicle.parts(), self.flight.body()),
        }
    }

    pub fn selected_part(&self) -> EquipmentKey {
        self.selected
    }

    pub fn unlocked(&self) -> &UnlockedEquipment {
        &self.unlocked
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn stage(&self) -> u32 {
        self.progress.stage
    }

    pub fn highest_stage(&self) -> u32 {
        self.progress.highest_stage
    }

    pub fn high_score(&self) -> i64 {
        self.high_score
    }

    pub fn flight_body(&self) -> Option<&FlightBody> {
        match self.state {
            SessionState::Flying => Some(self.flight.body()),
            _ => None,
        }
    }

    pub fn debris(&self) -> &[Debris] {
        self.flight.debris()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        self.field.obstacles()
    }

    pub fn obstacle_palette(&self, obstacle: &Obstacle) -> Option<&ObstaclePalette> {
        self.tuning.themes.obstacle_palettes.get(obstacle.color_theme)
    }

    pub fn backdrop(&self) -> Option<&BackdropTheme> {
        theme_for_stage(self.progress.stage, &self.tuning.themes.backdrops)
    }

    pub fn ambient_profile(&self) -> Option<&AmbientProfile> {
        theme_for_stage(self.progress.stage, &self.tuning.themes.ambient)
    }

    pub fn revive_flags(&self) -> ReviveFlags {
        self.revive
    }

    pub fn can_share_revive(&self) -> bool {
        self.require_revivable("").is_ok() && !self.revive.used_share_revive
    }

    pub fn can_referral_revive(&self, credits_available: u32) -> bool {
        self.require_revivable("").is_ok()
            && !self.revive.used_referral_revive
            && credits_available > 0
    }

    /// What gets written to storage
    pub fn persisted_progress(&self) -> PersistedProgress {
        PersistedProgress {
            highest_stage: self.progress.highest_stage,
            unlocked_equipment: self.unlocked.clone(),
            high_score: self.high_score,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            parts: self.vehicle.parts().to_vec(),
            part_transforms: self.part_transforms(),
            performance: self.performance,
            connectivity: self.connectivity(),
            selected: self.selected,
            unlocked: self.unlocked.items().to_vec(),
            score: self.score,
            stage: self.progress.stage,
            highest_stage: self.progress.highest_stage,
            high_score: self.high_score,
            body: self.flight_body().copied(),
            debris: self.flight.debris().to_vec(),
            obstacles: self
                .field
                .obstacles()
                .iter()
                .map(|o| LiveObstacle {
                    obstacle: o.clone(),
                    palette: self.obstacle_palette(o).cloned(),
                })
                .collect(),
            backdrop: self.backdrop().cloned(),
            revive: self.revive,
            can_share_revive: self.can_share_revive(),
        }
    }
}

fn spawn_point(tuning: &Tuning) -> Vec3 {
    Vec3::new(0.0, tuning.flight.spawn_height, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::collision::ContactKind;
    use crate::sim::stage::difficulty_profile;
    use proptest::prelude::*;

    fn new_session() -> Session {
        let tuning = Tuning::default();
        let progress = PersistedProgress::new(&tuning.level);
        Session::new(tuning, progress, PlayerProfile::default(), 42)
    }

    /// 3 engines, fuselage, two wings, cockpit
    fn build_starter(session: &mut Session) {
        use PartType::*;
        let n = PartTier::Normal;
        session.place_part(Fuselage, n, IVec3::new(0, 0, 0)).unwrap();
        session.place_part(Engine, n, IVec3::new(0, 0, 1)).unwrap();
        session.place_part(Engine, n, IVec3::new(0, 0, 2)).unwrap();
        session.place_part(Engine, n, IVec3::new(0, 0, 3)).unwrap();
        session.place_part(Wing, n, IVec3::new(-1, 0, 0)).unwrap();
        session.place_part(Wing, n, IVec3::new(1, 0, 0)).unwrap();
        session.place_part(Cockpit, n, IVec3::new(0, 1, 0)).unwrap();
    }

    fn crash(session: &mut Session) {
        let contact = Contact {
            kind: ContactKind::Obstacle(0),
            impact_speed: 50.0,
        };
        session.tick(SIM_DT, Some(contact));
        assert_eq!(session.state(), SessionState::Exploded);
    }

    fn run_ticks(session: &mut Session, n: usize) {
        for _ in 0..n {
            session.tick(SIM_DT, None);
        }
    }

    #[test]
    fn test_starter_vehicle_scenario() {
        let mut session = new_session();
        build_starter(&mut session);

        let perf = session.performance();
        assert!(perf.can_fly);
        assert!((perf.total_mass - 13.5).abs() < 1e-5);
        assert!(session.connectivity().connected);

        session
            .place_part(PartType::Engine, PartTier::Normal, IVec3::new(0, 0, 4))
            .unwrap();
        let err = session
            .place_part(PartType::Engine, PartTier::Normal, IVec3::new(0, 0, 5))
            .unwrap_err();
        assert_eq!(err, SessionError::Placement(PlacementError::LimitReached));
        assert_eq!(session.vehicle().count_by_type(PartType::Engine), 4);
    }

    #[test]
    fn test_selected_part_placement() {
        let mut session = new_session();
        session.set_selected_part(PartType::Wing, PartTier::Vip);
        assert_eq!(
            session.place_selected_part(IVec3::ZERO),
            Err(SessionError::Placement(PlacementError::NotUnlocked))
        );
        session.set_selected_part(PartType::Wing, PartTier::Normal);
        assert!(session.place_selected_part(IVec3::ZERO).is_ok());
        assert_eq!(session.remove_part_at(IVec3::ZERO), Ok(Some(1)));
        assert_eq!(session.remove_part_at(IVec3::ZERO), Ok(None));
        assert!(session.performance().total_mass == 0.0);
    }

    #[test]
    fn test_empty_vehicle_cannot_launch() {
        let mut session = new_session();
        assert_eq!(session.start_flight(), Err(SessionError::EmptyVehicle));
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_commands_rejected_in_wrong_state() {
        let mut session = new_session();
        build_starter(&mut session);
        assert!(matches!(
            session.request_share_revive(),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.return_to_build(),
            Err(SessionError::InvalidState { .. })
        ));

        session.start_flight().unwrap();
        let parts_before = session.parts().to_vec();
        assert!(matches!(
            session.place_part(PartType::Wing, PartTier::Normal, IVec3::new(5, 0, 5)),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.remove_part_at(IVec3::ZERO),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.start_flight(),
            Err(SessionError::InvalidState { .. })
        ));
        assert_eq!(session.parts(), parts_before.as_slice());
    }

    #[test]
    fn test_flight_accumulates_score() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        assert_eq!(session.score(), 0);
        assert_eq!(session.stage(), 1);
        assert!(session.flight_body().is_some());

        session.set_flap_input(true);
        run_ticks(&mut session, 240);
        assert_eq!(session.state(), SessionState::Flying);
        // Two seconds at 8 units/s
        assert!((15..=16).contains(&session.score()));

        let events = session.drain_events();
        assert_eq!(
            events.iter().filter(|e| **e == SessionEvent::Flapped).count(),
            1
        );
    }

    #[test]
    fn test_explosion_then_game_over() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.set_flap_input(true);
        run_ticks(&mut session, 60);
        session.drain_events();

        crash(&mut session);
        let score = session.score();
        assert!(score > 0);
        assert_eq!(session.debris().len(), 7);
        assert!(session.flight_body().is_none());

        run_ticks(&mut session, 170);
        assert_eq!(session.state(), SessionState::Exploded);
        run_ticks(&mut session, 20);
        assert_eq!(session.state(), SessionState::GameOver);
        assert_eq!(session.high_score(), score);

        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::GameOver {
            score,
            stage: 1,
            new_high_score: true,
            replaces_earlier: false,
        }));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::PersistProgress(p) if p.high_score == score)));
        // A revive could still continue the run
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::SubmitScore { .. })));

        session.return_to_build().unwrap();
        let events = session.drain_events();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::SubmitScore { score: s, .. } if *s == score)));
    }

    #[test]
    fn test_revived_run_submits_final_score_once() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.add_score(40);
        crash(&mut session);
        run_ticks(&mut session, 200);
        assert_eq!(session.state(), SessionState::GameOver);

        session.request_share_revive().unwrap();
        session.add_score(60);
        crash(&mut session);
        run_ticks(&mut session, 200);
        assert_eq!(session.state(), SessionState::GameOver);
        let final_score = session.score();
        assert!(final_score >= 100);

        session.reset_game();
        let events = session.drain_events();
        let game_overs: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::GameOver { replaces_earlier, .. } => Some(*replaces_earlier),
                _ => None,
            })
            .collect();
        assert_eq!(game_overs, vec![false, true]);
        let submitted: Vec<i64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::SubmitScore { score, .. } => Some(*score),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, vec![final_score]);

        // Next run starts unrecorded
        session.start_flight().unwrap();
        crash(&mut session);
        run_ticks(&mut session, 200);
        assert!(session.drain_events().iter().any(|e| matches!(
            e,
            SessionEvent::GameOver {
                replaces_earlier: false,
                ..
            }
        )));
    }

    #[test]
    fn test_zero_score_is_not_submitted() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        crash(&mut session);
        run_ticks(&mut session, 200);
        assert_eq!(session.state(), SessionState::GameOver);
        session.return_to_build().unwrap();
        let events = session.drain_events();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::SubmitScore { .. })));
    }

    #[test]
    fn test_share_revive_keeps_progress() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.add_score(1234);
        assert_eq!(session.stage(), 3);
        crash(&mut session);

        session.request_share_revive().unwrap();
        assert_eq!(session.state(), SessionState::Flying);
        assert_eq!(session.score(), 1234);
        assert_eq!(session.stage(), 3);
        assert!(session.revive_flags().used_share_revive);
        assert!(session.debris().is_empty());

        // The cancelled timer never fires
        session.set_flap_input(true);
        run_ticks(&mut session, 200);
        assert_eq!(session.state(), SessionState::Flying);

        crash(&mut session);
        assert_eq!(
            session.request_share_revive(),
            Err(SessionError::ReviveUnavailable(ReviveKind::Share))
        );
    }

    #[test]
    fn test_referral_revive_needs_credits() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        crash(&mut session);
        run_ticks(&mut session, 200);
        assert_eq!(session.state(), SessionState::GameOver);

        assert!(!session.can_referral_revive(0));
        assert_eq!(
            session.request_referral_revive(0),
            Err(SessionError::ReviveUnavailable(ReviveKind::Referral))
        );
        session.drain_events();

        session.request_referral_revive(3).unwrap();
        assert_eq!(session.state(), SessionState::Flying);
        assert_eq!(session.revive_flags().referral_lives_remaining, 2);
        let events = session.drain_events();
        let consumed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::ConsumeReferralCredit { .. }))
            .count();
        assert_eq!(consumed, 1);

        crash(&mut session);
        assert!(!session.can_referral_revive(2));
        // Share is still available in the same run
        assert!(session.can_share_revive());
    }

    #[test]
    fn test_revive_clears_nearby_obstacles() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.field.update(60.0, 1, PartTier::Normal, &session.tuning.level, 7);
        session.flight.respawn(Vec3::new(66.0, 5.0, 0.0), 8.0);
        crash(&mut session);

        session.request_share_revive().unwrap();
        let x = session.flight_body().unwrap().position.x;
        assert!(session.obstacles().iter().all(|o| (o.x - x).abs() > 12.0));
        // Respawned inside the next gap
        let next = session.obstacles().iter().find(|o| o.x > x).unwrap();
        assert_eq!(session.flight_body().unwrap().position.y, next.gap_center_y);
    }

    #[test]
    fn test_revive_keeps_velocity_history() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        run_ticks(&mut session, 30);
        crash(&mut session);
        let before = *session.flight.body();
        assert!(before.velocity.y < 0.0);

        session.request_share_revive().unwrap();
        let body = session.flight_body().unwrap();
        assert_eq!(body.velocity.y, before.velocity.y);
        assert_eq!(body.velocity.x, session.tuning().flight.forward_speed);
        assert_eq!(body.angle, before.angle);
        assert_eq!(body.angular_velocity, before.angular_velocity);
    }

    #[test]
    fn test_vip_profile_gets_vip_gaps() {
        let tuning = Tuning::default();
        let progress = PersistedProgress::new(&tuning.level);
        let vip = PlayerProfile {
            is_vip: true,
            ..PlayerProfile::default()
        };
        let mut session = Session::new(tuning, progress, vip, 42);
        build_starter(&mut session);
        session.start_flight().unwrap();
        run_ticks(&mut session, 2);

        let expected = difficulty_profile(1, &session.tuning().level).gap_size.vip;
        assert!(!session.obstacles().is_empty());
        assert!(session.obstacles().iter().all(|o| o.gap_size == expected));

        // Normal players get the tighter gap
        let mut normal = new_session();
        build_starter(&mut normal);
        normal.start_flight().unwrap();
        run_ticks(&mut normal, 2);
        let tight = difficulty_profile(1, &normal.tuning().level).gap_size.normal;
        assert!(normal.obstacles().iter().all(|o| o.gap_size == tight));
        assert!(tight < expected);
    }

    #[test]
    fn test_reset_keeps_unlocks_and_best_stage() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.add_score(1000);
        assert!(
            session
                .unlocked()
                .contains(EquipmentKey::new(PartType::Wing, PartTier::Vip))
        );
        crash(&mut session);
        session.request_share_revive().unwrap();

        session.reset_game();
        assert_eq!(session.state(), SessionState::Building);
        assert_eq!(session.score(), 0);
        assert_eq!(session.stage(), 1);
        assert_eq!(session.highest_stage(), 3);
        assert_eq!(session.revive_flags(), ReviveFlags::default());
        assert_eq!(session.unlocked().len(), 5);
        assert_eq!(session.parts().len(), 7);

        // Next run replays the transition without new unlocks
        session.start_flight().unwrap();
        session.drain_events();
        session.add_score(1000);
        let events = session.drain_events();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::EquipmentUnlocked(_))));
    }

    #[test]
    fn test_stage_two_then_three_unlocks_once() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.drain_events();

        session.add_score(500);
        let events = session.drain_events();
        assert!(events.contains(&SessionEvent::StageChanged { stage: 2 }));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::EquipmentUnlocked(_))));

        session.add_score(500);
        let events = session.drain_events();
        let unlocked: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::EquipmentUnlocked(key) => Some(*key),
                _ => None,
            })
            .collect();
        assert_eq!(unlocked, vec![EquipmentKey::new(PartType::Wing, PartTier::Vip)]);
    }

    #[test]
    fn test_return_to_build_from_flight() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.add_score(42);
        session.return_to_build().unwrap();
        assert_eq!(session.state(), SessionState::Building);
        assert_eq!(session.score(), 0);
        assert!(session.obstacles().is_empty());
        // Building transforms sit on the grid
        let transforms = session.part_transforms();
        assert_eq!(transforms[0].position, Vec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut session = new_session();
        build_starter(&mut session);
        session.start_flight().unwrap();
        session.set_flap_input(true);
        run_ticks(&mut session, 10);

        let snap = session.snapshot();
        assert_eq!(snap.state, SessionState::Flying);
        assert_eq!(snap.parts.len(), 7);
        assert_eq!(snap.part_transforms.len(), 7);
        assert!(snap.connectivity.connected);
        assert!(snap.body.is_some());
        assert!(snap.backdrop.is_some());
        assert!(!snap.can_share_revive);
        assert!(serde_json::to_string(&snap).is_ok());
    }

    proptest! {
        #[test]
        fn prop_revive_preserves_stage(score in 0i64..20_000) {
            let mut session = new_session();
            build_starter(&mut session);
            session.start_flight().unwrap();
            session.add_score(score);
            let stage = session.stage();
            crash(&mut session);
            session.request_share_revive().unwrap();
            prop_assert_eq!(session.stage(), stage);
            prop_assert_eq!(session.score(), score);
        }
    }
}
