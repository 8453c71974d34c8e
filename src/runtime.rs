//! Fixed-timestep driver
//!
//! Owns the session plus its collaborators. Each frame it runs up to
//! `MAX_SUBSTEPS` fixed ticks and routes the session's events to storage,
//! the backend worker and audio.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::audio::{AudioManager, SoundEffect};
use crate::backend::{BackendHandle, BackendMessage};
use crate::consts::{MAX_SUBSTEPS, SIM_DT};
use crate::highscores::{HighScoreEntry, HighScores};
use crate::persistence::{PersistedProgress, Storage};
use crate::sim::collision::Contact;
use crate::sim::session::{PlayerProfile, Session, SessionEvent, SessionSnapshot, SessionState};
use crate::tuning::Tuning;

/// Longest frame the accumulator accepts (seconds)
const MAX_FRAME_DT: f32 = 0.1;

pub struct Runtime {
    session: Session,
    storage: Box<dyn Storage>,
    backend: Option<BackendHandle>,
    audio: AudioManager,
    high_scores: HighScores,
    accumulator: f32,
    /// Engine contact not yet seen by a tick
    pending_contact: Option<Contact>,
    /// Local table row written for the current run
    run_entry: Option<HighScoreEntry>,
    /// Last referral credit count reported by the backend
    referral_credits: Option<u32>,
}

impl Runtime {
    /// Load persisted progress from `storage` and open a session
    pub fn new(
        tuning: Tuning,
        storage: Box<dyn Storage>,
        profile: PlayerProfile,
        seed: u64,
        backend: Option<BackendHandle>,
        audio: AudioManager,
    ) -> Self {
        let progress = PersistedProgress::load(storage.as_ref(), &tuning.level);
        let high_scores = HighScores::load(storage.as_ref());
        let session = Session::new(tuning, progress, profile, seed);
        Self {
            session,
            storage,
            backend,
            audio,
            high_scores,
            accumulator: 0.0,
            pending_contact: None,
            run_entry: None,
            referral_credits: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Commands go straight to the session; call [`Runtime::flush`] after
    /// commands issued outside [`Runtime::update`]
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn high_scores(&self) -> &HighScores {
        &self.high_scores
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn audio_mut(&mut self) -> &mut AudioManager {
        &mut self.audio
    }

    pub fn referral_credits(&self) -> Option<u32> {
        self.referral_credits
    }

    /// Run simulation ticks for a frame of `dt` seconds.
    ///
    /// `contact` is delivered to the next tick that runs, which may be in a
    /// later frame. Returns the number of ticks run.
    pub fn update(&mut self, dt: f32, contact: Option<Contact>) -> u32 {
        self.accumulator += dt.clamp(0.0, MAX_FRAME_DT);
        if contact.is_some() {
            self.pending_contact = contact;
        }

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            self.session.tick(SIM_DT, self.pending_contact.take());
            self.accumulator -= SIM_DT;
            substeps += 1;
            self.flush();
        }

        if substeps == MAX_SUBSTEPS && self.accumulator >= SIM_DT {
            // Drop the backlog instead of spiralling
            self.accumulator = 0.0;
        }

        self.poll_backend();
        substeps
    }

    /// Route every queued session event to its collaborator
    pub fn flush(&mut self) {
        for event in self.session.drain_events() {
            self.route(event);
        }
    }

    fn route(&mut self, event: SessionEvent) {
        let flying = self.session.state() == SessionState::Flying;
        match event {
            SessionEvent::PartPlaced(_) => self.audio.play(SoundEffect::PartPlaced),
            SessionEvent::PartRemoved(_) => self.audio.play(SoundEffect::PartRemoved),
            SessionEvent::StateChanged { from, to } => match (from, to) {
                (SessionState::Building, SessionState::Flying) => {
                    self.run_entry = None;
                    self.pending_contact = None;
                    self.audio.play(SoundEffect::Launch)
                }
                (_, SessionState::Building) | (_, SessionState::GameOver) => {
                    self.pending_contact = None;
                    self.audio.stop_ambient()
                }
                _ => {}
            },
            SessionEvent::Flapped => {
                if flying {
                    self.audio.play(SoundEffect::Flap);
                }
            }
            SessionEvent::StageChanged { stage } => {
                if flying {
                    if stage > 1 {
                        self.audio.play(SoundEffect::StageUp);
                    }
                    self.switch_ambient(stage);
                }
            }
            SessionEvent::EquipmentUnlocked(_) => self.audio.play(SoundEffect::Unlock),
            SessionEvent::Exploded(cause) => {
                log::info!("Exploded: {:?}", cause);
                self.audio.play(SoundEffect::Explosion);
            }
            SessionEvent::Revived(_) => {
                self.audio.play(SoundEffect::Revive);
                let stage = self.session.stage();
                self.switch_ambient(stage);
            }
            SessionEvent::GameOver {
                score,
                stage,
                new_high_score,
                replaces_earlier,
            } => {
                self.audio.play(if new_high_score {
                    SoundEffect::HighScore
                } else {
                    SoundEffect::GameOver
                });
                self.record_run(score, stage, replaces_earlier);
            }
            SessionEvent::PersistProgress(progress) => {
                if let Err(e) = progress.save(self.storage.as_mut()) {
                    log::warn!("Failed to save progress: {}", e);
                }
            }
            SessionEvent::SubmitScore { player, score } => match &self.backend {
                Some(backend) => backend.submit_score(&player, score),
                None => log::debug!("No backend, score {} kept local", score),
            },
            SessionEvent::ConsumeReferralCredit { player } => match &self.backend {
                Some(backend) => backend.consume_referral_credit(&player),
                None => log::debug!("No backend, referral credit not synced"),
            },
        }
    }

    /// One local table row per run; a revived run's later game over
    /// replaces the row written by its earlier one
    fn record_run(&mut self, score: i64, stage: u32, replaces_earlier: bool) {
        let mut changed = false;
        let earlier = self.run_entry.take();
        if replaces_earlier && let Some(entry) = earlier {
            changed = self.high_scores.remove(&entry);
        }

        let name = self.session.profile().player_name.clone();
        if let Some(rank) = self.high_scores.add_score(score, stage, name, unix_now()) {
            log::info!("Run ranked #{} locally", rank);
            self.run_entry = self.high_scores.entries.get(rank - 1).cloned();
            changed = true;
        }

        if changed && let Err(e) = self.high_scores.save(self.storage.as_mut()) {
            log::warn!("Failed to save high scores: {}", e);
        }
    }

    fn switch_ambient(&mut self, stage: u32) {
        if let Some(profile) = self.session.ambient_profile() {
            self.audio.switch_ambient(stage, profile);
        }
    }

    fn poll_backend(&mut self) {
        let Some(backend) = &self.backend else {
            return;
        };
        for message in backend.poll() {
            match message {
                BackendMessage::ScoreSubmitted { score } => log::debug!("Score {} submitted", score),
                BackendMessage::ReferralCreditConsumed { remaining } => {
                    self.referral_credits = Some(remaining);
                }
                BackendMessage::Failed(e) => log::warn!("Backend request dropped: {}", e),
            }
        }
    }

    /// Stop the backend worker after queued requests finish
    pub fn shutdown(&mut self) {
        self.session.finish_run();
        self.flush();
        if let Some(mut backend) = self.backend.take() {
            backend.shutdown();
        }
        self.audio.stop_ambient();
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
