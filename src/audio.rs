//! Audio service interface
//!
//! Synthesis lives with the host. The core only says which cue to play and
//! which ambient profile matches the current stage.

use crate::tuning::AmbientProfile;

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Part placed on the grid
    PartPlaced,
    /// Part removed from the grid
    PartRemoved,
    /// Flight started
    Launch,
    /// Flap pressed
    Flap,
    /// New stage reached
    StageUp,
    /// Equipment unlocked
    Unlock,
    /// Vehicle blew up
    Explosion,
    /// Run continued after an explosion
    Revive,
    /// Game over
    GameOver,
    /// New high score
    HighScore,
}

/// Host-provided audio backend
pub trait AudioService {
    /// Play a one-shot cue at `gain` (0.0 - 1.0)
    fn play(&mut self, effect: SoundEffect, gain: f32);
    /// Switch the looping ambient track
    fn start_ambient(&mut self, stage: u32, profile: &AmbientProfile);
    fn stop_ambient(&mut self);
}

/// Silent backend
#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioService for NullAudio {
    fn play(&mut self, _effect: SoundEffect, _gain: f32) {}
    fn start_ambient(&mut self, _stage: u32, _profile: &AmbientProfile) {}
    fn stop_ambient(&mut self) {}
}

/// Volume and mute state in front of an [`AudioService`]
pub struct AudioManager {
    service: Box<dyn AudioService>,
    master_volume: f32,
    sfx_volume: f32,
    muted: bool,
    /// Stage whose ambient track is playing
    ambient_stage: Option<u32>,
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new(Box::new(NullAudio))
    }
}

impl AudioManager {
    pub fn new(service: Box<dyn AudioService>) -> Self {
        Self {
            service,
            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
            ambient_stage: None,
        }
    }

    /// Set master volume (0.0 - 1.0)
    pub fn set_master_volume(&mut self, vol: f32) {
        self.master_volume = vol.clamp(0.0, 1.0);
    }

    /// Set sound effects volume (0.0 - 1.0)
    pub fn set_sfx_volume(&mut self, vol: f32) {
        self.sfx_volume = vol.clamp(0.0, 1.0);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.stop_ambient();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn ambient_stage(&self) -> Option<u32> {
        self.ambient_stage
    }

    pub fn play(&mut self, effect: SoundEffect) {
        if self.muted {
            return;
        }
        let gain = self.master_volume * self.sfx_volume;
        if gain > 0.0 {
            self.service.play(effect, gain);
        }
    }

    /// Start the ambient track for `stage` unless it is already playing
    pub fn switch_ambient(&mut self, stage: u32, profile: &AmbientProfile) {
        if self.muted || self.ambient_stage == Some(stage) {
            return;
        }
        self.service.start_ambient(stage, profile);
        self.ambient_stage = Some(stage);
    }

    pub fn stop_ambient(&mut self) {
        if self.ambient_stage.take().is_some() {
            self.service.stop_ambient();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::ThemeTables;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl AudioService for Log {
        fn play(&mut self, effect: SoundEffect, _gain: f32) {
            self.0.lock().unwrap().push(format!("{:?}", effect));
        }
        fn start_ambient(&mut self, stage: u32, _profile: &AmbientProfile) {
            self.0.lock().unwrap().push(format!("ambient {}", stage));
        }
        fn stop_ambient(&mut self) {
            self.0.lock().unwrap().push("stop".into());
        }
    }

    #[test]
    fn test_mute_silences_cues() {
        let log = Log::default();
        let mut audio = AudioManager::new(Box::new(log.clone()));
        audio.play(SoundEffect::Flap);
        audio.set_muted(true);
        audio.play(SoundEffect::Flap);
        assert_eq!(*log.0.lock().unwrap(), vec!["Flap".to_string()]);
    }

    #[test]
    fn test_ambient_switches_once_per_stage() {
        let themes = ThemeTables::default();
        let log = Log::default();
        let mut audio = AudioManager::new(Box::new(log.clone()));
        audio.switch_ambient(1, &themes.ambient[0]);
        audio.switch_ambient(1, &themes.ambient[0]);
        audio.switch_ambient(2, &themes.ambient[1]);
        audio.stop_ambient();
        audio.stop_ambient();
        assert_eq!(
            *log.0.lock().unwrap(),
            vec!["ambient 1", "ambient 2", "stop"]
        );
        assert_eq!(audio.ambient_stage(), None);
    }
}
