//! Persisted player progress
//!
//! Features:
//! - `Storage` collaborator trait (key → JSON text), memory and file backends
//! - Atomic file writes (tmp → rename)
//! - Corrupt or missing data falls back to defaults with a warning

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sim::part::UnlockedEquipment;
use crate::tuning::LevelTuning;

/// Storage key for stage progress and unlocked equipment
pub const PROGRESS_KEY: &str = "skytinker-progress";
/// Storage key for the best score (plain integer text)
pub const HIGH_SCORE_KEY: &str = "flappy-vehicle-highscore";
/// Storage key for the local best-run table
pub const HIGH_SCORES_KEY: &str = "skytinker-highscores";

/// Storage failure
#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    Serialize(serde_json::Error),
    /// Key not usable by this backend
    InvalidKey(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage I/O error: {}", e),
            StorageError::Serialize(e) => write!(f, "failed to encode value: {}", e),
            StorageError::InvalidKey(key) => write!(f, "invalid storage key `{}`", key),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Key/value text store supplied by the host
pub trait Storage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory store (tests, headless runs)
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl Storage for JsonFileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Progress that survives across runs and restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProgress {
    pub highest_stage: u32,
    pub unlocked_equipment: UnlockedEquipment,
    /// Stored under its own key
    #[serde(skip)]
    pub high_score: i64,
}

impl PersistedProgress {
    /// Fresh progress: stage 1, base equipment, no high score
    pub fn new(level: &LevelTuning) -> Self {
        Self {
            highest_stage: 1,
            unlocked_equipment: UnlockedEquipment::from_items(level.base_equipment()),
            high_score: 0,
        }
    }

    /// Load from storage.
    ///
    /// Missing or malformed entries fall back to defaults. Base equipment is
    /// always present in the result.
    pub fn load(storage: &dyn Storage, level: &LevelTuning) -> Self {
        let mut progress = match storage.read(PROGRESS_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<PersistedProgress>(&json) {
                Ok(progress) => {
                    log::info!(
                        "Loaded progress: stage {}, {} items unlocked",
                        progress.highest_stage,
                        progress.unlocked_equipment.len()
                    );
                    progress
                }
                Err(e) => {
                    log::warn!("Malformed progress data, using defaults ({})", e);
                    Self::new(level)
                }
            },
            Ok(None) => {
                log::info!("No saved progress, starting fresh");
                Self::new(level)
            }
            Err(e) => {
                log::warn!("Could not read progress, using defaults ({})", e);
                Self::new(level)
            }
        };

        progress.highest_stage = progress.highest_stage.max(1);
        for key in level.base_equipment() {
            progress.unlocked_equipment.unlock(key);
        }
        progress.high_score = load_high_score(storage);
        progress
    }

    /// Write progress and high score
    pub fn save(&self, storage: &mut dyn Storage) -> Result<(), StorageError> {
        let json = serde_json::to_string(self).map_err(StorageError::Serialize)?;
        storage.write(PROGRESS_KEY, &json)?;
        storage.write(HIGH_SCORE_KEY, &self.high_score.to_string())?;
        Ok(())
    }
}

fn load_high_score(storage: &dyn Storage) -> i64 {
    match storage.read(HIGH_SCORE_KEY) {
        Ok(Some(text)) => text.trim().parse().unwrap_or_else(|_| {
            log::warn!("Malformed high score `{}`, resetting to 0", text.trim());
            0
        }),
        Ok(None) => 0,
        Err(e) => {
            log::warn!("Could not read high score ({})", e);
            0
        }
    }
}
