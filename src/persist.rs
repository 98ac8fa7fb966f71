//! Best-effort persistence of [`AppState`].
//!
//! Stores never fail loudly: a missing or unreadable state loads as `None`
//! and a failed write is logged and dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::state::AppState;

/// Key under which the in-memory store keeps the serialized state.
pub const STATE_KEY: &str = "audiodeck_free_v1";
pub const STATE_FILE_NAME: &str = "state.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no application data directory available")]
    NoDataDir,

    #[error("state store lock poisoned")]
    LockPoisoned,
}

pub trait StateStore {
    /// Loads the saved state, or `None` when nothing usable is stored.
    fn load(&self) -> Option<AppState>;

    /// Saves the state. Failures are logged and swallowed.
    fn save(&self, state: &AppState);
}

/// Process-local key/value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw serialized value under [`STATE_KEY`].
    pub fn raw(&self) -> Option<String> {
        self.entries.lock().ok()?.get(STATE_KEY).cloned()
    }

    pub fn set_raw(&self, raw: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(STATE_KEY.to_string(), raw.into());
        }
    }

    fn try_save(&self, state: &AppState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)?;
        self.entries
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(STATE_KEY.to_string(), raw);
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Option<AppState> {
        let raw = self.raw()?;
        parse_state(&raw)
    }

    fn save(&self, state: &AppState) {
        if let Err(err) = self.try_save(state) {
            log::warn!("failed to save state: {err}");
        }
    }
}

/// `state.json` inside the application data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store in the platform data directory for `AudioDeck`.
    pub fn in_app_data() -> Result<Self, StoreError> {
        Ok(Self::in_dir(app_data_dir().ok_or(StoreError::NoDataDir)?))
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_load(&self) -> Result<Option<AppState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let state: AppState = serde_json::from_str(&raw)?;
        Ok(Some(state.normalized()))
    }

    fn try_save(&self, state: &AppState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let raw = serde_json::to_string(state)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Option<AppState> {
        match self.try_load() {
            Ok(state) => state,
            Err(err) => {
                log::warn!("ignoring saved state at {}: {err}", self.path.display());
                None
            }
        }
    }

    fn save(&self, state: &AppState) {
        if let Err(err) = self.try_save(state) {
            log::warn!("failed to write {}: {err}", self.path.display());
        }
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "audiodeck", "AudioDeck")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Parses a serialized state, logging and discarding anything malformed.
pub fn parse_state(raw: &str) -> Option<AppState> {
    match serde_json::from_str::<AppState>(raw) {
        Ok(state) => Some(state.normalized()),
        Err(err) => {
            log::warn!("ignoring malformed state: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> AppState {
        let mut state = AppState::default();
        state.set_master_volume(40);
        state.muted = true;
        state.rename_playlist("pl-1", "Show");
        state
    }

    #[test]
    fn test_memory_store_empty_loads_none() {
        let store = MemoryStore::new();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_memory_store_saves_under_key() {
        let store = MemoryStore::new();
        store.save(&sample_state());

        assert!(store.raw().unwrap().contains("\"masterVolume\":40"));
        assert_eq!(store.load(), Some(sample_state()));
    }

    #[test]
    fn test_memory_store_ignores_garbage() {
        let store = MemoryStore::new();
        store.set_raw("{not json");
        assert!(store.load().is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_dir(dir.path().join("AudioDeck"));

        assert!(store.load().is_none());
        store.save(&sample_state());
        assert!(store.path().exists());
        assert_eq!(store.load(), Some(sample_state()));
    }

    #[test]
    fn test_file_store_swallows_corrupt_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        std::fs::write(store.path(), b"\x00\x01").unwrap();

        assert!(store.load().is_none());
    }

    #[test]
    fn test_file_store_swallows_write_failure() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file, not dir").unwrap();

        let store = FileStore::in_dir(&blocker);
        store.save(&sample_state());
        assert!(store.load().is_none());
    }
}
