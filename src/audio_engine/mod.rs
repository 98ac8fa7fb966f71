//! Audio Engine Module
//!
//! This module provides per-slot playback with fades and level metering.
//! It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`audio_stream`]: CPAL audio stream management and real-time callback
//! - [`backend`]: the cpal-backed [`PlaybackEngine`](engine::PlaybackEngine)
//! - [`clock`]: refresh-driven transport clock and time sources
//! - [`constants`]: Configuration constants and limits
//! - [`deck`]: every live slot session behind one entry point
//! - [`engine`]: contracts between the transport core and a backend
//! - [`errors`]: Audio-specific error types
//! - [`fade`]: one linear gain ramp per slot
//! - [`master_bus`]: master volume and mute
//! - [`meter`]: RMS/peak metering over a signal tap
//! - [`mixer`]: Real-time mixing engine
//! - [`resample`]: sample-rate conversion of decoded clips
//! - [`sample_loader`]: Audio file loading and decoding
//! - [`session`]: one slot's transport state machine
//! - [`voice`]: Voice state on the audio thread
//!
//! The [`Soundboard`] struct ties these to the persisted application state and
//! exposes them to Python.

use crate::audio_engine::audio_stream::{
    AudioStreamHandle, create_audio_stream, setup_logger, start_stream,
};
use crate::audio_engine::backend::CpalEngine;
use crate::audio_engine::clock::{MonotonicTime, SlotId, TransportSnapshot};
use crate::audio_engine::constants::{PAN_MAX, PAN_MIN, VOLUME_MAX, VOLUME_MIN};
use crate::audio_engine::deck::Deck;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::master_bus::MasterBus;
use crate::persist::{FileStore, MemoryStore, StateStore};
use crate::state::{AppState, PadSize, SlotSpec};
use crate::upload::UploadFile;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    mpsc::{Receiver, Sender},
};

pub mod audio_stream;
pub mod backend;
pub mod channels;
pub mod clock;
pub mod constants;
pub mod deck;
pub mod engine;
pub mod errors;
pub mod fade;
pub mod master_bus;
pub mod meter;
pub mod mixer;
pub mod resample;
pub mod sample_loader;
pub mod session;
pub mod voice;

#[cfg(test)]
mod testing;

fn check_volume(volume: i64) -> PyResult<u8> {
    u8::try_from(volume)
        .ok()
        .filter(|v| (VOLUME_MIN..=VOLUME_MAX).contains(v))
        .ok_or_else(|| PyValueError::new_err("volume out of range"))
}

fn check_pan(pan: f32) -> PyResult<f32> {
    if !pan.is_finite() || !(PAN_MIN..=PAN_MAX).contains(&pan) {
        return Err(PyValueError::new_err("pan out of range"));
    }
    Ok(pan)
}

fn lock_error() -> PyErr {
    PyRuntimeError::new_err("Failed to acquire deck lock")
}

/// Soundboard provides slot playback over the default audio device using cpal
#[pyclass]
pub struct Soundboard {
    stream_handle: Option<AudioStreamHandle>,
    deck: Mutex<Option<Deck<CpalEngine>>>,
    master: Arc<MasterBus>,
    state: AppState,
    store: Box<dyn StateStore + Send + Sync>,
    snapshot_tx: Sender<TransportSnapshot>,
    snapshot_rx: Mutex<Receiver<TransportSnapshot>>,
}

#[pymethods]
impl Soundboard {
    /// Create a new Soundboard, restoring the saved state.
    ///
    /// `state_dir` overrides the platform data directory.
    #[new]
    #[pyo3(signature = (state_dir=None))]
    pub fn new(state_dir: Option<PathBuf>) -> PyResult<Self> {
        setup_logger();

        let store: Box<dyn StateStore + Send + Sync> = match state_dir {
            Some(dir) => Box::new(FileStore::in_dir(dir)),
            None => match FileStore::in_app_data() {
                Ok(store) => Box::new(store),
                Err(err) => {
                    log::warn!("{err}; state is kept in memory only");
                    Box::new(MemoryStore::new())
                }
            },
        };
        let state = store.load().unwrap_or_default();
        let master = Arc::new(MasterBus::new(state.master_volume, state.muted));
        let (snapshot_tx, snapshot_rx) = std::sync::mpsc::channel();

        Ok(Soundboard {
            stream_handle: None,
            deck: Mutex::new(None),
            master,
            state,
            store,
            snapshot_tx,
            snapshot_rx: Mutex::new(snapshot_rx),
        })
    }

    /// Open the output stream and load the active playlist.
    pub fn run(&mut self) -> PyResult<()> {
        if self.stream_handle.is_some() {
            return Err(PyRuntimeError::new_err("Soundboard already running"));
        }

        let handle = match create_audio_stream(self.master.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                return Err(PyRuntimeError::new_err(format!(
                    "Failed to create audio stream: {e}"
                )));
            }
        };
        start_stream(&handle.stream)
            .map_err(|e| PyRuntimeError::new_err(format!("Failed to start audio stream: {e}")))?;

        let mut deck = Deck::new(
            CpalEngine::for_stream(&handle),
            self.master.clone(),
            self.state.settings.clone(),
            Box::new(MonotonicTime::new()),
        );
        let snapshot_tx = self.snapshot_tx.clone();
        deck.subscribe(Box::new(move |snapshot| {
            let _ = snapshot_tx.send(snapshot.clone());
        }));
        if let Some(playlist) = self.state.active_playlist() {
            deck.sync_playlist(playlist);
        }

        *self.deck.lock().map_err(|_| lock_error())? = Some(deck);
        self.stream_handle = Some(handle);
        Ok(())
    }

    /// Tear down every slot and close the output stream.
    pub fn shut_down(&mut self) -> PyResult<()> {
        if let Some(mut deck) = self.deck.lock().map_err(|_| lock_error())?.take() {
            deck.shutdown();
        }
        self.stream_handle = None;
        log::info!("Soundboard stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.stream_handle.is_some()
    }

    /// Advance fades and events; call once per display refresh.
    ///
    /// Returns one dict per playing slot with `slot_id`, `position`,
    /// `rms_db` and `peak_db`.
    pub fn tick(&mut self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let pending: Vec<SlotId> = self
            .state
            .active_playlist()
            .map(|playlist| {
                playlist
                    .slots
                    .iter()
                    .filter(|slot| slot.has_source() && slot.duration.is_none())
                    .map(|slot| slot.id.clone())
                    .collect()
            })
            .unwrap_or_default();

        let resolved: Vec<(SlotId, f64)> = self.with_deck(|deck| {
            deck.tick();
            pending
                .into_iter()
                .filter_map(|id| deck.duration(&id).map(|duration| (id, duration)))
                .collect()
        })?;

        if !resolved.is_empty() {
            for (slot_id, duration) in resolved {
                self.edit_slot(&slot_id, |slot| slot.duration = Some(duration));
            }
            self.persist();
        }

        let list = PyList::empty(py);
        let snapshot_rx = self
            .snapshot_rx
            .lock()
            .map_err(|_| PyRuntimeError::new_err("Failed to acquire snapshot receiver lock"))?;
        while let Ok(snapshot) = snapshot_rx.try_recv() {
            let dict = PyDict::new(py);
            dict.set_item("slot_id", snapshot.slot_id)?;
            dict.set_item("position", snapshot.position)?;
            dict.set_item("rms_db", snapshot.rms_db)?;
            dict.set_item("peak_db", snapshot.peak_db)?;
            list.append(dict)?;
        }

        Ok(list.into_any().unbind())
    }

    pub fn play(&self, slot_id: &str) -> PyResult<bool> {
        self.with_deck(|deck| deck.play(slot_id))
    }

    pub fn pause(&self, slot_id: &str) -> PyResult<bool> {
        self.with_deck(|deck| deck.pause(slot_id))
    }

    /// Fade out, then rewind to the start.
    pub fn stop(&self, slot_id: &str) -> PyResult<bool> {
        self.with_deck(|deck| deck.stop(slot_id))
    }

    pub fn toggle(&self, slot_id: &str) -> PyResult<bool> {
        self.with_deck(|deck| deck.toggle(slot_id))
    }

    /// Toggle the active playlist's slot at `index` (keys 1-6 map to 0-5).
    pub fn toggle_index(&self, index: usize) -> PyResult<bool> {
        let Some(slot_id) = self.active_slot_id(index) else {
            return Ok(false);
        };
        self.with_deck(|deck| deck.toggle(&slot_id))
    }

    /// Toggle the slot toggled last, or the first slot if none was yet.
    pub fn toggle_last(&self) -> PyResult<bool> {
        let Some(first) = self.active_slot_id(0) else {
            return Ok(false);
        };
        self.with_deck(|deck| deck.toggle_last(&first))
    }

    /// Seek within the clip; returns the clamped position.
    pub fn seek(&self, slot_id: &str, seconds: f64) -> PyResult<Option<f64>> {
        self.with_deck(|deck| deck.seek(slot_id, seconds))
    }

    /// `"stopped"`, `"playing"` or `"paused"`; `None` for an empty slot.
    pub fn slot_state(&self, slot_id: &str) -> PyResult<Option<&'static str>> {
        self.with_deck(|deck| deck.state(slot_id).map(|state| state.as_str()))
    }

    pub fn slot_position(&self, slot_id: &str) -> PyResult<Option<f64>> {
        self.with_deck(|deck| deck.position(slot_id))
    }

    pub fn slot_duration(&self, slot_id: &str) -> PyResult<Option<f64>> {
        self.with_deck(|deck| deck.duration(slot_id))
    }

    /// Set a slot's volume (0 to 100).
    pub fn set_volume(&mut self, slot_id: &str, volume: i64) -> PyResult<bool> {
        let volume = check_volume(volume)?;
        self.if_running(|deck| deck.set_volume(slot_id, volume))?;
        Ok(self.update_slot(slot_id, |slot| slot.volume = volume))
    }

    /// Set a slot's balance (-1.0 left to 1.0 right).
    pub fn set_pan(&mut self, slot_id: &str, pan: f32) -> PyResult<bool> {
        let pan = check_pan(pan)?;
        self.if_running(|deck| deck.set_pan(slot_id, pan))?;
        Ok(self.update_slot(slot_id, |slot| slot.pan = pan))
    }

    pub fn set_loop(&mut self, slot_id: &str, looping: bool) -> PyResult<bool> {
        self.if_running(|deck| deck.set_loop(slot_id, looping))?;
        Ok(self.update_slot(slot_id, |slot| slot.looping = looping))
    }

    /// Assign a file to a slot of the active playlist.
    ///
    /// Files that are neither MP3 nor WAV are ignored and `False` is returned.
    pub fn upload(
        &mut self,
        slot_id: &str,
        file_name: &str,
        media_type: &str,
        source: &str,
    ) -> PyResult<bool> {
        let file = UploadFile {
            name: file_name.to_string(),
            media_type: media_type.to_string(),
        };
        let Some(slot) = self.state.apply_upload(slot_id, &file, source) else {
            return Ok(false);
        };
        self.if_running(|deck| deck.load_slot(&slot))?;
        self.persist();
        Ok(true)
    }

    /// Set the master volume (0 to 100).
    pub fn set_master_volume(&mut self, volume: i64) -> PyResult<()> {
        let volume = check_volume(volume)?;
        self.master.set_master_volume(volume);
        self.state.set_master_volume(volume);
        self.persist();
        Ok(())
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.master.set_muted(muted);
        self.state.muted = muted;
        self.persist();
    }

    /// Set the fade length; returns the value after clamping to 200..=500 ms.
    pub fn set_fade_ms(&mut self, fade_ms: u32) -> PyResult<u32> {
        self.state.settings.set_fade_ms(fade_ms);
        let fade_ms = self.state.settings.fade_ms;
        self.if_running(|deck| deck.set_fade_ms(fade_ms))?;
        self.persist();
        Ok(fade_ms)
    }

    pub fn set_pad_size(&mut self, pad_size: &str) -> PyResult<()> {
        let pad_size = PadSize::from_name(pad_size)
            .ok_or_else(|| PyValueError::new_err(format!("unknown pad size: {pad_size}")))?;
        self.state.settings.pad_size = pad_size;
        self.persist();
        Ok(())
    }

    pub fn set_show_art_icon(&mut self, show: bool) {
        self.state.settings.show_art_icon = show;
        self.persist();
    }

    /// Add a playlist and switch to it. Returns `None` at the playlist limit.
    pub fn create_playlist(&mut self) -> PyResult<Option<String>> {
        let Some(id) = self.state.create_playlist() else {
            return Ok(None);
        };
        self.sync_deck()?;
        self.persist();
        Ok(Some(id))
    }

    pub fn rename_playlist(&mut self, playlist_id: &str, name: &str) -> bool {
        let renamed = self.state.rename_playlist(playlist_id, name);
        if renamed {
            self.persist();
        }
        renamed
    }

    pub fn delete_playlist(&mut self, playlist_id: &str) -> PyResult<bool> {
        if !self.state.delete_playlist(playlist_id) {
            return Ok(false);
        }
        self.sync_deck()?;
        self.persist();
        Ok(true)
    }

    pub fn select_playlist(&mut self, playlist_id: &str) -> PyResult<bool> {
        if !self.state.select_playlist(playlist_id) {
            return Ok(false);
        }
        self.sync_deck()?;
        self.persist();
        Ok(true)
    }

    /// Forget every playlist and setting.
    pub fn reset(&mut self) -> PyResult<()> {
        self.state.reset();
        self.master.set_master_volume(self.state.master_volume);
        self.master.set_muted(self.state.muted);
        let fade_ms = self.state.settings.fade_ms;
        self.if_running(|deck| deck.set_fade_ms(fade_ms))?;
        self.sync_deck()?;
        self.persist();
        Ok(())
    }

    /// The application state as JSON, in the saved-file layout.
    pub fn state_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.state)
            .map_err(|e| PyRuntimeError::new_err(format!("Failed to serialize state: {e}")))
    }
}

impl Soundboard {
    fn with_deck<T>(&self, f: impl FnOnce(&mut Deck<CpalEngine>) -> T) -> PyResult<T> {
        let mut guard = self.deck.lock().map_err(|_| lock_error())?;
        let deck = guard
            .as_mut()
            .ok_or_else(|| PyRuntimeError::new_err(EngineError::NotRunning.to_string()))?;
        Ok(f(deck))
    }

    /// Like [`with_deck`](Self::with_deck), but a stopped soundboard is not
    /// an error.
    fn if_running<T>(&self, f: impl FnOnce(&mut Deck<CpalEngine>) -> T) -> PyResult<Option<T>> {
        let mut guard = self.deck.lock().map_err(|_| lock_error())?;
        Ok(guard.as_mut().map(f))
    }

    fn active_slot_id(&self, index: usize) -> Option<SlotId> {
        self.state
            .active_playlist()?
            .slots
            .get(index)
            .map(|slot| slot.id.clone())
    }

    /// Points the deck at the active playlist.
    fn sync_deck(&self) -> PyResult<()> {
        let Some(playlist) = self.state.active_playlist() else {
            return Ok(());
        };
        self.if_running(|deck| deck.sync_playlist(playlist))?;
        Ok(())
    }

    fn edit_slot(&mut self, slot_id: &str, f: impl FnOnce(&mut SlotSpec)) -> bool {
        let Some(mut slot) = self
            .state
            .active_playlist()
            .and_then(|playlist| playlist.slot(slot_id))
            .cloned()
        else {
            log::debug!("no slot {slot_id} in the active playlist");
            return false;
        };
        f(&mut slot);
        self.state.update_slot(slot)
    }

    fn update_slot(&mut self, slot_id: &str, f: impl FnOnce(&mut SlotSpec)) -> bool {
        let updated = self.edit_slot(slot_id, f);
        if updated {
            self.persist();
        }
        updated
    }

    fn persist(&self) {
        self.store.save(&self.state);
    }
}
