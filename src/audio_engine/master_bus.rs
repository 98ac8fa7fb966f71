//! Master volume and mute, shared by every session and the audio thread.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::audio_engine::constants::VOLUME_MAX;

/// Single-writer, many-reader master stage.
///
/// The UI layer writes it; sessions and the real-time mixer read it. Writes use
/// release ordering and reads acquire, so the next tick or audio callback always
/// sees the latest committed value.
#[derive(Debug)]
pub struct MasterBus {
    master_volume: AtomicU8,
    muted: AtomicBool,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self::new(VOLUME_MAX, false)
    }
}

impl MasterBus {
    pub fn new(master_volume: u8, muted: bool) -> Self {
        Self {
            master_volume: AtomicU8::new(master_volume.min(VOLUME_MAX)),
            muted: AtomicBool::new(muted),
        }
    }

    pub fn master_volume(&self) -> u8 {
        self.master_volume.load(Ordering::Acquire)
    }

    /// Sets the master volume, clamped to 0..=100.
    pub fn set_master_volume(&self, volume: u8) {
        self.master_volume
            .store(volume.min(VOLUME_MAX), Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Master multiplier applied at the final mix stage.
    pub fn gain(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            f32::from(self.master_volume()) / f32::from(VOLUME_MAX)
        }
    }

    /// Final multiplier for a slot at `volume` (0..=100), ignoring its fade.
    pub fn effective_gain(&self, volume: u8) -> f32 {
        self.gain() * f32::from(volume.min(VOLUME_MAX)) / f32::from(VOLUME_MAX)
    }
}
