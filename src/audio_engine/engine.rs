//! Contracts between the transport core and a playback backend.
//!
//! The core never decodes or renders audio itself. A [`PlaybackEngine`] owns the
//! decoded clips and their gain graph, a [`SignalTap`] exposes a read-only view of
//! each clip's post-gain signal for metering. The real backend is
//! [`CpalEngine`](crate::audio_engine::backend::CpalEngine); tests use a fake.

use std::time::Duration;

use crate::audio_engine::constants::METER_WINDOW;
use crate::audio_engine::errors::{EngineError, TapReadError};

/// Handle to one clip resident in the engine.
///
/// `index` addresses a fixed voice slot, `generation` is bumped every time that
/// slot is reused so commands aimed at a released clip are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub index: usize,
    pub generation: u32,
}

/// Handle to an attached metering tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TapHandle(pub ResourceHandle);

/// Identifies one gain ramp issued to the engine, so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RampId(pub u64);

/// Counts play commands issued to the engine. An [`EngineEvent::Ended`] carries
/// the epoch of the run that ended, so an end queued before a later play can be
/// recognised as stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayEpoch(pub u64);

/// Asynchronous notifications from the engine, delivered through
/// [`PlaybackEngine::poll_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The clip finished loading; fires once per loaded source.
    MetadataReady {
        handle: ResourceHandle,
        duration_sec: f64,
    },

    /// The clip could not be loaded.
    LoadFailed {
        handle: ResourceHandle,
        error: String,
    },

    /// A non-looping clip reached its natural end during the run started by
    /// the play command of `epoch`.
    Ended {
        handle: ResourceHandle,
        epoch: PlayEpoch,
    },
}

impl EngineEvent {
    pub fn handle(&self) -> ResourceHandle {
        match self {
            EngineEvent::MetadataReady { handle, .. }
            | EngineEvent::LoadFailed { handle, .. }
            | EngineEvent::Ended { handle, .. } => *handle,
        }
    }
}

/// Playback operations the transport core relies on.
pub trait PlaybackEngine {
    /// Starts loading `source`. Metadata arrives later as
    /// [`EngineEvent::MetadataReady`] or [`EngineEvent::LoadFailed`].
    fn load(&mut self, source: &str) -> Result<ResourceHandle, EngineError>;

    /// Releases the clip and every resource attached to it.
    fn release(&mut self, handle: ResourceHandle);

    /// Starts or resumes playback from the current position. Returns the epoch
    /// that a later [`EngineEvent::Ended`] for this run will carry.
    fn play(&mut self, handle: ResourceHandle) -> PlayEpoch;

    /// Suspends playback, keeping the position.
    fn pause(&mut self, handle: ResourceHandle);

    /// Stops playback and rewinds to the start.
    fn halt(&mut self, handle: ResourceHandle);

    /// Sets the slot volume stage (linear, 0.0 to 1.0).
    fn set_volume(&mut self, handle: ResourceHandle, volume: f32);

    /// Sets the stereo position (-1.0 left to 1.0 right).
    fn set_pan(&mut self, handle: ResourceHandle, pan: f32);

    fn set_loop(&mut self, handle: ResourceHandle, looping: bool);

    /// Sets the fade envelope stage immediately, dropping any running ramp.
    fn set_gain(&mut self, handle: ResourceHandle, gain: f32);

    /// Current playback position in seconds.
    fn playback_position(&self, handle: ResourceHandle) -> f64;

    fn seek(&mut self, handle: ResourceHandle, seconds: f64);

    /// Ramps the fade envelope stage linearly from `from` to `to`.
    fn fade(&mut self, handle: ResourceHandle, from: f32, to: f32, duration: Duration) -> RampId;

    /// Cancels `ramp` if it is still running, freezing the envelope where it is.
    fn cancel_fade(&mut self, handle: ResourceHandle, ramp: RampId);

    /// Returns the next pending event, if any.
    fn poll_event(&mut self) -> Option<EngineEvent>;
}

/// Read-only access to a clip's post-gain signal.
pub trait SignalTap {
    fn attach_tap(&mut self, handle: ResourceHandle) -> Option<TapHandle>;

    fn detach_tap(&mut self, tap: TapHandle);

    /// Copies the most recent [`METER_WINDOW`] samples into `buffer`, oldest first.
    fn read_time_domain(
        &mut self,
        tap: TapHandle,
        buffer: &mut [f32; METER_WINDOW],
    ) -> Result<(), TapReadError>;
}
