//! Per-slot transport state machine.
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --play--> Playing
//! {Playing, Paused} --stop (after fade-out)--> Stopped
//! ```
//!
//! A session owns one engine resource exclusively, starts a fade-in on `play`,
//! defers the actual stop until its fade-out completes, and pauses instantly.

use std::sync::Arc;
use std::time::Duration;

use crate::audio_engine::clock::{SlotId, TransportSnapshot};
use crate::audio_engine::constants::{PAN_MAX, PAN_MIN, VOLUME_MAX};
use crate::audio_engine::engine::{
    EngineEvent, PlaybackEngine, PlayEpoch, ResourceHandle, SignalTap, TapHandle,
};
use crate::audio_engine::fade::{FadeCompletion, FadeController, FadeKind};
use crate::audio_engine::master_bus::MasterBus;
use crate::audio_engine::meter::{LevelMeter, LevelSample};
use crate::state::SlotSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceStatus {
    Loading,
    Ready,
    Failed,
}

/// Playback state of one slot.
pub struct PlaybackSession {
    slot_id: SlotId,
    handle: Option<ResourceHandle>,
    tap: Option<TapHandle>,
    status: ResourceStatus,
    state: TransportState,
    duration: Option<f64>,
    position: f64,
    volume: u8,
    pan: f32,
    looping: bool,
    /// Epoch of the last play command; ends reported for older runs are stale.
    play_epoch: Option<PlayEpoch>,
    /// Envelope gain committed by the last completed or cancelled ramp.
    gain: f32,
    fade: FadeController,
    fade_duration: Duration,
    meter: LevelMeter,
    master: Arc<MasterBus>,
}

impl PlaybackSession {
    /// Loads the slot's source into the engine and attaches a metering tap.
    ///
    /// A load that fails synchronously leaves the session stopped and inert; an
    /// asynchronous failure arrives later through [`handle_event`](Self::handle_event).
    pub fn new<E: PlaybackEngine + SignalTap + ?Sized>(
        spec: &SlotSpec,
        master: Arc<MasterBus>,
        fade_duration: Duration,
        engine: &mut E,
    ) -> Self {
        let spec = spec.clone().normalized();
        let mut session = Self {
            slot_id: spec.id.clone(),
            handle: None,
            tap: None,
            status: ResourceStatus::Failed,
            state: TransportState::Stopped,
            duration: None,
            position: 0.0,
            volume: spec.volume,
            pan: spec.pan,
            looping: spec.looping,
            play_epoch: None,
            gain: 0.0,
            fade: FadeController::new(),
            fade_duration,
            meter: LevelMeter::new(),
            master,
        };

        let Some(source) = spec.source_ref.as_deref() else {
            log::debug!("slot {} has no source, session stays inert", session.slot_id);
            return session;
        };

        match engine.load(source) {
            Ok(handle) => {
                engine.set_volume(handle, volume_scalar(session.volume));
                engine.set_pan(handle, session.pan);
                engine.set_loop(handle, session.looping);
                session.tap = engine.attach_tap(handle);
                session.handle = Some(handle);
                session.status = ResourceStatus::Loading;
            }
            Err(err) => {
                log::warn!("failed to load slot {}: {err}", session.slot_id);
            }
        }

        session
    }

    /// Starts or resumes playback with a fade-in.
    ///
    /// No-op until the resource is loaded, and while already playing. A pending
    /// stop is abandoned in favour of the new fade-in.
    pub fn play<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, now: Duration) {
        let Some(handle) = self.ready_handle() else {
            log::debug!("play ignored for slot {}: nothing loaded", self.slot_id);
            return;
        };

        if self.state == TransportState::Playing && !self.stop_pending() {
            return;
        }

        self.fade.cancel(engine, handle);
        engine.set_gain(handle, 0.0);
        self.gain = 0.0;
        self.play_epoch = Some(engine.play(handle));
        self.state = TransportState::Playing;

        if let Some(done) = self.fade.start(
            engine,
            handle,
            FadeKind::In,
            0.0,
            1.0,
            self.fade_duration,
            now,
        ) {
            self.finish_fade(engine, done);
        }
    }

    /// Suspends playback at once, without a fade.
    pub fn pause<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, now: Duration) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.state != TransportState::Playing {
            return;
        }

        if let Some(gain) = self.fade.gain_at(now) {
            self.gain = gain;
        }
        self.fade.cancel(engine, handle);
        engine.pause(handle);
        self.position = self.clamp_position(engine.playback_position(handle));
        self.state = TransportState::Paused;
    }

    /// Fades out from the current gain; the transition to `Stopped` happens when
    /// the fade completes. Calling it again while the fade-out runs is a no-op.
    pub fn stop<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, now: Duration) {
        let Some(handle) = self.handle else {
            return;
        };
        if self.state == TransportState::Stopped || self.stop_pending() {
            return;
        }

        let from = self.fade.gain_at(now).unwrap_or(self.gain);
        self.gain = from;
        if let Some(done) = self.fade.start(
            engine,
            handle,
            FadeKind::Out,
            from,
            0.0,
            self.fade_duration,
            now,
        ) {
            self.finish_fade(engine, done);
        }
    }

    /// Stops when playing, plays otherwise.
    pub fn toggle<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, now: Duration) {
        if self.state == TransportState::Playing && !self.stop_pending() {
            self.stop(engine, now);
        } else {
            self.play(engine, now);
        }
    }

    /// Moves the playhead to `seconds`, clamped to the clip. Legal in any state
    /// and never touches a running fade. Returns the applied position.
    pub fn seek<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, seconds: f64) -> f64 {
        let target = self.clamp_position(seconds);
        self.position = target;
        if let Some(handle) = self.handle {
            engine.seek(handle, target);
        }
        target
    }

    pub fn set_volume<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, volume: u8) {
        self.volume = volume.min(VOLUME_MAX);
        if let Some(handle) = self.handle {
            engine.set_volume(handle, volume_scalar(self.volume));
        }
    }

    pub fn set_pan<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, pan: f32) {
        self.pan = clamp_pan(pan);
        if let Some(handle) = self.handle {
            engine.set_pan(handle, self.pan);
        }
    }

    pub fn set_loop<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, looping: bool) {
        self.looping = looping;
        if let Some(handle) = self.handle {
            engine.set_loop(handle, looping);
        }
    }

    /// Length of future fades; a fade already running keeps its length.
    pub fn set_fade_duration(&mut self, fade_duration: Duration) {
        self.fade_duration = fade_duration;
    }

    /// Completes a fade whose time has run out.
    pub fn advance<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, now: Duration) {
        if let Some(done) = self.fade.poll(now) {
            self.finish_fade(engine, done);
        }
    }

    /// Applies an engine event addressed to this session's resource.
    pub fn handle_event<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, event: &EngineEvent) {
        let Some(handle) = self.handle else {
            return;
        };
        if event.handle() != handle {
            return;
        }

        match event {
            EngineEvent::MetadataReady { duration_sec, .. } => {
                if self.status != ResourceStatus::Loading {
                    return;
                }
                let duration = if duration_sec.is_finite() {
                    duration_sec.max(0.0)
                } else {
                    0.0
                };
                self.duration = Some(duration);
                self.status = ResourceStatus::Ready;
                self.position = self.clamp_position(self.position);
                log::info!("slot {} loaded ({duration:.2}s)", self.slot_id);
            }
            EngineEvent::LoadFailed { error, .. } => {
                log::warn!("failed to load slot {}: {error}", self.slot_id);
                self.fade.cancel(engine, handle);
                self.status = ResourceStatus::Failed;
                self.duration = None;
                self.state = TransportState::Stopped;
                self.position = 0.0;
            }
            EngineEvent::Ended { epoch, .. } => {
                if self.play_epoch != Some(*epoch) {
                    log::debug!("slot {}: ignoring end of an earlier run", self.slot_id);
                    return;
                }
                if self.looping || self.state == TransportState::Stopped {
                    return;
                }
                self.fade.cancel(engine, handle);
                engine.halt(handle);
                self.gain = 0.0;
                self.position = 0.0;
                self.state = TransportState::Stopped;
            }
        }
    }

    /// Current playhead, clamped to `[0, duration]`.
    pub fn position<E: PlaybackEngine + ?Sized>(&mut self, engine: &E) -> f64 {
        if self.state == TransportState::Playing
            && let Some(handle) = self.handle
        {
            self.position = self.clamp_position(engine.playback_position(handle));
        }
        self.position
    }

    pub fn sample_meter<E: SignalTap + ?Sized>(&mut self, engine: &mut E) -> LevelSample {
        let playing = self.state == TransportState::Playing;
        self.meter.sample(engine, self.tap, playing)
    }

    /// Position and levels for the transport clock, or `None` when not playing.
    pub fn snapshot<E: PlaybackEngine + SignalTap + ?Sized>(
        &mut self,
        engine: &mut E,
    ) -> Option<TransportSnapshot> {
        if self.state != TransportState::Playing {
            return None;
        }

        let position = self.position(engine);
        let levels = self.sample_meter(engine);
        Some(TransportSnapshot {
            slot_id: self.slot_id.clone(),
            position,
            rms_db: levels.rms_db,
            peak_db: levels.peak_db,
        })
    }

    /// Cancels the fade, detaches the tap and releases the resource.
    pub fn destroy<E: PlaybackEngine + SignalTap + ?Sized>(mut self, engine: &mut E) {
        if let Some(handle) = self.handle.take() {
            self.fade.cancel(engine, handle);
            if let Some(tap) = self.tap.take() {
                engine.detach_tap(tap);
            }
            engine.release(handle);
        }
        self.fade.clear();
        self.meter.reset();
    }

    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn handle(&self) -> Option<ResourceHandle> {
        self.handle
    }

    pub fn is_loaded(&self) -> bool {
        self.status == ResourceStatus::Ready
    }

    pub fn load_failed(&self) -> bool {
        self.status == ResourceStatus::Failed
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn fade_active(&self) -> bool {
        self.fade.is_active()
    }

    /// Whether a fade-out is running towards a stop.
    pub fn stop_pending(&self) -> bool {
        self.fade.kind() == Some(FadeKind::Out)
    }

    /// Fade envelope gain at `now`, in `[0, 1]`.
    pub fn envelope_gain(&self, now: Duration) -> f32 {
        self.fade.gain_at(now).unwrap_or(self.gain)
    }

    /// Master and slot volume combined, excluding the fade envelope.
    pub fn effective_gain(&self) -> f32 {
        self.master.effective_gain(self.volume)
    }

    fn ready_handle(&self) -> Option<ResourceHandle> {
        match self.status {
            ResourceStatus::Ready => self.handle,
            ResourceStatus::Loading | ResourceStatus::Failed => None,
        }
    }

    fn clamp_position(&self, seconds: f64) -> f64 {
        clamp_position(seconds, self.duration)
    }

    fn finish_fade<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, done: FadeCompletion) {
        self.gain = done.gain;
        if done.kind != FadeKind::Out {
            return;
        }

        if let Some(handle) = self.handle {
            engine.halt(handle);
        }
        self.position = 0.0;
        self.state = TransportState::Stopped;
    }
}

/// `clamp(seconds, 0, max(duration, 0))`; an unknown duration counts as zero.
pub fn clamp_position(seconds: f64, duration: Option<f64>) -> f64 {
    let max = duration.filter(|d| d.is_finite()).unwrap_or(0.0).max(0.0);
    if seconds.is_nan() {
        return 0.0;
    }
    seconds.clamp(0.0, max)
}

fn volume_scalar(volume: u8) -> f32 {
    f32::from(volume.min(VOLUME_MAX)) / f32::from(VOLUME_MAX)
}

fn clamp_pan(pan: f32) -> f32 {
    if pan.is_finite() {
        pan.clamp(PAN_MIN, PAN_MAX)
    } else {
        0.0
    }
}
