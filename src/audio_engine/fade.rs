//! Time-bounded linear gain ramps.
//!
//! A [`FadeController`] tracks the single ramp a session may have in flight. The
//! engine renders the ramp sample-accurately; the controller keeps the same
//! timeline on the UI thread so it knows the current gain and when the ramp
//! is over.

use std::time::Duration;

use crate::audio_engine::engine::{PlaybackEngine, RampId, ResourceHandle};

/// Why a ramp was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeKind {
    /// Ramp up after `play()`.
    In,
    /// Ramp down before a pending stop.
    Out,
}

/// A ramp that reached its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeCompletion {
    pub kind: FadeKind,
    /// Envelope gain the ramp ended on.
    pub gain: f32,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRamp {
    id: RampId,
    kind: FadeKind,
    from: f32,
    to: f32,
    started_at: Duration,
    duration: Duration,
}

impl ActiveRamp {
    fn progress(&self, now: Duration) -> f32 {
        let elapsed = now.saturating_sub(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    fn is_finished(&self, now: Duration) -> bool {
        now >= self.started_at + self.duration
    }
}

/// Holds at most one in-flight ramp for a session.
#[derive(Debug, Default)]
pub struct FadeController {
    active: Option<ActiveRamp>,
}

impl FadeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a ramp, cancelling any ramp already in flight.
    ///
    /// A zero `duration` applies `to` at once and returns the completion
    /// synchronously; otherwise returns `None` and the completion is reported
    /// later by [`poll`](Self::poll).
    #[allow(clippy::too_many_arguments)]
    pub fn start<E: PlaybackEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        handle: ResourceHandle,
        kind: FadeKind,
        from: f32,
        to: f32,
        duration: Duration,
        now: Duration,
    ) -> Option<FadeCompletion> {
        self.cancel(engine, handle);

        let from = clamp_gain(from);
        let to = clamp_gain(to);

        if duration.is_zero() {
            engine.set_gain(handle, to);
            return Some(FadeCompletion { kind, gain: to });
        }

        let id = engine.fade(handle, from, to, duration);
        self.active = Some(ActiveRamp {
            id,
            kind,
            from,
            to,
            started_at: now,
            duration,
        });
        None
    }

    /// Cancels the in-flight ramp, if any. The engine keeps whatever gain the
    /// ramp had reached.
    pub fn cancel<E: PlaybackEngine + ?Sized>(&mut self, engine: &mut E, handle: ResourceHandle) {
        if let Some(ramp) = self.active.take() {
            engine.cancel_fade(handle, ramp.id);
        }
    }

    /// Forgets the in-flight ramp without talking to the engine, used when the
    /// engine side is being torn down anyway.
    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Reports the ramp as complete once its duration has elapsed.
    pub fn poll(&mut self, now: Duration) -> Option<FadeCompletion> {
        let ramp = self.active?;
        if !ramp.is_finished(now) {
            return None;
        }

        self.active = None;
        Some(FadeCompletion {
            kind: ramp.kind,
            gain: ramp.to,
        })
    }

    /// Interpolated envelope gain at `now`, or `None` when idle.
    pub fn gain_at(&self, now: Duration) -> Option<f32> {
        self.active
            .map(|ramp| ramp.from + (ramp.to - ramp.from) * ramp.progress(now))
    }

    pub fn kind(&self) -> Option<FadeKind> {
        self.active.map(|ramp| ramp.kind)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn ramp_id(&self) -> Option<RampId> {
        self.active.map(|ramp| ramp.id)
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::testing::FakeEngine;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_zero_duration_completes_synchronously() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(10.0);
        let mut fade = FadeController::new();

        let done = fade.start(&mut engine, handle, FadeKind::Out, 0.8, 0.0, Duration::ZERO, ms(0));

        assert_eq!(
            done,
            Some(FadeCompletion {
                kind: FadeKind::Out,
                gain: 0.0
            })
        );
        assert!(!fade.is_active());
        assert_eq!(engine.gain(handle), 0.0);
        assert!(engine.fades.is_empty());
    }

    #[test]
    fn test_ramp_interpolates_and_completes() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(10.0);
        let mut fade = FadeController::new();

        assert!(
            fade.start(&mut engine, handle, FadeKind::In, 0.0, 1.0, ms(300), ms(1_000))
                .is_none()
        );
        assert_eq!(fade.kind(), Some(FadeKind::In));

        let halfway = fade.gain_at(ms(1_150)).unwrap();
        assert!((halfway - 0.5).abs() < 1e-4);

        assert!(fade.poll(ms(1_299)).is_none());
        let done = fade.poll(ms(1_300)).unwrap();
        assert_eq!(done.kind, FadeKind::In);
        assert!((done.gain - 1.0).abs() < f32::EPSILON);
        assert!(!fade.is_active());
        assert!(fade.poll(ms(2_000)).is_none());
    }

    #[test]
    fn test_new_ramp_cancels_previous() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(10.0);
        let mut fade = FadeController::new();

        fade.start(&mut engine, handle, FadeKind::In, 0.0, 1.0, ms(300), ms(0));
        let first = fade.ramp_id().unwrap();

        fade.start(&mut engine, handle, FadeKind::Out, 0.4, 0.0, ms(300), ms(120));
        let second = fade.ramp_id().unwrap();

        assert_ne!(first, second);
        assert_eq!(engine.cancelled, vec![first]);
        assert_eq!(engine.live_ramps(handle), 1);
        assert_eq!(fade.kind(), Some(FadeKind::Out));
    }

    #[test]
    fn test_cancel_without_ramp_is_noop() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(10.0);
        let mut fade = FadeController::new();

        fade.cancel(&mut engine, handle);
        assert!(engine.cancelled.is_empty());
        assert_eq!(fade.gain_at(ms(10)), None);
    }

    #[test]
    fn test_gains_are_clamped() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(10.0);
        let mut fade = FadeController::new();

        fade.start(&mut engine, handle, FadeKind::In, -1.0, f32::NAN, ms(100), ms(0));
        assert_eq!(fade.gain_at(ms(0)), Some(0.0));
        assert_eq!(fade.gain_at(ms(100)), Some(0.0));
    }
}
