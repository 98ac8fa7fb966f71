//! Voice state for real-time audio mixing.
//!
//! A [`Voice`] is one fixed slot of the [`RtMixer`](crate::audio_engine::mixer::RtMixer):
//! the clip it plays, its read head, and the gain stages applied to it. Voices
//! live on the audio thread; the UI addresses them by
//! [`ResourceHandle`](crate::audio_engine::engine::ResourceHandle).

use rtrb::Producer;

use crate::audio_engine::engine::{PlayEpoch, RampId};
use crate::messages::SampleBuffer;

/// A running linear ramp of the fade envelope, counted in output frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    pub id: RampId,
    pub target: f32,
    pub step: f32,
    pub remaining: u64,
}

/// One voice slot.
pub struct Voice {
    /// Generation of the handle that currently owns the slot.
    pub generation: u32,

    /// Whether the slot is claimed by a live handle.
    pub claimed: bool,

    /// The clip being played, once loaded.
    pub sample: Option<SampleBuffer>,

    /// Read head in frames. Clips arrive at the output rate, so it advances by
    /// one per output frame.
    pub position: usize,

    pub playing: bool,

    /// Epoch of the play command that started the current run; reported with
    /// `ended` so stale end notifications can be told apart.
    pub epoch: PlayEpoch,
    pub looping: bool,

    /// Set when a non-looping clip reaches its end; cleared by the mixer once
    /// reported.
    pub ended: bool,

    /// Slot volume stage (0.0 to 1.0).
    pub volume: f32,

    /// Balance (-1.0 to 1.0).
    pub pan: f32,

    /// Fade envelope stage (0.0 to 1.0).
    pub gain: f32,

    pub ramp: Option<GainRamp>,

    /// Metering tap receiving the post-gain mono signal.
    pub tap: Option<Producer<f32>>,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    /// An idle, unclaimed voice.
    pub fn new() -> Self {
        Self {
            generation: 0,
            claimed: false,
            sample: None,
            position: 0,
            playing: false,
            epoch: PlayEpoch::default(),
            looping: false,
            ended: false,
            volume: 1.0,
            pan: 0.0,
            gain: 0.0,
            ramp: None,
            tap: None,
        }
    }

    /// Claims the slot for `generation`, resetting every parameter.
    pub fn claim(&mut self, generation: u32) {
        *self = Self::new();
        self.generation = generation;
        self.claimed = true;
    }

    /// Returns the slot to the idle pool. Keeps the generation so late
    /// commands for the released handle still miss.
    pub fn release(&mut self) {
        let generation = self.generation;
        *self = Self::new();
        self.generation = generation;
    }

    pub fn owned_by(&self, generation: u32) -> bool {
        self.claimed && self.generation == generation
    }

    /// Installs a decoded clip and rewinds.
    pub fn load(&mut self, sample: SampleBuffer) {
        self.position = 0;
        self.sample = Some(sample);
    }

    /// Current read head in seconds of the clip.
    pub fn position_sec(&self) -> f64 {
        match &self.sample {
            Some(sample) if sample.sample_rate > 0 => {
                self.position as f64 / f64::from(sample.sample_rate)
            }
            _ => 0.0,
        }
    }

    pub fn seek(&mut self, seconds: f64) {
        let Some(sample) = &self.sample else {
            return;
        };
        let frames = sample.frames();
        let target = if seconds.is_finite() {
            (seconds.max(0.0) * f64::from(sample.sample_rate)).round() as usize
        } else {
            0
        };
        self.position = target.min(frames);
    }

    pub fn halt(&mut self) {
        self.playing = false;
        self.position = 0;
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.ramp = None;
        self.gain = gain;
    }

    /// Starts a ramp from `from` to `to` over `frames` output frames.
    pub fn start_ramp(&mut self, id: RampId, from: f32, to: f32, frames: u64) {
        if frames == 0 {
            self.set_gain(to);
            return;
        }
        self.gain = from;
        self.ramp = Some(GainRamp {
            id,
            target: to,
            step: (to - from) / frames as f32,
            remaining: frames,
        });
    }

    /// Freezes the envelope if `id` is the running ramp.
    pub fn cancel_ramp(&mut self, id: RampId) {
        if self.ramp.is_some_and(|ramp| ramp.id == id) {
            self.ramp = None;
        }
    }

    /// Advances the envelope by one output frame and returns the gain to use
    /// for that frame.
    pub fn next_gain(&mut self) -> f32 {
        let gain = self.gain;
        if let Some(ramp) = &mut self.ramp {
            ramp.remaining -= 1;
            if ramp.remaining == 0 {
                self.gain = ramp.target;
                self.ramp = None;
            } else {
                self.gain = (self.gain + ramp.step).clamp(0.0, 1.0);
            }
        }
        gain
    }

    /// Left and right multipliers of the balance control; unity at centre.
    pub fn pan_gains(&self) -> (f32, f32) {
        let pan = self.pan.clamp(-1.0, 1.0);
        ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
    }
}
