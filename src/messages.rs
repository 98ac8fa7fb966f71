//! Message definitions for communication between the UI thread, loader threads
//! and the real-time audio thread.
//!
//! These enums are the wire format of the rtrb rings and the loader channel.
//! Every voice command carries the full [`ResourceHandle`] so the audio thread
//! can drop commands aimed at a voice slot that has since been reused.

use rtrb::Producer;
use std::sync::Arc;

use crate::audio_engine::engine::{PlayEpoch, RampId, ResourceHandle};

/// A decoded clip, interleaved at the output channel count.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub channels: usize,
    /// Resampled to the output rate by the loader.
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl SampleBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn duration_sec(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMessage {
    /// A non-looping voice played to the end of its clip and stopped.
    Ended {
        voice: ResourceHandle,
        epoch: PlayEpoch,
    },
}

/// Message that is emitted from the UI side.
pub enum ControlMessage {
    /// Claim a voice slot for a new clip: adopt the handle's generation and
    /// reset every voice parameter. The clip itself follows as `LoadSample`.
    Reset { voice: ResourceHandle },

    /// Publish a decoded clip into a claimed voice.
    LoadSample {
        voice: ResourceHandle,
        sample: SampleBuffer,
    },

    /// Start or resume from the current position. `epoch` is echoed back in
    /// `AudioMessage::Ended`.
    Play {
        voice: ResourceHandle,
        epoch: PlayEpoch,
    },

    /// Suspend, keeping the position.
    Pause { voice: ResourceHandle },

    /// Stop and rewind to the start.
    Halt { voice: ResourceHandle },

    /// Move the read head to `seconds` into the clip.
    Seek { voice: ResourceHandle, seconds: f64 },

    /// Slot volume stage (0.0 to 1.0).
    SetVolume { voice: ResourceHandle, volume: f32 },

    /// Balance (-1.0 left to 1.0 right).
    SetPan { voice: ResourceHandle, pan: f32 },

    SetLoop { voice: ResourceHandle, looping: bool },

    /// Fade envelope stage, applied at once; drops a running ramp.
    SetGain { voice: ResourceHandle, gain: f32 },

    /// Linear ramp of the fade envelope stage.
    Fade {
        voice: ResourceHandle,
        ramp: RampId,
        from: f32,
        to: f32,
        duration_sec: f32,
    },

    /// Stop `ramp` where it is, if it is still the running ramp.
    CancelFade { voice: ResourceHandle, ramp: RampId },

    /// Start copying the voice's post-gain mono signal into `producer`.
    AttachTap {
        voice: ResourceHandle,
        producer: Producer<f32>,
    },

    DetachTap { voice: ResourceHandle },

    /// Return the voice slot to the idle pool, dropping its clip and tap.
    Release { voice: ResourceHandle },
}

/// Events emitted from loader threads.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderEvent {
    /// The clip was decoded and handed to the audio thread.
    Success {
        voice: ResourceHandle,
        duration_sec: f64,
    },

    /// Loading failed.
    Error { voice: ResourceHandle, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_duration() {
        let sample = SampleBuffer {
            channels: 2,
            sample_rate: 48_000,
            samples: Arc::from(vec![0.0; 96_000].into_boxed_slice()),
        };
        assert_eq!(sample.frames(), 48_000);
        assert!((sample.duration_sec() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_sample_buffer() {
        let sample = SampleBuffer {
            channels: 0,
            sample_rate: 0,
            samples: Arc::from(Vec::new().into_boxed_slice()),
        };
        assert_eq!(sample.frames(), 0);
        assert_eq!(sample.duration_sec(), 0.0);
    }
}
