//! Real-time audio mixer implementation.
//!
//! This module provides the [`RtMixer`] struct which mixes every playing
//! [`Voice`] into the output buffer. Each voice passes through two gain stages,
//! the fade envelope and the slot volume, then the balance control; the
//! master bus multiplier is applied last. Metering taps see the signal after
//! the voice stages and before the master.
//!
//! All methods are lock-free and allocation-free; they run on the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::Sample;

use crate::audio_engine::constants::MAX_VOICES;
use crate::audio_engine::engine::{PlayEpoch, RampId, ResourceHandle};
use crate::audio_engine::master_bus::MasterBus;
use crate::audio_engine::voice::Voice;
use crate::messages::SampleBuffer;

/// Per-voice read heads in seconds, published by the audio thread.
pub struct Playheads {
    seconds: [AtomicU64; MAX_VOICES],
}

impl Default for Playheads {
    fn default() -> Self {
        Self::new()
    }
}

impl Playheads {
    pub fn new() -> Self {
        Self {
            seconds: std::array::from_fn(|_| AtomicU64::new(0f64.to_bits())),
        }
    }

    pub fn get(&self, index: usize) -> f64 {
        self.seconds
            .get(index)
            .map(|slot| f64::from_bits(slot.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    pub fn set(&self, index: usize, seconds: f64) {
        if let Some(slot) = self.seconds.get(index) {
            slot.store(seconds.to_bits(), Ordering::Relaxed);
        }
    }
}

/// Real-time mixer over a fixed bank of voices.
pub struct RtMixer {
    /// Number of output channels.
    channels: usize,

    /// Output sample rate in Hz.
    sample_rate: u32,

    master: Arc<MasterBus>,
    playheads: Arc<Playheads>,

    /// Voice bank with MAX_VOICES slots.
    voices: [Voice; MAX_VOICES],
}

impl RtMixer {
    pub fn new(
        channels: usize,
        sample_rate: u32,
        master: Arc<MasterBus>,
        playheads: Arc<Playheads>,
    ) -> Self {
        Self {
            channels,
            sample_rate,
            master,
            playheads,
            voices: std::array::from_fn(|_| Voice::new()),
        }
    }

    fn voice_mut(&mut self, handle: ResourceHandle) -> Option<&mut Voice> {
        self.voices
            .get_mut(handle.index)
            .filter(|voice| voice.owned_by(handle.generation))
    }

    /// Claims a voice slot for `handle`, resetting it.
    pub fn reset_voice(&mut self, handle: ResourceHandle) {
        if let Some(voice) = self.voices.get_mut(handle.index) {
            voice.claim(handle.generation);
            self.playheads.set(handle.index, 0.0);
        }
    }

    /// Installs a decoded clip. Clips whose channel count or rate differs from
    /// the mixer's are ignored; the loader converts both.
    pub fn load_sample(&mut self, handle: ResourceHandle, sample: SampleBuffer) {
        if sample.channels != self.channels || sample.sample_rate != self.sample_rate {
            return;
        }
        if let Some(voice) = self.voice_mut(handle) {
            voice.load(sample);
        }
    }

    pub fn play(&mut self, handle: ResourceHandle, epoch: PlayEpoch) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.playing = voice.sample.is_some();
            voice.ended = false;
            voice.epoch = epoch;
        }
    }

    pub fn pause(&mut self, handle: ResourceHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.playing = false;
        }
    }

    pub fn halt(&mut self, handle: ResourceHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.halt();
            self.playheads.set(handle.index, 0.0);
        }
    }

    pub fn seek(&mut self, handle: ResourceHandle, seconds: f64) {
        let Some(voice) = self.voice_mut(handle) else {
            return;
        };
        voice.seek(seconds);
        let position = voice.position_sec();
        self.playheads.set(handle.index, position);
    }

    pub fn set_volume(&mut self, handle: ResourceHandle, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        if let Some(voice) = self.voice_mut(handle) {
            voice.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn set_pan(&mut self, handle: ResourceHandle, pan: f32) {
        if !pan.is_finite() {
            return;
        }
        if let Some(voice) = self.voice_mut(handle) {
            voice.pan = pan.clamp(-1.0, 1.0);
        }
    }

    pub fn set_loop(&mut self, handle: ResourceHandle, looping: bool) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.looping = looping;
        }
    }

    pub fn set_gain(&mut self, handle: ResourceHandle, gain: f32) {
        if !gain.is_finite() {
            return;
        }
        if let Some(voice) = self.voice_mut(handle) {
            voice.set_gain(gain.clamp(0.0, 1.0));
        }
    }

    pub fn fade(&mut self, handle: ResourceHandle, ramp: RampId, from: f32, to: f32, duration_sec: f32) {
        let frames = if duration_sec.is_finite() && duration_sec > 0.0 {
            (duration_sec * self.sample_rate as f32).round() as u64
        } else {
            0
        };
        if let Some(voice) = self.voice_mut(handle) {
            voice.start_ramp(ramp, from.clamp(0.0, 1.0), to.clamp(0.0, 1.0), frames);
        }
    }

    pub fn cancel_fade(&mut self, handle: ResourceHandle, ramp: RampId) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.cancel_ramp(ramp);
        }
    }

    pub fn attach_tap(&mut self, handle: ResourceHandle, producer: rtrb::Producer<f32>) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.tap = Some(producer);
        }
    }

    pub fn detach_tap(&mut self, handle: ResourceHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.tap = None;
        }
    }

    /// Returns the slot to the idle pool; the clip buffer is dropped here.
    pub fn release(&mut self, handle: ResourceHandle) {
        if let Some(voice) = self.voice_mut(handle) {
            voice.release();
            self.playheads.set(handle.index, 0.0);
        }
    }

    /// Renders audio frames to the output buffer.
    ///
    /// Mixes all playing voices into the interleaved `output` buffer.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return;
        }

        let frames = output.len() / self.channels;
        if frames == 0 {
            return;
        }

        let master_gain = self.master.gain();
        let channels = self.channels;

        for (index, voice) in self.voices.iter_mut().enumerate() {
            if !voice.claimed || !voice.playing {
                continue;
            }

            let Some(sample) = voice.sample.clone() else {
                voice.playing = false;
                continue;
            };

            let sample_frames = sample.frames();
            if sample_frames == 0 {
                voice.playing = false;
                continue;
            }

            let (pan_left, pan_right) = voice.pan_gains();

            for frame in 0..frames {
                if voice.position >= sample_frames {
                    if voice.looping {
                        voice.position = 0;
                    } else {
                        voice.halt();
                        voice.ended = true;
                        break;
                    }
                }

                let voice_gain = voice.next_gain() * voice.volume;
                let base = voice.position * channels;
                let mut mono = 0.0;
                for channel in 0..channels {
                    let balance = match (channels, channel) {
                        (1, _) => 1.0,
                        (_, 0) => pan_left,
                        (_, 1) => pan_right,
                        _ => 1.0,
                    };
                    let value = sample.samples[base + channel] * voice_gain * balance;
                    mono += value;
                    output[frame * channels + channel] += value * master_gain;
                }

                if let Some(tap) = voice.tap.as_mut() {
                    let _ = tap.push(mono / channels as f32);
                }

                voice.position += 1;
            }

            self.playheads.set(index, voice.position_sec());
        }
    }

    /// Reports voices that reached the end of a non-looping clip since the
    /// last call.
    pub fn drain_ended(&mut self, mut on_ended: impl FnMut(ResourceHandle, PlayEpoch)) {
        for (index, voice) in self.voices.iter_mut().enumerate() {
            if voice.ended {
                voice.ended = false;
                let handle = ResourceHandle {
                    index,
                    generation: voice.generation,
                };
                on_ended(handle, voice.epoch);
            }
        }
    }

    /// Gets the number of channels configured for this mixer.
    pub fn channels(&self) -> usize {
        self.channels
    }
}
