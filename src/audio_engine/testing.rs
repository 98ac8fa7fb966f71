//! Deterministic in-memory engine for unit tests.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::audio_engine::clock::{ManualTime, TimeSource};
use crate::audio_engine::constants::METER_WINDOW;
use crate::audio_engine::engine::{
    EngineEvent, PlaybackEngine, PlayEpoch, RampId, ResourceHandle, SignalTap, TapHandle,
};
use crate::audio_engine::errors::{EngineError, TapReadError};

#[derive(Debug, Default, Clone)]
pub struct FakeVoice {
    pub source: String,
    pub playing: bool,
    pub epoch: PlayEpoch,
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
    pub pan: f32,
    pub looping: bool,
    pub gain: f32,
    pub released: bool,
    pub tap_attached: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FakeRamp {
    pub handle: ResourceHandle,
    pub id: RampId,
    pub from: f32,
    pub to: f32,
    pub started_at: Duration,
    pub duration: Duration,
}

pub struct FakeEngine {
    pub time: ManualTime,
    pub voices: Vec<FakeVoice>,
    pub fades: Vec<FakeRamp>,
    pub cancelled: Vec<RampId>,
    pub reject_loads: bool,
    pub tap_reads: usize,
    tap_windows: HashMap<ResourceHandle, Result<Vec<f32>, TapReadError>>,
    events: VecDeque<EngineEvent>,
    next_ramp: u64,
    next_epoch: u64,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            time: ManualTime::new(),
            voices: Vec::new(),
            fades: Vec::new(),
            cancelled: Vec::new(),
            reject_loads: false,
            tap_reads: 0,
            tap_windows: HashMap::new(),
            events: VecDeque::new(),
            next_ramp: 0,
            next_epoch: 0,
        }
    }

    /// Loads a clip whose metadata is already resolved; no event is queued.
    pub fn loaded(&mut self, duration: f64) -> ResourceHandle {
        let handle = self
            .load("clip.wav")
            .expect("fake load cannot fail when not rejecting");
        self.voice_mut(handle).duration = duration;
        handle
    }

    pub fn attach(&mut self, handle: ResourceHandle) -> Option<TapHandle> {
        self.attach_tap(handle)
    }

    pub fn voice(&self, handle: ResourceHandle) -> &FakeVoice {
        &self.voices[handle.index]
    }

    fn voice_mut(&mut self, handle: ResourceHandle) -> &mut FakeVoice {
        &mut self.voices[handle.index]
    }

    pub fn gain(&self, handle: ResourceHandle) -> f32 {
        self.voice(handle).gain
    }

    /// Queues the metadata event for a pending load.
    pub fn finish_load(&mut self, handle: ResourceHandle, duration: f64) {
        self.voice_mut(handle).duration = duration;
        self.events.push_back(EngineEvent::MetadataReady {
            handle,
            duration_sec: duration,
        });
    }

    pub fn fail_load(&mut self, handle: ResourceHandle) {
        self.events.push_back(EngineEvent::LoadFailed {
            handle,
            error: "decode failed".to_string(),
        });
    }

    /// Plays the clip to its end: looping clips wrap, others stop and notify.
    pub fn reach_end(&mut self, handle: ResourceHandle) {
        let voice = self.voice_mut(handle);
        voice.position = 0.0;
        if voice.looping {
            return;
        }
        voice.playing = false;
        let epoch = voice.epoch;
        self.events.push_back(EngineEvent::Ended { handle, epoch });
    }

    pub fn set_position(&mut self, handle: ResourceHandle, seconds: f64) {
        self.voice_mut(handle).position = seconds;
    }

    pub fn set_tap_window(&mut self, handle: ResourceHandle, window: Vec<f32>) {
        self.tap_windows.insert(handle, Ok(window));
    }

    pub fn fail_tap(&mut self, handle: ResourceHandle) {
        self.tap_windows.insert(handle, Err(TapReadError::NoData));
    }

    /// Ramps that are neither cancelled nor past their end at the current time.
    pub fn live_ramps(&self, handle: ResourceHandle) -> usize {
        let now = self.time.now();
        self.fades
            .iter()
            .filter(|ramp| ramp.handle == handle)
            .filter(|ramp| !self.cancelled.contains(&ramp.id))
            .filter(|ramp| ramp.started_at + ramp.duration > now)
            .count()
    }

    fn drop_ramps(&mut self, handle: ResourceHandle) {
        let live: Vec<RampId> = self
            .fades
            .iter()
            .filter(|ramp| ramp.handle == handle && !self.cancelled.contains(&ramp.id))
            .map(|ramp| ramp.id)
            .collect();
        self.cancelled.extend(live);
    }
}

impl PlaybackEngine for FakeEngine {
    fn load(&mut self, source: &str) -> Result<ResourceHandle, EngineError> {
        if source.is_empty() {
            return Err(EngineError::InvalidSource(source.to_string()));
        }
        if self.reject_loads {
            return Err(EngineError::NoFreeVoice { limit: 0 });
        }

        self.voices.push(FakeVoice {
            source: source.to_string(),
            volume: 1.0,
            gain: 1.0,
            ..FakeVoice::default()
        });
        Ok(ResourceHandle {
            index: self.voices.len() - 1,
            generation: 0,
        })
    }

    fn release(&mut self, handle: ResourceHandle) {
        self.drop_ramps(handle);
        let voice = self.voice_mut(handle);
        voice.released = true;
        voice.playing = false;
    }

    fn play(&mut self, handle: ResourceHandle) -> PlayEpoch {
        self.next_epoch += 1;
        let epoch = PlayEpoch(self.next_epoch);
        let voice = self.voice_mut(handle);
        voice.playing = true;
        voice.epoch = epoch;
        epoch
    }

    fn pause(&mut self, handle: ResourceHandle) {
        self.voice_mut(handle).playing = false;
    }

    fn halt(&mut self, handle: ResourceHandle) {
        let voice = self.voice_mut(handle);
        voice.playing = false;
        voice.position = 0.0;
    }

    fn set_volume(&mut self, handle: ResourceHandle, volume: f32) {
        self.voice_mut(handle).volume = volume;
    }

    fn set_pan(&mut self, handle: ResourceHandle, pan: f32) {
        self.voice_mut(handle).pan = pan;
    }

    fn set_loop(&mut self, handle: ResourceHandle, looping: bool) {
        self.voice_mut(handle).looping = looping;
    }

    fn set_gain(&mut self, handle: ResourceHandle, gain: f32) {
        self.drop_ramps(handle);
        self.voice_mut(handle).gain = gain;
    }

    fn playback_position(&self, handle: ResourceHandle) -> f64 {
        self.voice(handle).position
    }

    fn seek(&mut self, handle: ResourceHandle, seconds: f64) {
        self.voice_mut(handle).position = seconds;
    }

    fn fade(&mut self, handle: ResourceHandle, from: f32, to: f32, duration: Duration) -> RampId {
        self.next_ramp += 1;
        let id = RampId(self.next_ramp);
        self.fades.push(FakeRamp {
            handle,
            id,
            from,
            to,
            started_at: self.time.now(),
            duration,
        });
        self.voice_mut(handle).gain = to;
        id
    }

    fn cancel_fade(&mut self, _handle: ResourceHandle, ramp: RampId) {
        self.cancelled.push(ramp);
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }
}

impl SignalTap for FakeEngine {
    fn attach_tap(&mut self, handle: ResourceHandle) -> Option<TapHandle> {
        let voice = self.voices.get_mut(handle.index)?;
        voice.tap_attached = true;
        Some(TapHandle(handle))
    }

    fn detach_tap(&mut self, tap: TapHandle) {
        self.voice_mut(tap.0).tap_attached = false;
        self.tap_windows.remove(&tap.0);
    }

    fn read_time_domain(
        &mut self,
        tap: TapHandle,
        buffer: &mut [f32; METER_WINDOW],
    ) -> Result<(), TapReadError> {
        self.tap_reads += 1;
        match self.tap_windows.get(&tap.0) {
            Some(Ok(window)) => {
                buffer.fill(0.0);
                let len = window.len().min(METER_WINDOW);
                buffer[..len].copy_from_slice(&window[..len]);
                Ok(())
            }
            Some(Err(err)) => Err(err.clone()),
            None => Err(TapReadError::NoData),
        }
    }
}

/// Writes a minimal PCM16 WAV file.
pub fn write_pcm16_wav(
    path: &Path,
    channels: u16,
    sample_rate_hz: u32,
    samples: &[i16],
) -> std::io::Result<()> {
    let bits_per_sample = 16u16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate_hz * u32::from(block_align);
    let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
    let chunk_size = 36 + data_len_bytes;

    let mut file = File::create(path)?;
    file.write_all(b"RIFF")?;
    file.write_all(&chunk_size.to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate_hz.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_len_bytes.to_le_bytes())?;
    for sample in samples {
        file.write_all(&sample.to_le_bytes())?;
    }

    Ok(())
}
