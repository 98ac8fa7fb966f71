//! The cpal-backed [`PlaybackEngine`].
//!
//! [`CpalEngine`] lives on the UI side. It owns the voice slot allocation and
//! turns every engine call into a [`ControlMessage`] for the audio thread.
//! Decoding runs on a short-lived loader thread per clip, which publishes the
//! sample itself and reports back through a channel drained by
//! [`PlaybackEngine::poll_event`].

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio_engine::audio_stream::AudioStreamHandle;
use crate::audio_engine::constants::{MAX_VOICES, METER_WINDOW, TAP_RING_CAPACITY};
use crate::audio_engine::engine::{
    EngineEvent, PlaybackEngine, PlayEpoch, RampId, ResourceHandle, SignalTap, TapHandle,
};
use crate::audio_engine::errors::{EngineError, SampleLoadError, TapReadError};
use crate::audio_engine::mixer::Playheads;
use crate::audio_engine::sample_loader::decode_audio_file_to_sample_buffer;
use crate::messages::{AudioMessage, ControlMessage, LoaderEvent};

/// UI-side view of one mixer voice slot.
#[derive(Debug, Clone, Copy, Default)]
struct VoiceAllocation {
    generation: u32,
    in_use: bool,
}

/// Keeps the most recent [`METER_WINDOW`] samples of a tap ring.
pub struct TapReader {
    consumer: Consumer<f32>,
    window: [f32; METER_WINDOW],
    write: usize,
    filled: usize,
}

impl TapReader {
    pub fn new(consumer: Consumer<f32>) -> Self {
        Self {
            consumer,
            window: [0.0; METER_WINDOW],
            write: 0,
            filled: 0,
        }
    }

    /// Drains the ring and copies the window into `buffer`, oldest first.
    /// Until a full window has arrived the oldest entries are silence.
    pub fn read(&mut self, buffer: &mut [f32; METER_WINDOW]) -> Result<(), TapReadError> {
        while let Ok(sample) = self.consumer.pop() {
            self.window[self.write] = sample;
            self.write = (self.write + 1) % METER_WINDOW;
            self.filled = (self.filled + 1).min(METER_WINDOW);
        }

        if self.filled == 0 {
            return Err(if self.consumer.is_abandoned() {
                TapReadError::Detached
            } else {
                TapReadError::NoData
            });
        }

        for (i, out) in buffer.iter_mut().enumerate() {
            *out = self.window[(self.write + i) % METER_WINDOW];
        }
        Ok(())
    }

    /// Forgets everything received so far, including samples still queued in
    /// the ring.
    pub fn reset(&mut self) {
        while self.consumer.pop().is_ok() {}
        self.window = [0.0; METER_WINDOW];
        self.write = 0;
        self.filled = 0;
    }
}

/// Resolves a source reference to a file path. Accepts plain paths and
/// `file://` URLs.
fn source_path(source: &str) -> Option<PathBuf> {
    let source = source.trim();
    let path = source.strip_prefix("file://").unwrap_or(source);
    if path.is_empty() {
        return None;
    }
    Some(PathBuf::from(path))
}

pub struct CpalEngine {
    producer: Arc<Mutex<Producer<ControlMessage>>>,
    consumer: Arc<Mutex<Consumer<AudioMessage>>>,
    playheads: Arc<Playheads>,
    output_channels: usize,
    output_sample_rate: u32,
    allocations: [VoiceAllocation; MAX_VOICES],
    taps: [Option<TapReader>; MAX_VOICES],
    loader_tx: Sender<LoaderEvent>,
    loader_rx: Receiver<LoaderEvent>,
    next_ramp: u64,
    next_epoch: u64,
}

impl CpalEngine {
    pub fn new(
        producer: Arc<Mutex<Producer<ControlMessage>>>,
        consumer: Arc<Mutex<Consumer<AudioMessage>>>,
        playheads: Arc<Playheads>,
        output_channels: usize,
        output_sample_rate: u32,
    ) -> Self {
        let (loader_tx, loader_rx) = std::sync::mpsc::channel();
        Self {
            producer,
            consumer,
            playheads,
            output_channels,
            output_sample_rate,
            allocations: [VoiceAllocation::default(); MAX_VOICES],
            taps: std::array::from_fn(|_| None),
            loader_tx,
            loader_rx,
            next_ramp: 0,
            next_epoch: 0,
        }
    }

    /// Drives the mixer behind a running stream.
    pub fn for_stream(handle: &AudioStreamHandle) -> Self {
        Self::new(
            handle.producer.clone(),
            handle.consumer.clone(),
            handle.playheads.clone(),
            handle.output_channels,
            handle.output_sample_rate,
        )
    }

    /// Number of voice slots currently holding a clip.
    pub fn voices_in_use(&self) -> usize {
        self.allocations.iter().filter(|a| a.in_use).count()
    }

    fn is_live(&self, handle: ResourceHandle) -> bool {
        self.allocations
            .get(handle.index)
            .is_some_and(|a| a.in_use && a.generation == handle.generation)
    }

    fn push(&self, message: ControlMessage) -> Result<(), EngineError> {
        let mut producer = self
            .producer
            .lock()
            .map_err(|_| EngineError::LockPoisoned)?;
        producer
            .push(message)
            .map_err(|_| EngineError::ControlRingFull)
    }

    /// Sends a command for a live voice. Commands for released handles are
    /// dropped here; a full ring is logged.
    fn send(&self, handle: ResourceHandle, message: ControlMessage) {
        if !self.is_live(handle) {
            log::debug!("ignoring command for released voice {}", handle.index);
            return;
        }
        if let Err(err) = self.push(message) {
            log::warn!("voice {}: {err}", handle.index);
        }
    }

    /// Clears the tap window so the next reading shows only the new run.
    fn reset_tap(&mut self, handle: ResourceHandle) {
        if !self.is_live(handle) {
            return;
        }
        if let Some(tap) = self.taps[handle.index].as_mut() {
            tap.reset();
        }
    }

    fn spawn_loader(&self, voice: ResourceHandle, path: PathBuf) {
        let loader_tx = self.loader_tx.clone();
        let producer = self.producer.clone();
        let output_channels = self.output_channels;
        let output_sample_rate = self.output_sample_rate;

        thread::spawn(move || {
            let decoded =
                decode_audio_file_to_sample_buffer(&path, output_channels, output_sample_rate);
            let sample = match decoded {
                Ok(sample) => sample,
                Err(SampleLoadError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        voice,
                        error: format!("File not found: {}", path.display()),
                    });
                    return;
                }
                Err(err) => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        voice,
                        error: err.to_string(),
                    });
                    return;
                }
            };

            let duration_sec = sample.duration_sec();

            let mut producer_guard = match producer.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    let _ = loader_tx.send(LoaderEvent::Error {
                        voice,
                        error: "Failed to acquire producer lock".to_string(),
                    });
                    return;
                }
            };

            if producer_guard
                .push(ControlMessage::LoadSample { voice, sample })
                .is_err()
            {
                let _ = loader_tx.send(LoaderEvent::Error {
                    voice,
                    error: "Failed to send LoadSample - buffer may be full".to_string(),
                });
                return;
            }
            drop(producer_guard);

            log::debug!("voice {} loaded ({duration_sec:.2}s)", voice.index);
            let _ = loader_tx.send(LoaderEvent::Success {
                voice,
                duration_sec,
            });
        });
    }
}

impl PlaybackEngine for CpalEngine {
    fn load(&mut self, source: &str) -> Result<ResourceHandle, EngineError> {
        let path = source_path(source).ok_or_else(|| EngineError::InvalidSource(source.to_string()))?;

        let index = self
            .allocations
            .iter()
            .position(|a| !a.in_use)
            .ok_or(EngineError::NoFreeVoice { limit: MAX_VOICES })?;

        let allocation = &mut self.allocations[index];
        allocation.generation = allocation.generation.wrapping_add(1);
        allocation.in_use = true;
        let handle = ResourceHandle {
            index,
            generation: allocation.generation,
        };

        // Claim the slot before the sample exists so early commands land.
        if let Err(err) = self.push(ControlMessage::Reset { voice: handle }) {
            self.allocations[index].in_use = false;
            return Err(err);
        }
        self.playheads.set(index, 0.0);
        self.taps[index] = None;

        self.spawn_loader(handle, path);
        Ok(handle)
    }

    fn release(&mut self, handle: ResourceHandle) {
        if !self.is_live(handle) {
            return;
        }
        self.send(handle, ControlMessage::Release { voice: handle });
        self.allocations[handle.index].in_use = false;
        self.taps[handle.index] = None;
        self.playheads.set(handle.index, 0.0);
    }

    fn play(&mut self, handle: ResourceHandle) -> PlayEpoch {
        self.next_epoch += 1;
        let epoch = PlayEpoch(self.next_epoch);
        self.reset_tap(handle);
        self.send(handle, ControlMessage::Play { voice: handle, epoch });
        epoch
    }

    fn pause(&mut self, handle: ResourceHandle) {
        self.send(handle, ControlMessage::Pause { voice: handle });
    }

    fn halt(&mut self, handle: ResourceHandle) {
        self.send(handle, ControlMessage::Halt { voice: handle });
        if self.is_live(handle) {
            self.playheads.set(handle.index, 0.0);
        }
        self.reset_tap(handle);
    }

    fn set_volume(&mut self, handle: ResourceHandle, volume: f32) {
        self.send(handle, ControlMessage::SetVolume { voice: handle, volume });
    }

    fn set_pan(&mut self, handle: ResourceHandle, pan: f32) {
        self.send(handle, ControlMessage::SetPan { voice: handle, pan });
    }

    fn set_loop(&mut self, handle: ResourceHandle, looping: bool) {
        self.send(handle, ControlMessage::SetLoop { voice: handle, looping });
    }

    fn set_gain(&mut self, handle: ResourceHandle, gain: f32) {
        self.send(handle, ControlMessage::SetGain { voice: handle, gain });
    }

    fn playback_position(&self, handle: ResourceHandle) -> f64 {
        if !self.is_live(handle) {
            return 0.0;
        }
        self.playheads.get(handle.index)
    }

    fn seek(&mut self, handle: ResourceHandle, seconds: f64) {
        self.send(handle, ControlMessage::Seek { voice: handle, seconds });
        // Report the new position before the audio thread catches up.
        if self.is_live(handle) && seconds.is_finite() {
            self.playheads.set(handle.index, seconds.max(0.0));
        }
    }

    fn fade(&mut self, handle: ResourceHandle, from: f32, to: f32, duration: Duration) -> RampId {
        self.next_ramp += 1;
        let ramp = RampId(self.next_ramp);
        self.send(
            handle,
            ControlMessage::Fade {
                voice: handle,
                ramp,
                from,
                to,
                duration_sec: duration.as_secs_f32(),
            },
        );
        ramp
    }

    fn cancel_fade(&mut self, handle: ResourceHandle, ramp: RampId) {
        self.send(handle, ControlMessage::CancelFade { voice: handle, ramp });
    }

    fn poll_event(&mut self) -> Option<EngineEvent> {
        match self.loader_rx.try_recv() {
            Ok(LoaderEvent::Success {
                voice,
                duration_sec,
            }) => {
                return Some(EngineEvent::MetadataReady {
                    handle: voice,
                    duration_sec,
                });
            }
            Ok(LoaderEvent::Error { voice, error }) => {
                return Some(EngineEvent::LoadFailed {
                    handle: voice,
                    error,
                });
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
        }

        let mut consumer = match self.consumer.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::warn!("audio event ring lock poisoned");
                return None;
            }
        };
        match consumer.pop() {
            Ok(AudioMessage::Ended { voice, epoch }) => Some(EngineEvent::Ended {
                handle: voice,
                epoch,
            }),
            Err(_) => None,
        }
    }
}

impl SignalTap for CpalEngine {
    fn attach_tap(&mut self, handle: ResourceHandle) -> Option<TapHandle> {
        if !self.is_live(handle) {
            return None;
        }

        let (producer, consumer) = RingBuffer::new(TAP_RING_CAPACITY);
        if let Err(err) = self.push(ControlMessage::AttachTap {
            voice: handle,
            producer,
        }) {
            log::warn!("voice {}: tap not attached: {err}", handle.index);
            return None;
        }

        self.taps[handle.index] = Some(TapReader::new(consumer));
        Some(TapHandle(handle))
    }

    fn detach_tap(&mut self, tap: TapHandle) {
        let handle = tap.0;
        if !self.is_live(handle) {
            return;
        }
        self.send(handle, ControlMessage::DetachTap { voice: handle });
        self.taps[handle.index] = None;
    }

    fn read_time_domain(
        &mut self,
        tap: TapHandle,
        buffer: &mut [f32; METER_WINDOW],
    ) -> Result<(), TapReadError> {
        let handle = tap.0;
        if !self.is_live(handle) {
            return Err(TapReadError::Detached);
        }
        self.taps[handle.index]
            .as_mut()
            .ok_or(TapReadError::Detached)?
            .read(buffer)
    }
}
