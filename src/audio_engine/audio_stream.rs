//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Stream initialization and configuration
//! - Audio callback setup
//! - Real-time message processing

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::{Arc, Mutex};

use crate::audio_engine::constants::{CONTROL_RING_CAPACITY, EVENT_RING_CAPACITY};
use crate::audio_engine::master_bus::MasterBus;
use crate::audio_engine::mixer::{Playheads, RtMixer};
use crate::messages::{AudioMessage, ControlMessage};

/// Handle to the audio stream with associated message channels
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub producer: Arc<Mutex<Producer<ControlMessage>>>,
    pub consumer: Arc<Mutex<Consumer<AudioMessage>>>,
    pub playheads: Arc<Playheads>,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Setup and configure the logger
pub fn setup_logger() {
    // Default to `info`; override via `RUST_LOG`, e.g. `RUST_LOG=debug`.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Applies one UI command to the mixer.
fn dispatch(mixer: &mut RtMixer, message: ControlMessage) {
    match message {
        ControlMessage::Reset { voice } => mixer.reset_voice(voice),
        ControlMessage::LoadSample { voice, sample } => mixer.load_sample(voice, sample),
        ControlMessage::Play { voice, epoch } => mixer.play(voice, epoch),
        ControlMessage::Pause { voice } => mixer.pause(voice),
        ControlMessage::Halt { voice } => mixer.halt(voice),
        ControlMessage::Seek { voice, seconds } => mixer.seek(voice, seconds),
        ControlMessage::SetVolume { voice, volume } => mixer.set_volume(voice, volume),
        ControlMessage::SetPan { voice, pan } => mixer.set_pan(voice, pan),
        ControlMessage::SetLoop { voice, looping } => mixer.set_loop(voice, looping),
        ControlMessage::SetGain { voice, gain } => mixer.set_gain(voice, gain),
        ControlMessage::Fade {
            voice,
            ramp,
            from,
            to,
            duration_sec,
        } => mixer.fade(voice, ramp, from, to, duration_sec),
        ControlMessage::CancelFade { voice, ramp } => mixer.cancel_fade(voice, ramp),
        ControlMessage::AttachTap { voice, producer } => mixer.attach_tap(voice, producer),
        ControlMessage::DetachTap { voice } => mixer.detach_tap(voice),
        ControlMessage::Release { voice } => mixer.release(voice),
    }
}

/// Create and configure the audio stream
///
/// This function:
/// 1. Sets up the default audio device
/// 2. Creates ring buffers for message passing
/// 3. Initializes the mixer on the shared master bus
/// 4. Builds and returns the audio stream
pub fn create_audio_stream(
    master: Arc<MasterBus>,
) -> Result<AudioStreamHandle, Box<dyn std::error::Error>> {
    setup_logger();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No audio device found")?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate();
    let channels = config.channels();

    log::info!(
        "Starting Soundboard... ({} ch@{} Hz)",
        channels,
        sample_rate
    );

    // UI -> audio thread commands
    let (producer_in, mut consumer_in) = RingBuffer::new(CONTROL_RING_CAPACITY);

    // Audio thread -> UI events
    let (mut producer_out, consumer_out) = RingBuffer::new(EVENT_RING_CAPACITY);

    let playheads = Arc::new(Playheads::new());
    let mut mixer = RtMixer::new(channels as usize, sample_rate, master, playheads.clone());

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(512),
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while let Ok(message) = consumer_in.pop() {
                dispatch(&mut mixer, message);
            }

            mixer.render(data);

            mixer.drain_ended(|voice, epoch| {
                let _ = producer_out.push(AudioMessage::Ended { voice, epoch });
            });
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(AudioStreamHandle {
        stream,
        producer: Arc::new(Mutex::new(producer_in)),
        consumer: Arc::new(Mutex::new(consumer_out)),
        playheads,
        output_channels: channels as usize,
        output_sample_rate: sample_rate,
    })
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), Box<dyn std::error::Error>> {
    stream.play()?;
    Ok(())
}
