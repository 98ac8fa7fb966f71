//! Audio-specific error types.

use thiserror::Error;

/// Errors that can occur while loading audio files.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file is missing channel information.
    #[error("audio file is missing channel information")]
    MissingChannels,

    /// Decoding produced no audio frames.
    #[error("audio file contains no audio frames")]
    Empty,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, output has {output_channels} channels"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },

    /// Failed to create resampler.
    #[error("failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    /// Failed to resample audio.
    #[error("failed to resample audio: {0}")]
    Resample(#[from] rubato::ResampleError),
}

/// Errors returned synchronously by a playback engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Every voice slot is occupied by a resident clip.
    #[error("no free voice slot (limit {limit})")]
    NoFreeVoice {
        /// Maximum number of resident clips.
        limit: usize,
    },

    /// The source reference is empty or cannot name a file.
    #[error("invalid source reference: {0:?}")]
    InvalidSource(String),

    /// The UI -> audio thread command ring rejected a message.
    #[error("control ring is full")]
    ControlRingFull,

    /// No output stream is running.
    #[error("audio engine not running")]
    NotRunning,

    /// The control ring lock was poisoned by a panicking thread.
    #[error("control ring lock poisoned")]
    LockPoisoned,
}

/// Reasons a metering tap could not deliver a time-domain window.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TapReadError {
    /// The tap handle does not refer to an attached tap.
    #[error("tap is not attached")]
    Detached,

    /// The tap has not delivered any samples yet.
    #[error("tap has no samples yet")]
    NoData,
}
