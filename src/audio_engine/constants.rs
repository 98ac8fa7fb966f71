//! Audio engine configuration constants and limits.

/// Maximum number of clips that can be resident in the engine at once.
pub const MAX_VOICES: usize = 32;

/// Minimum slot or master volume (silence).
pub const VOLUME_MIN: u8 = 0;

/// Maximum slot or master volume (100%).
pub const VOLUME_MAX: u8 = 100;

/// Hard-left pan position.
pub const PAN_MIN: f32 = -1.0;

/// Hard-right pan position.
pub const PAN_MAX: f32 = 1.0;

/// Number of time-domain samples read from a tap per meter update.
pub const METER_WINDOW: usize = 512;

/// Level reported for silence, and the lower clamp for every meter reading.
pub const DB_FLOOR: f32 = -60.0;

/// Upper clamp for every meter reading (full scale).
pub const DB_CEIL: f32 = 0.0;

/// Fade duration used when no setting overrides it.
pub const DEFAULT_FADE_MS: u32 = 300;

/// Shortest fade the settings UI allows.
pub const FADE_MS_MIN: u32 = 200;

/// Longest fade the settings UI allows.
pub const FADE_MS_MAX: u32 = 500;

/// Capacity of the UI -> audio thread command ring.
pub const CONTROL_RING_CAPACITY: usize = 1024;

/// Capacity of the audio thread -> UI event ring.
pub const EVENT_RING_CAPACITY: usize = 1024;

/// Capacity of each per-voice metering tap ring, in mono samples.
pub const TAP_RING_CAPACITY: usize = 8192;

/// Number of slots in a freshly created playlist.
pub const SLOTS_PER_PLAYLIST: usize = 6;

/// Maximum number of playlists (tabs).
pub const MAX_PLAYLISTS: usize = 2;
