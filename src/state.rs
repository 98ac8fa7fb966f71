//! Persisted application state: playlists of slots, master controls, settings.
//!
//! The JSON layout matches what earlier releases wrote (`camelCase`, `items`,
//! `url`, `mime`, flattened settings), so existing `state.json` files load.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};

use crate::audio_engine::clock::SlotId;
use crate::audio_engine::constants::{
    DEFAULT_FADE_MS, FADE_MS_MAX, FADE_MS_MIN, MAX_PLAYLISTS, PAN_MAX, PAN_MIN,
    SLOTS_PER_PLAYLIST, VOLUME_MAX,
};
use crate::upload::{UploadFile, is_valid_upload};

const DEFAULT_PLAYLIST_ID: &str = "pl-1";
const DEFAULT_PLAYLIST_NAME: &str = "Playlist 1";

/// One pad of the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    pub id: SlotId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "url", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, rename = "mime", skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
    #[serde(default, rename = "loop")]
    pub looping: bool,
    #[serde(default = "default_volume", deserialize_with = "de_volume")]
    pub volume: u8,
    #[serde(default)]
    pub pan: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl SlotSpec {
    /// An empty slot: no source, full volume, centred, not looping.
    pub fn empty(id: impl Into<SlotId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            source_ref: None,
            mime_hint: None,
            looping: false,
            volume: VOLUME_MAX,
            pan: 0.0,
            duration: None,
        }
    }

    /// Clamps volume and pan into range; non-finite values fall back to defaults.
    pub fn normalized(mut self) -> Self {
        self.volume = self.volume.min(VOLUME_MAX);
        self.pan = if self.pan.is_finite() {
            self.pan.clamp(PAN_MIN, PAN_MAX)
        } else {
            0.0
        };
        self.duration = self.duration.filter(|d| d.is_finite() && *d >= 0.0);
        self
    }

    pub fn has_source(&self) -> bool {
        self.source_ref.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(rename = "items")]
    pub slots: Vec<SlotSpec>,
}

impl Playlist {
    /// A playlist of empty slots with ids `"{id}-{i}"`.
    pub fn empty(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let slots = (0..SLOTS_PER_PLAYLIST)
            .map(|i| SlotSpec::empty(format!("{id}-{i}")))
            .collect();
        Self {
            id,
            name: name.into(),
            slots,
        }
    }

    pub fn slot(&self, slot_id: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|slot| slot.id == slot_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadSize {
    Small,
    #[default]
    Medium,
}

impl PadSize {
    pub fn as_str(self) -> &'static str {
        match self {
            PadSize::Small => "small",
            PadSize::Medium => "medium",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "small" => Some(PadSize::Small),
            "medium" => Some(PadSize::Medium),
            _ => None,
        }
    }
}

/// User-facing preferences, resolved once when a deck is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub pad_size: PadSize,
    #[serde(default = "default_true")]
    pub show_art_icon: bool,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pad_size: PadSize::Medium,
            show_art_icon: true,
            fade_ms: DEFAULT_FADE_MS,
        }
    }
}

impl Settings {
    /// Sets the fade length, clamped to the range the UI slider offers.
    pub fn set_fade_ms(&mut self, fade_ms: u32) {
        self.fade_ms = clamp_fade_ms(fade_ms);
    }
}

pub fn clamp_fade_ms(fade_ms: u32) -> u32 {
    fade_ms.clamp(FADE_MS_MIN, FADE_MS_MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub playlists: Vec<Playlist>,
    #[serde(default)]
    pub active_playlist_id: Option<String>,
    #[serde(default = "default_volume", deserialize_with = "de_volume")]
    pub master_volume: u8,
    #[serde(default)]
    pub muted: bool,
    #[serde(flatten)]
    pub settings: Settings,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            playlists: vec![Playlist::empty(DEFAULT_PLAYLIST_ID, DEFAULT_PLAYLIST_NAME)],
            active_playlist_id: Some(DEFAULT_PLAYLIST_ID.to_string()),
            master_volume: VOLUME_MAX,
            muted: false,
            settings: Settings::default(),
        }
    }
}

impl AppState {
    /// Repairs a state read from storage: clamps every slot and the fade
    /// length, and points the active playlist at one that exists.
    pub fn normalized(mut self) -> Self {
        if self.playlists.is_empty() {
            self.playlists
                .push(Playlist::empty(DEFAULT_PLAYLIST_ID, DEFAULT_PLAYLIST_NAME));
        }
        for playlist in &mut self.playlists {
            playlist.slots = std::mem::take(&mut playlist.slots)
                .into_iter()
                .map(SlotSpec::normalized)
                .collect();
        }
        self.master_volume = self.master_volume.min(VOLUME_MAX);
        self.settings.fade_ms = clamp_fade_ms(self.settings.fade_ms);

        let active_exists = self
            .active_playlist_id
            .as_deref()
            .is_some_and(|id| self.playlists.iter().any(|p| p.id == id));
        if !active_exists {
            self.active_playlist_id = self.playlists.first().map(|p| p.id.clone());
        }
        self
    }

    pub fn active_playlist(&self) -> Option<&Playlist> {
        let id = self.active_playlist_id.as_deref()?;
        self.playlists.iter().find(|p| p.id == id)
    }

    fn active_playlist_mut(&mut self) -> Option<&mut Playlist> {
        let id = self.active_playlist_id.clone()?;
        self.playlists.iter_mut().find(|p| p.id == id)
    }

    /// Adds and activates a new playlist. Returns its id, or `None` at the limit.
    pub fn create_playlist(&mut self) -> Option<String> {
        if self.playlists.len() >= MAX_PLAYLISTS {
            return None;
        }

        let id = self.fresh_playlist_id();
        let name = format!("Playlist {}", self.playlists.len() + 1);
        self.playlists.push(Playlist::empty(id.clone(), name));
        self.active_playlist_id = Some(id.clone());
        Some(id)
    }

    /// Renames a playlist. Blank names are rejected.
    pub fn rename_playlist(&mut self, id: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        match self.playlists.iter_mut().find(|p| p.id == id) {
            Some(playlist) => {
                playlist.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Deletes a playlist and activates the first remaining one. Removing the
    /// last playlist replaces it with a fresh default.
    pub fn delete_playlist(&mut self, id: &str) -> bool {
        let before = self.playlists.len();
        self.playlists.retain(|p| p.id != id);
        if self.playlists.len() == before {
            return false;
        }

        if self.playlists.is_empty() {
            self.playlists
                .push(Playlist::empty(DEFAULT_PLAYLIST_ID, DEFAULT_PLAYLIST_NAME));
        }
        self.active_playlist_id = self.playlists.first().map(|p| p.id.clone());
        true
    }

    pub fn select_playlist(&mut self, id: &str) -> bool {
        if !self.playlists.iter().any(|p| p.id == id) {
            return false;
        }
        self.active_playlist_id = Some(id.to_string());
        true
    }

    /// Back to a single empty playlist with default master controls and settings.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Replaces a slot of the active playlist, matched by id.
    pub fn update_slot(&mut self, slot: SlotSpec) -> bool {
        let Some(playlist) = self.active_playlist_mut() else {
            return false;
        };
        match playlist.slots.iter_mut().find(|s| s.id == slot.id) {
            Some(existing) => {
                *existing = slot.normalized();
                true
            }
            None => false,
        }
    }

    /// Assigns an uploaded file to a slot of the active playlist.
    ///
    /// Files that fail validation are ignored and the slot is left as it was.
    /// Returns the updated slot.
    pub fn apply_upload(
        &mut self,
        slot_id: &str,
        file: &UploadFile,
        source_ref: &str,
    ) -> Option<SlotSpec> {
        if !is_valid_upload(&file.name, &file.media_type) {
            log::debug!("ignoring upload {:?} ({})", file.name, file.media_type);
            return None;
        }

        let playlist = self.active_playlist_mut()?;
        let slot = playlist.slots.iter_mut().find(|s| s.id == slot_id)?;
        slot.name = file.name.clone();
        slot.source_ref = Some(source_ref.to_string());
        slot.mime_hint = Some(file.media_type.clone()).filter(|m| !m.is_empty());
        slot.duration = None;
        Some(slot.clone())
    }

    pub fn set_master_volume(&mut self, volume: u8) {
        self.master_volume = volume.min(VOLUME_MAX);
    }

    fn fresh_playlist_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut candidate = millis;
        loop {
            let id = format!("pl-{candidate}");
            if !self.playlists.iter().any(|p| p.id == id) {
                return id;
            }
            candidate += 1;
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume() -> u8 {
    VOLUME_MAX
}

fn default_fade_ms() -> u32 {
    DEFAULT_FADE_MS
}

/// Volumes were written as plain JSON numbers; accept any number and clamp.
fn de_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Ok(VOLUME_MAX);
    }
    Ok(value.round().clamp(0.0, f64::from(VOLUME_MAX)) as u8)
}
