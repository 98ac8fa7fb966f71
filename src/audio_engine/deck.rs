//! The deck: every live slot session over one playback engine.
//!
//! All transport commands enter here. [`Deck::tick`] is called by the host's
//! refresh loop and is the only place engine events are consumed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::audio_engine::clock::{
    ClockKey, Observer, ObserverToken, SlotId, SnapshotSource, TimeSource, TransportClock,
    TransportSnapshot,
};
use crate::audio_engine::engine::{PlaybackEngine, SignalTap};
use crate::audio_engine::master_bus::MasterBus;
use crate::audio_engine::session::{PlaybackSession, TransportState};
use crate::state::{Playlist, Settings, SlotSpec, clamp_fade_ms};

struct SlotEntry {
    source_ref: String,
    session: PlaybackSession,
    clock_key: ClockKey,
}

pub struct Deck<E: PlaybackEngine + SignalTap> {
    engine: E,
    master: Arc<MasterBus>,
    settings: Settings,
    clock: TransportClock,
    time: Box<dyn TimeSource>,
    slots: HashMap<SlotId, SlotEntry>,
    /// Slot most recently toggled, the target of [`toggle_last`](Self::toggle_last).
    last_toggled: Option<SlotId>,
}

impl<E: PlaybackEngine + SignalTap> Deck<E> {
    pub fn new(
        engine: E,
        master: Arc<MasterBus>,
        settings: Settings,
        time: Box<dyn TimeSource>,
    ) -> Self {
        let mut settings = settings;
        settings.fade_ms = clamp_fade_ms(settings.fade_ms);
        Self {
            engine,
            master,
            settings,
            clock: TransportClock::new(),
            time,
            slots: HashMap::new(),
            last_toggled: None,
        }
    }

    /// Brings the slot's session in line with `spec`.
    ///
    /// A new or changed source replaces the session (the old one is torn down
    /// first); an unchanged source only updates volume, pan and loop. A slot
    /// without a source unloads the slot.
    pub fn load_slot(&mut self, spec: &SlotSpec) {
        let spec = spec.clone().normalized();
        let Some(source_ref) = spec.source_ref.clone().filter(|s| !s.is_empty()) else {
            self.unload_slot(&spec.id);
            return;
        };

        if let Some(entry) = self.slots.get_mut(&spec.id)
            && entry.source_ref == source_ref
        {
            entry.session.set_volume(&mut self.engine, spec.volume);
            entry.session.set_pan(&mut self.engine, spec.pan);
            entry.session.set_loop(&mut self.engine, spec.looping);
            return;
        }

        self.unload_slot(&spec.id);

        let session = PlaybackSession::new(
            &spec,
            self.master.clone(),
            self.fade_duration(),
            &mut self.engine,
        );
        let clock_key = self.clock.register(spec.id.clone());
        log::debug!("slot {} bound to {source_ref}", spec.id);
        self.slots.insert(
            spec.id.clone(),
            SlotEntry {
                source_ref,
                session,
                clock_key,
            },
        );
    }

    /// Loads every slot of `playlist` and unloads sessions of other playlists.
    pub fn sync_playlist(&mut self, playlist: &Playlist) {
        let stale: Vec<SlotId> = self
            .slots
            .keys()
            .filter(|id| playlist.slot(id).is_none())
            .cloned()
            .collect();
        for slot_id in stale {
            self.unload_slot(&slot_id);
        }

        for spec in &playlist.slots {
            self.load_slot(spec);
        }
    }

    /// Destroys a slot's session: fade cancelled, clock registration removed,
    /// engine resource and tap released.
    pub fn unload_slot(&mut self, slot_id: &str) -> bool {
        let Some(entry) = self.slots.remove(slot_id) else {
            return false;
        };

        self.clock.unregister(entry.clock_key);
        entry.session.destroy(&mut self.engine);
        if self.last_toggled.as_deref() == Some(slot_id) {
            self.last_toggled = None;
        }
        true
    }

    pub fn play(&mut self, slot_id: &str) -> bool {
        let now = self.time.now();
        self.with_session(slot_id, |session, engine| session.play(engine, now))
    }

    pub fn pause(&mut self, slot_id: &str) -> bool {
        let now = self.time.now();
        self.with_session(slot_id, |session, engine| session.pause(engine, now))
    }

    pub fn stop(&mut self, slot_id: &str) -> bool {
        let now = self.time.now();
        self.with_session(slot_id, |session, engine| session.stop(engine, now))
    }

    pub fn toggle(&mut self, slot_id: &str) -> bool {
        let now = self.time.now();
        let toggled = self.with_session(slot_id, |session, engine| session.toggle(engine, now));
        if toggled {
            self.last_toggled = Some(slot_id.to_string());
        }
        toggled
    }

    /// Toggles the slot toggled last, or `fallback` if none has been yet.
    pub fn toggle_last(&mut self, fallback: &str) -> bool {
        let slot_id = self
            .last_toggled
            .clone()
            .unwrap_or_else(|| fallback.to_string());
        self.toggle(&slot_id)
    }

    pub fn last_toggled(&self) -> Option<&str> {
        self.last_toggled.as_deref()
    }

    /// Seeks a slot. Returns the clamped position applied.
    pub fn seek(&mut self, slot_id: &str, seconds: f64) -> Option<f64> {
        let entry = self.slots.get_mut(slot_id)?;
        Some(entry.session.seek(&mut self.engine, seconds))
    }

    pub fn set_volume(&mut self, slot_id: &str, volume: u8) -> bool {
        self.with_session(slot_id, |session, engine| session.set_volume(engine, volume))
    }

    pub fn set_pan(&mut self, slot_id: &str, pan: f32) -> bool {
        self.with_session(slot_id, |session, engine| session.set_pan(engine, pan))
    }

    pub fn set_loop(&mut self, slot_id: &str, looping: bool) -> bool {
        self.with_session(slot_id, |session, engine| session.set_loop(engine, looping))
    }

    pub fn set_master_volume(&self, volume: u8) {
        self.master.set_master_volume(volume);
    }

    pub fn set_muted(&self, muted: bool) {
        self.master.set_muted(muted);
    }

    pub fn master(&self) -> &Arc<MasterBus> {
        &self.master
    }

    /// Changes the fade length for fades started from now on.
    pub fn set_fade_ms(&mut self, fade_ms: u32) {
        self.settings.set_fade_ms(fade_ms);
        let duration = self.fade_duration();
        for entry in self.slots.values_mut() {
            entry.session.set_fade_duration(duration);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe(&mut self, observer: Observer) -> ObserverToken {
        self.clock.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, token: ObserverToken) -> bool {
        self.clock.unsubscribe(token)
    }

    /// One refresh-loop step: routes engine events, completes due fades, then
    /// publishes snapshots of playing sessions. Returns the snapshot count.
    pub fn tick(&mut self) -> usize {
        let now = self.time.now();

        while let Some(event) = self.engine.poll_event() {
            let handle = event.handle();
            let target = self
                .slots
                .values_mut()
                .find(|entry| entry.session.handle() == Some(handle));
            match target {
                Some(entry) => entry.session.handle_event(&mut self.engine, &event),
                None => log::debug!("dropping event for released voice {}", handle.index),
            }
        }

        for entry in self.slots.values_mut() {
            entry.session.advance(&mut self.engine, now);
        }

        let mut view = SessionView {
            engine: &mut self.engine,
            slots: &mut self.slots,
        };
        self.clock.tick(now, &mut view)
    }

    pub fn state(&self, slot_id: &str) -> Option<TransportState> {
        self.slots.get(slot_id).map(|entry| entry.session.state())
    }

    pub fn duration(&self, slot_id: &str) -> Option<f64> {
        self.slots.get(slot_id)?.session.duration()
    }

    pub fn position(&mut self, slot_id: &str) -> Option<f64> {
        let entry = self.slots.get_mut(slot_id)?;
        Some(entry.session.position(&self.engine))
    }

    pub fn session(&self, slot_id: &str) -> Option<&PlaybackSession> {
        self.slots.get(slot_id).map(|entry| &entry.session)
    }

    pub fn slot_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    /// Stops the clock and tears down every session.
    pub fn shutdown(&mut self) {
        self.clock.shutdown();
        let slot_ids: Vec<SlotId> = self.slots.keys().cloned().collect();
        for slot_id in slot_ids {
            self.unload_slot(&slot_id);
        }
    }

    fn fade_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.settings.fade_ms))
    }

    fn with_session(
        &mut self,
        slot_id: &str,
        f: impl FnOnce(&mut PlaybackSession, &mut E),
    ) -> bool {
        match self.slots.get_mut(slot_id) {
            Some(entry) => {
                f(&mut entry.session, &mut self.engine);
                true
            }
            None => {
                log::debug!("no session for slot {slot_id}");
                false
            }
        }
    }
}

struct SessionView<'a, E> {
    engine: &'a mut E,
    slots: &'a mut HashMap<SlotId, SlotEntry>,
}

impl<E: PlaybackEngine + SignalTap> SnapshotSource for SessionView<'_, E> {
    fn snapshot(&mut self, slot_id: &str) -> Option<TransportSnapshot> {
        self.slots.get_mut(slot_id)?.session.snapshot(self.engine)
    }
}
