//! Cooperative transport clock.
//!
//! The host's display-refresh loop drives [`TransportClock::tick`]; nothing here
//! owns a thread or a timer. Each tick pulls a snapshot from every registered
//! session that is playing and hands it to the subscribed observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Slot identifier, unique within a playlist.
pub type SlotId = String;

/// Source of "now" for fades and ticks.
pub trait TimeSource: Send {
    fn now(&self) -> Duration;
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced time, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    nanos: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(duration_nanos(by), Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.nanos.store(duration_nanos(at), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// What the clock publishes for one playing session per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub slot_id: SlotId,
    pub position: f64,
    pub rms_db: f32,
    pub peak_db: f32,
}

/// Looks up the snapshot of a registered slot. Returns `None` when the slot is
/// not playing, which makes the clock skip it for this tick.
pub trait SnapshotSource {
    fn snapshot(&mut self, slot_id: &str) -> Option<TransportSnapshot>;
}

/// Observer callback invoked for every published snapshot.
pub type Observer = Box<dyn FnMut(&TransportSnapshot) + Send>;

/// Registration of a session in the tick set.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ClockKey(SlabKey);

/// Returned by [`TransportClock::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(SlabKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SlabKey {
    index: usize,
    generation: u32,
}

struct SlabEntry<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-cost insert/remove storage; freed indices are reused and bumped to a
/// new generation so stale keys miss.
struct Slab<T> {
    entries: Vec<SlabEntry<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slab<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    fn insert(&mut self, value: T) -> SlabKey {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index];
            entry.generation = entry.generation.wrapping_add(1);
            entry.value = Some(value);
            return SlabKey {
                index,
                generation: entry.generation,
            };
        }

        self.entries.push(SlabEntry {
            generation: 0,
            value: Some(value),
        });
        SlabKey {
            index: self.entries.len() - 1,
            generation: 0,
        }
    }

    fn remove(&mut self, key: SlabKey) -> Option<T> {
        let entry = self.entries.get_mut(key.index)?;
        if entry.generation != key.generation {
            return None;
        }

        let value = entry.value.take()?;
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    fn clear(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                self.free.push(index);
            }
        }
        self.len = 0;
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|entry| entry.value.as_ref())
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(|entry| entry.value.as_mut())
    }
}

/// Shared periodic scheduler for every session of a deck.
pub struct TransportClock {
    sessions: Slab<SlotId>,
    observers: Slab<Observer>,
    running: bool,
    ticks: u64,
    last_tick: Option<Duration>,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    pub fn new() -> Self {
        Self {
            sessions: Slab::new(),
            observers: Slab::new(),
            running: false,
            ticks: 0,
            last_tick: None,
        }
    }

    /// Adds a session to the tick set.
    pub fn register(&mut self, slot_id: SlotId) -> ClockKey {
        ClockKey(self.sessions.insert(slot_id))
    }

    /// Removes a session from the tick set. Returns its slot id.
    pub fn unregister(&mut self, key: ClockKey) -> Option<SlotId> {
        self.sessions.remove(key.0)
    }

    /// Subscribes an observer and starts the loop if it was idle.
    pub fn subscribe(&mut self, observer: Observer) -> ObserverToken {
        self.running = true;
        ObserverToken(self.observers.insert(observer))
    }

    /// Unsubscribes an observer. Removing the last one cancels the loop.
    pub fn unsubscribe(&mut self, token: ObserverToken) -> bool {
        let removed = self.observers.remove(token.0).is_some();
        if self.observers.len == 0 {
            self.running = false;
        }
        removed
    }

    /// Drops every observer and cancels the loop.
    pub fn shutdown(&mut self) {
        self.observers.clear();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len
    }

    /// Number of ticks that reached the sessions.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_tick(&self) -> Option<Duration> {
        self.last_tick
    }

    /// Runs one tick at `now`. Returns the number of snapshots published.
    pub fn tick<S: SnapshotSource + ?Sized>(&mut self, now: Duration, source: &mut S) -> usize {
        if !self.running {
            return 0;
        }

        self.ticks += 1;
        self.last_tick = Some(now);

        let mut published = 0;
        for slot_id in self.sessions.values() {
            let Some(snapshot) = source.snapshot(slot_id) else {
                continue;
            };

            for observer in self.observers.values_mut() {
                observer(&snapshot);
            }
            published += 1;
        }

        published
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    struct Playing(HashSet<&'static str>);

    impl SnapshotSource for Playing {
        fn snapshot(&mut self, slot_id: &str) -> Option<TransportSnapshot> {
            self.0.contains(slot_id).then(|| TransportSnapshot {
                slot_id: slot_id.to_string(),
                position: 1.5,
                rms_db: -20.0,
                peak_db: -6.0,
            })
        }
    }

    fn collector() -> (Arc<Mutex<Vec<TransportSnapshot>>>, Observer) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: Observer = Box::new(move |snapshot| {
            sink.lock().unwrap().push(snapshot.clone());
        });
        (seen, observer)
    }

    #[test]
    fn test_manual_time_advances() {
        let time = ManualTime::new();
        let shared = time.clone();
        assert_eq!(time.now(), Duration::ZERO);

        shared.advance(Duration::from_millis(16));
        assert_eq!(time.now(), Duration::from_millis(16));

        time.set(Duration::from_secs(2));
        assert_eq!(shared.now(), Duration::from_secs(2));
    }

    #[test]
    fn test_tick_without_observers_is_idle() {
        let mut clock = TransportClock::new();
        clock.register("a".to_string());

        let mut source = Playing(HashSet::from(["a"]));
        assert_eq!(clock.tick(Duration::ZERO, &mut source), 0);
        assert_eq!(clock.ticks(), 0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_tick_publishes_only_playing_sessions() {
        let mut clock = TransportClock::new();
        clock.register("a".to_string());
        clock.register("b".to_string());
        clock.register("c".to_string());

        let (seen, observer) = collector();
        clock.subscribe(observer);

        let mut source = Playing(HashSet::from(["a", "c"]));
        assert_eq!(clock.tick(Duration::from_millis(16), &mut source), 2);

        let seen = seen.lock().unwrap();
        let ids: Vec<_> = seen.iter().map(|s| s.slot_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(clock.session_count(), 3);
        assert_eq!(clock.last_tick(), Some(Duration::from_millis(16)));
    }

    #[test]
    fn test_unsubscribing_last_observer_stops_loop() {
        let mut clock = TransportClock::new();
        clock.register("a".to_string());

        let (seen_a, observer_a) = collector();
        let (seen_b, observer_b) = collector();
        let token_a = clock.subscribe(observer_a);
        let token_b = clock.subscribe(observer_b);

        let mut source = Playing(HashSet::from(["a"]));
        clock.tick(Duration::ZERO, &mut source);

        assert!(clock.unsubscribe(token_a));
        assert!(clock.is_running());
        clock.tick(Duration::ZERO, &mut source);

        assert!(clock.unsubscribe(token_b));
        assert!(!clock.is_running());
        assert_eq!(clock.tick(Duration::ZERO, &mut source), 0);

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().len(), 2);
        assert!(!clock.unsubscribe(token_b));
    }

    #[test]
    fn test_shutdown_silences_observers() {
        let mut clock = TransportClock::new();
        clock.register("a".to_string());
        let (seen, observer) = collector();
        clock.subscribe(observer);

        clock.shutdown();

        let mut source = Playing(HashSet::from(["a"]));
        assert_eq!(clock.tick(Duration::ZERO, &mut source), 0);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(clock.observer_count(), 0);
    }

    #[test]
    fn test_register_reuses_freed_slots() {
        let mut clock = TransportClock::new();
        let a = clock.register("a".to_string());
        let b = clock.register("b".to_string());

        assert_eq!(clock.unregister(a), Some("a".to_string()));
        let c = clock.register("c".to_string());

        assert_eq!(clock.session_count(), 2);
        assert_eq!(clock.unregister(c), Some("c".to_string()));
        assert_eq!(clock.unregister(b), Some("b".to_string()));
        assert_eq!(clock.session_count(), 0);
    }

    #[test]
    fn test_stale_observer_token_misses_reused_slot() {
        let mut clock = TransportClock::new();
        let (_, first) = collector();
        let stale = clock.subscribe(first);
        clock.unsubscribe(stale);

        let (_, second) = collector();
        clock.subscribe(second);

        assert!(!clock.unsubscribe(stale));
        assert_eq!(clock.observer_count(), 1);
        assert!(clock.is_running());
    }
}
