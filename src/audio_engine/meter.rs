//! RMS/peak level metering over a session's tap.

use crate::audio_engine::constants::{DB_CEIL, DB_FLOOR, METER_WINDOW};
use crate::audio_engine::engine::{SignalTap, TapHandle};

/// Displayable loudness of one window, both values within `[-60, 0]` dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSample {
    pub rms_db: f32,
    pub peak_db: f32,
}

impl LevelSample {
    pub const SILENCE: LevelSample = LevelSample {
        rms_db: DB_FLOOR,
        peak_db: DB_FLOOR,
    };

    /// Computes the levels of a time-domain window.
    ///
    /// Returns `None` for an empty window or one containing non-finite samples.
    pub fn from_window(window: &[f32]) -> Option<Self> {
        if window.is_empty() || window.iter().any(|s| !s.is_finite()) {
            return None;
        }

        let mut sum_sq = 0.0_f64;
        let mut peak = 0.0_f32;
        for &sample in window {
            sum_sq += f64::from(sample) * f64::from(sample);
            peak = peak.max(sample.abs());
        }

        let rms = (sum_sq / window.len() as f64).sqrt() as f32;

        Some(Self {
            rms_db: clamp_db(amplitude_to_db(rms)),
            peak_db: clamp_db(amplitude_to_db(peak)),
        })
    }
}

impl Default for LevelSample {
    fn default() -> Self {
        Self::SILENCE
    }
}

/// `20 * log10(x)` for positive amplitudes, negative infinity otherwise.
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        20.0 * amplitude.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Clamps a decibel value into the displayable range. NaN maps to the floor.
pub fn clamp_db(db: f32) -> f32 {
    if db.is_nan() {
        return DB_FLOOR;
    }
    db.clamp(DB_FLOOR, DB_CEIL)
}

/// Per-session meter. Keeps the last good reading so a failed tap read never
/// reaches observers as a gap or a NaN.
pub struct LevelMeter {
    window: Box<[f32; METER_WINDOW]>,
    last: LevelSample,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            window: Box::new([0.0; METER_WINDOW]),
            last: LevelSample::SILENCE,
        }
    }

    /// Takes a reading.
    ///
    /// When `playing` is false the silence floor is reported and the tap is not
    /// read. When the tap is missing or the read fails, the previous reading is
    /// returned unchanged.
    pub fn sample<T: SignalTap + ?Sized>(
        &mut self,
        engine: &mut T,
        tap: Option<TapHandle>,
        playing: bool,
    ) -> LevelSample {
        if !playing {
            self.last = LevelSample::SILENCE;
            return self.last;
        }

        let Some(tap) = tap else {
            return self.last;
        };

        if engine.read_time_domain(tap, &mut self.window).is_err() {
            return self.last;
        }

        if let Some(sample) = LevelSample::from_window(&self.window[..]) {
            self.last = sample;
        }
        self.last
    }

    pub fn last(&self) -> LevelSample {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = LevelSample::SILENCE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::testing::FakeEngine;

    #[test]
    fn test_silent_window_reports_floor() {
        let sample = LevelSample::from_window(&[0.0; METER_WINDOW]).unwrap();
        assert_eq!(sample, LevelSample::SILENCE);
    }

    #[test]
    fn test_full_scale_square_wave() {
        let window: Vec<f32> = (0..METER_WINDOW)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let sample = LevelSample::from_window(&window).unwrap();
        assert!(sample.rms_db.abs() < 1e-4);
        assert!(sample.peak_db.abs() < 1e-4);
    }

    #[test]
    fn test_half_scale_constant() {
        let sample = LevelSample::from_window(&[0.5; METER_WINDOW]).unwrap();
        let expected = 20.0 * 0.5_f32.log10();
        assert!((sample.rms_db - expected).abs() < 1e-3);
        assert!((sample.peak_db - expected).abs() < 1e-3);
    }

    #[test]
    fn test_over_full_scale_is_clamped() {
        let sample = LevelSample::from_window(&[4.0; METER_WINDOW]).unwrap();
        assert_eq!(sample.rms_db, 0.0);
        assert_eq!(sample.peak_db, 0.0);
    }

    #[test]
    fn test_peak_not_below_rms_for_varied_windows() {
        for seed in 1..50u32 {
            let window: Vec<f32> = (0..METER_WINDOW as u32)
                .map(|i| {
                    let phase = (i * seed) as f32 * 0.013;
                    phase.sin() * (seed as f32 / 60.0)
                })
                .collect();
            let sample = LevelSample::from_window(&window).unwrap();
            assert!((DB_FLOOR..=DB_CEIL).contains(&sample.rms_db));
            assert!((DB_FLOOR..=DB_CEIL).contains(&sample.peak_db));
            assert!(sample.peak_db >= sample.rms_db);
        }
    }

    #[test]
    fn test_non_finite_window_rejected() {
        let mut window = [0.1; METER_WINDOW];
        window[17] = f32::NAN;
        assert!(LevelSample::from_window(&window).is_none());
        assert!(LevelSample::from_window(&[]).is_none());
    }

    #[test]
    fn test_amplitude_to_db() {
        assert_eq!(amplitude_to_db(0.0), f32::NEG_INFINITY);
        assert_eq!(amplitude_to_db(-0.5), f32::NEG_INFINITY);
        assert!((amplitude_to_db(0.1) + 20.0).abs() < 1e-4);
        assert_eq!(clamp_db(f32::NEG_INFINITY), DB_FLOOR);
        assert_eq!(clamp_db(f32::INFINITY), DB_CEIL);
        assert_eq!(clamp_db(f32::NAN), DB_FLOOR);
    }

    #[test]
    fn test_meter_skips_tap_when_not_playing() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(5.0);
        let tap = engine.attach(handle);
        engine.set_tap_window(handle, vec![0.5; METER_WINDOW]);

        let mut meter = LevelMeter::new();
        assert_eq!(meter.sample(&mut engine, tap, false), LevelSample::SILENCE);
        assert_eq!(engine.tap_reads, 0);
    }

    #[test]
    fn test_meter_retains_previous_on_failed_read() {
        let mut engine = FakeEngine::new();
        let handle = engine.loaded(5.0);
        let tap = engine.attach(handle);
        engine.set_tap_window(handle, vec![0.5; METER_WINDOW]);

        let mut meter = LevelMeter::new();
        let first = meter.sample(&mut engine, tap, true);
        assert!(first.rms_db > DB_FLOOR);

        engine.fail_tap(handle);
        assert_eq!(meter.sample(&mut engine, tap, true), first);

        let mut bad = vec![0.5; METER_WINDOW];
        bad[3] = f32::INFINITY;
        engine.set_tap_window(handle, bad);
        assert_eq!(meter.sample(&mut engine, tap, true), first);
        assert_eq!(engine.tap_reads, 3);
    }

    #[test]
    fn test_meter_without_tap_keeps_last() {
        let mut engine = FakeEngine::new();
        let mut meter = LevelMeter::new();
        assert_eq!(meter.sample(&mut engine, None, true), LevelSample::SILENCE);
        assert_eq!(engine.tap_reads, 0);
    }
}
