//! Level metering and threshold gating
//!
//! Everything here is called from the capture callback, so it must stay
//! lock-free and allocation-free.

use std::sync::atomic::{AtomicU64, Ordering};

/// Floor of the level meter in dB
pub const MIN_LEVEL_DB: f32 = -160.0;

/// Threshold used when none is configured; nothing is ever gated
pub const OPEN_GATE_DB: f32 = -1_000_000.0;

/// Peak and average level of one block, in dB
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub peak: f32,
    pub average: f32,
}

impl Levels {
    /// Measure a block. Returns `None` for an empty block or one that
    /// contains non-finite samples.
    pub fn measure(samples: &[f32]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f64;
        for &sample in samples {
            if !sample.is_finite() {
                return None;
            }
            peak = peak.max(sample.abs());
            sum_sq += sample as f64 * sample as f64;
        }

        let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
        Some(Self {
            peak: amplitude_to_db(peak),
            average: amplitude_to_db(rms),
        })
    }
}

/// Linear amplitude to dB, clamped at [`MIN_LEVEL_DB`]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= 0.0 {
        return MIN_LEVEL_DB;
    }
    (20.0 * amplitude.log10()).max(MIN_LEVEL_DB)
}

/// Outcome of comparing a block's average level against the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Forward,
    BelowThreshold,
}

pub fn effective_threshold(threshold: Option<f32>) -> f32 {
    threshold.unwrap_or(OPEN_GATE_DB)
}

/// Forward only when the average is strictly above the threshold
pub fn gate(average: f32, threshold: Option<f32>) -> GateDecision {
    if average > effective_threshold(threshold) {
        GateDecision::Forward
    } else {
        GateDecision::BelowThreshold
    }
}

const PRESENT: u64 = 1 << 32;

/// `Option<f32>` stored in a single atomic word so readers never see a torn
/// value.
#[derive(Debug)]
pub(crate) struct AtomicLevel(AtomicU64);

impl AtomicLevel {
    pub(crate) fn new(value: Option<f32>) -> Self {
        Self(AtomicU64::new(encode(value)))
    }

    pub(crate) fn load(&self) -> Option<f32> {
        decode(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: Option<f32>) {
        self.0.store(encode(value), Ordering::Release);
    }
}

fn encode(value: Option<f32>) -> u64 {
    match value {
        Some(v) => PRESENT | v.to_bits() as u64,
        None => 0,
    }
}

fn decode(word: u64) -> Option<f32> {
    (word & PRESENT != 0).then(|| f32::from_bits(word as u32))
}

/// Latest level reading of the active input.
///
/// Written by the capture callback, read from any thread. Peak and average
/// are separate words, so a reader racing the callback may pair a fresh peak
/// with the previous block's average.
#[derive(Debug)]
pub struct MeteringChannel {
    peak: AtomicLevel,
    average: AtomicLevel,
}

impl MeteringChannel {
    pub fn new() -> Self {
        Self {
            peak: AtomicLevel::new(None),
            average: AtomicLevel::new(None),
        }
    }

    pub fn publish(&self, levels: Levels) {
        self.peak.store(Some(levels.peak));
        self.average.store(Some(levels.average));
    }

    pub fn peak_level(&self) -> Option<f32> {
        self.peak.load()
    }

    pub fn average_level(&self) -> Option<f32> {
        self.average.load()
    }

    /// Forget the last reading
    pub fn reset(&self) {
        self.peak.store(None);
        self.average.store(None);
    }
}

impl Default for MeteringChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn constant_block_levels_match_amplitude() {
        let levels = Levels::measure(&[0.5; 256]).unwrap();

        assert_approx(levels.peak, -6.0206, 1e-3);
        assert_approx(levels.average, -6.0206, 1e-3);
    }

    #[test]
    fn sine_average_sits_three_db_below_peak() {
        let samples: Vec<f32> = (0..4800)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        let levels = Levels::measure(&samples).unwrap();

        assert_approx(levels.peak, 0.0, 1e-3);
        assert_approx(levels.average, -3.0103, 1e-2);
    }

    #[test]
    fn silence_is_clamped_to_meter_floor() {
        let levels = Levels::measure(&[0.0; 64]).unwrap();

        assert_eq!(levels.peak, MIN_LEVEL_DB);
        assert_eq!(levels.average, MIN_LEVEL_DB);
    }

    #[test]
    fn unusable_blocks_have_no_reading() {
        assert!(Levels::measure(&[]).is_none());
        assert!(Levels::measure(&[0.1, f32::NAN, 0.2]).is_none());
        assert!(Levels::measure(&[f32::INFINITY]).is_none());
    }

    #[test]
    fn gate_is_strictly_greater_than() {
        assert_eq!(gate(-20.0, Some(-30.0)), GateDecision::Forward);
        assert_eq!(gate(-30.0, Some(-30.0)), GateDecision::BelowThreshold);
        assert_eq!(gate(-40.0, Some(-30.0)), GateDecision::BelowThreshold);
    }

    #[test]
    fn missing_threshold_never_blocks() {
        assert_eq!(effective_threshold(None), OPEN_GATE_DB);
        assert_eq!(gate(MIN_LEVEL_DB, None), GateDecision::Forward);
    }

    #[test]
    fn atomic_level_round_trips_options() {
        let level = AtomicLevel::new(None);
        assert_eq!(level.load(), None);

        level.store(Some(-12.5));
        assert_eq!(level.load(), Some(-12.5));

        // A zero reading is still present
        level.store(Some(0.0));
        assert_eq!(level.load(), Some(0.0));

        level.store(None);
        assert_eq!(level.load(), None);
    }

    #[test]
    fn metering_channel_publish_and_reset() {
        let channel = MeteringChannel::new();
        assert!(channel.peak_level().is_none());
        assert!(channel.average_level().is_none());

        channel.publish(Levels {
            peak: -1.0,
            average: -4.0,
        });
        assert_eq!(channel.peak_level(), Some(-1.0));
        assert_eq!(channel.average_level(), Some(-4.0));

        channel.reset();
        assert!(channel.peak_level().is_none());
        assert!(channel.average_level().is_none());
    }
}
