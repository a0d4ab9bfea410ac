//! Threshold strategies for the VAD engine (spec §4.2.2 adaptive
//! thresholding, §4.2.3 calibration-based variant). Each strategy is a
//! tagged variant of "given this frame's RMS, what threshold should the
//! state machine use right now" — the same sum-type idiom spec §9 asks for
//! ASR/translator backends, applied here to the VAD's threshold source.

use std::collections::VecDeque;

/// RMS of a frame, in dBFS (negative; 0 dB == full scale).
pub fn rms_db(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return -120.0;
    }
    let sum_sq: f32 = frame.iter().map(|&x| x * x).sum();
    let rms = (sum_sq / frame.len() as f32).sqrt();
    if rms <= 1e-9 {
        -120.0
    } else {
        20.0 * rms.log10()
    }
}

fn percentile(sorted: &[f32], pct: f32) -> f32 {
    if sorted.is_empty() {
        return -60.0;
    }
    let idx = ((sorted.len() as f32 - 1.0) * pct).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub trait ThresholdStrategy: Send {
    /// Called once per frame. `currently_silence` reflects the state
    /// machine's classification *before* this frame (so noise-floor
    /// estimators only update from genuine silence spans).
    fn update(&mut self, rms_db_value: f32, currently_silence: bool) -> f32;
    fn current_threshold(&self) -> f32;
    fn noise_floor_db(&self) -> Option<f32> {
        None
    }
}

pub struct FixedThreshold(pub f32);

impl ThresholdStrategy for FixedThreshold {
    fn update(&mut self, _rms_db_value: f32, _currently_silence: bool) -> f32 {
        self.0
    }
    fn current_threshold(&self) -> f32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentTier {
    Quiet,
    Moderate,
    Noisy,
    VeryNoisy,
}

impl EnvironmentTier {
    fn classify(floor_db: f32) -> Self {
        if floor_db < -50.0 {
            EnvironmentTier::Quiet
        } else if floor_db < -35.0 {
            EnvironmentTier::Moderate
        } else if floor_db < -20.0 {
            EnvironmentTier::Noisy
        } else {
            EnvironmentTier::VeryNoisy
        }
    }

    /// Per-tier threshold cap: quiet environments tolerate a higher
    /// threshold, noisy ones must stay low to catch speech near the floor.
    fn cap(self) -> f32 {
        match self {
            EnvironmentTier::Quiet => 0.60,
            EnvironmentTier::Moderate => 0.50,
            EnvironmentTier::Noisy => 0.40,
            EnvironmentTier::VeryNoisy => 0.30,
        }
    }
}

const LONG_WINDOW_CHUNKS: usize = 200;
const SHORT_WINDOW_CHUNKS: usize = 34; // ~1s at 30ms chunks
const FAST_ADAPT_SHIFT_DB: f32 = 10.0;
const HYSTERESIS_CONSECUTIVE: u32 = 5;

/// Environment-aware adaptive thresholding (spec §4.2.2).
pub struct AdaptiveThreshold {
    base_threshold: f32,
    long_window: VecDeque<f32>,
    short_window: VecDeque<f32>,
    noise_floor_db: f32,
    tier: EnvironmentTier,
    tier_candidate: Option<(EnvironmentTier, u32)>,
    fast_adapt_remaining: u32,
    /// When true the noise floor only drifts at the calibration variant's
    /// slow rate (~0.1% per 100 chunks) instead of the normal adaptive rate.
    slow_only: bool,
    chunks_since_drift: u32,
}

impl AdaptiveThreshold {
    pub fn new(base_threshold: f32) -> Self {
        Self {
            base_threshold,
            long_window: VecDeque::with_capacity(LONG_WINDOW_CHUNKS),
            short_window: VecDeque::with_capacity(SHORT_WINDOW_CHUNKS),
            noise_floor_db: -60.0,
            tier: EnvironmentTier::Quiet,
            tier_candidate: None,
            fast_adapt_remaining: 0,
            slow_only: false,
            chunks_since_drift: 0,
        }
    }

    /// Seed from a calibration phase (spec §4.2.3): starts at the derived
    /// floor/threshold and only ever drifts slowly thereafter.
    pub fn from_calibration(noise_floor_db: f32, starting_threshold: f32) -> Self {
        let mut s = Self::new(starting_threshold);
        s.noise_floor_db = noise_floor_db;
        s.tier = EnvironmentTier::classify(noise_floor_db);
        s.slow_only = true;
        s
    }

    fn push_silence_sample(&mut self, rms: f32) {
        self.long_window.push_back(rms);
        if self.long_window.len() > LONG_WINDOW_CHUNKS {
            self.long_window.pop_front();
        }
        self.short_window.push_back(rms);
        if self.short_window.len() > SHORT_WINDOW_CHUNKS {
            self.short_window.pop_front();
        }
    }

    fn percentile10(window: &VecDeque<f32>) -> f32 {
        let mut sorted: Vec<f32> = window.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        percentile(&sorted, 0.10)
    }
}

impl ThresholdStrategy for AdaptiveThreshold {
    fn update(&mut self, rms_db_value: f32, currently_silence: bool) -> f32 {
        if currently_silence {
            self.push_silence_sample(rms_db_value);

            if self.long_window.len() >= 5 {
                let long_p10 = Self::percentile10(&self.long_window);

                if self.slow_only {
                    // ~0.1% drift per 100 chunks
                    self.chunks_since_drift += 1;
                    if self.chunks_since_drift >= 100 {
                        self.chunks_since_drift = 0;
                        self.noise_floor_db += (long_p10 - self.noise_floor_db) * 0.001;
                    }
                } else if self.short_window.len() >= 5 {
                    let short_p10 = Self::percentile10(&self.short_window);
                    if (short_p10 - self.noise_floor_db).abs() >= FAST_ADAPT_SHIFT_DB {
                        self.fast_adapt_remaining = 66; // ~2s at 30ms chunks
                    }
                    if self.fast_adapt_remaining > 0 {
                        self.fast_adapt_remaining -= 1;
                        self.noise_floor_db += (short_p10 - self.noise_floor_db) * 0.5;
                    } else {
                        self.noise_floor_db += (long_p10 - self.noise_floor_db) * 0.05;
                    }
                }
            }

            let candidate_tier = EnvironmentTier::classify(self.noise_floor_db);
            match &mut self.tier_candidate {
                Some((tier, count)) if *tier == candidate_tier => {
                    *count += 1;
                    if *count >= HYSTERESIS_CONSECUTIVE {
                        self.tier = candidate_tier;
                        self.tier_candidate = None;
                    }
                }
                _ => {
                    if candidate_tier != self.tier {
                        self.tier_candidate = Some((candidate_tier, 1));
                    } else {
                        self.tier_candidate = None;
                    }
                }
            }
        }

        self.base_threshold.min(self.tier.cap())
    }

    fn current_threshold(&self) -> f32 {
        self.base_threshold.min(self.tier.cap())
    }

    fn noise_floor_db(&self) -> Option<f32> {
        Some(self.noise_floor_db)
    }
}

/// Derives the calibration-phase starting threshold from the measured
/// noise floor (spec §4.2.3's piecewise function).
pub fn calibration_starting_threshold(noise_floor_db: f32) -> f32 {
    if noise_floor_db < -60.0 {
        0.35
    } else if noise_floor_db < -50.0 {
        0.40
    } else if noise_floor_db < -40.0 {
        0.45
    } else if noise_floor_db < -30.0 {
        0.50
    } else {
        0.55
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_threshold_piecewise() {
        assert_eq!(calibration_starting_threshold(-70.0), 0.35);
        assert_eq!(calibration_starting_threshold(-55.0), 0.40);
        assert_eq!(calibration_starting_threshold(-45.0), 0.45);
        assert_eq!(calibration_starting_threshold(-35.0), 0.50);
        assert_eq!(calibration_starting_threshold(-10.0), 0.55);
    }

    #[test]
    fn adaptive_threshold_caps_in_noisy_tier() {
        let mut thr = AdaptiveThreshold::new(0.9);
        for _ in 0..50 {
            thr.update(-15.0, true);
        }
        assert!(thr.current_threshold() <= EnvironmentTier::VeryNoisy.cap());
    }

    #[test]
    fn quiet_room_keeps_high_cap() {
        let mut thr = AdaptiveThreshold::new(0.5);
        for _ in 0..10 {
            thr.update(-70.0, true);
        }
        assert_eq!(thr.current_threshold(), 0.5);
    }
}
