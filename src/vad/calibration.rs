//! Calibration-based VAD variant (spec §4.2.3, §3 "Calibration State").
//! Transitions are strictly forward: NOT_STARTED -> CALIBRATING ->
//! CALIBRATED. `CALIBRATED` is terminal for this object: the caller
//! immediately consumes it via `into_adaptive_threshold` and the VAD engine
//! itself carries on into live detection (`VadEngine`'s `ThresholdSource`
//! switches from `Calibrating` to `Adaptive`), so "detecting" is a phase of
//! the engine, not of `CalibrationState`.

use super::threshold::{calibration_starting_threshold, rms_db, AdaptiveThreshold};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    NotStarted,
    Calibrating,
    Calibrated,
}

pub struct CalibrationState {
    phase: CalibrationPhase,
    rms_values_db: Vec<f32>,
    target_chunks: usize,
    safety_cap_chunks: usize,
    noise_floor_db: Option<f32>,
    threshold: Option<f32>,
}

impl CalibrationState {
    /// `chunk_ms` is used to translate the default 3s window (minimum 10
    /// chunks) and a safety cap (10s) into chunk counts.
    pub fn new(chunk_ms: u32) -> Self {
        let chunks_per_3s = ((3000 + chunk_ms as u64 - 1) / chunk_ms as u64) as usize;
        let target_chunks = chunks_per_3s.max(10);
        let safety_cap_chunks =
            (((10_000 + chunk_ms as u64 - 1) / chunk_ms as u64) as usize).max(target_chunks);
        Self {
            phase: CalibrationPhase::NotStarted,
            rms_values_db: Vec::with_capacity(target_chunks),
            target_chunks,
            safety_cap_chunks,
            noise_floor_db: None,
            threshold: None,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.phase, CalibrationPhase::Calibrated)
    }

    /// Feed one frame's RMS during calibration. Returns `true` once
    /// calibration has just completed this call.
    pub fn observe(&mut self, frame: &[f32]) -> bool {
        if self.is_calibrated() {
            return false;
        }
        if self.phase == CalibrationPhase::NotStarted {
            self.phase = CalibrationPhase::Calibrating;
        }
        self.rms_values_db.push(rms_db(frame));

        if self.rms_values_db.len() >= self.target_chunks
            || self.rms_values_db.len() >= self.safety_cap_chunks
        {
            self.finish_calibration();
            true
        } else {
            false
        }
    }

    fn finish_calibration(&mut self) {
        let mut sorted = self.rms_values_db.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f32 - 1.0) * 0.10).round() as usize;
        let floor = sorted[idx.min(sorted.len() - 1)];
        let threshold = calibration_starting_threshold(floor);
        self.noise_floor_db = Some(floor);
        self.threshold = Some(threshold);
        self.phase = CalibrationPhase::Calibrated;
    }

    /// Build the post-calibration slow-adapting threshold strategy. Panics
    /// if calibration has not completed — callers must check
    /// `is_calibrated()` first.
    pub fn into_adaptive_threshold(self) -> AdaptiveThreshold {
        let floor = self.noise_floor_db.expect("calibration not complete");
        let threshold = self.threshold.expect("calibration not complete");
        AdaptiveThreshold::from_calibration(floor, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_completes_after_minimum_chunks_and_derives_floor() {
        let mut cal = CalibrationState::new(30);
        let quiet_frame = vec![0.001f32; 480];
        let mut done = false;
        for _ in 0..200 {
            done = cal.observe(&quiet_frame);
            if done {
                break;
            }
        }
        assert!(done);
        assert_eq!(cal.phase(), CalibrationPhase::Calibrated);
        assert!(cal.is_calibrated());
    }

    #[test]
    fn phase_transitions_are_strictly_forward() {
        let mut cal = CalibrationState::new(30);
        assert_eq!(cal.phase(), CalibrationPhase::NotStarted);
        cal.observe(&[0.0f32; 480]);
        assert_eq!(cal.phase(), CalibrationPhase::Calibrating);
    }
}
