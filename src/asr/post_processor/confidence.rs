//! Confidence smoothing (spec §4.3): effective confidence is a weighted
//! blend of the current call's confidence and a rolling mean of the last
//! N confidences.

use std::collections::VecDeque;

pub struct ConfidenceSmoother {
    history: VecDeque<f32>,
    window: usize,
}

impl ConfidenceSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(window.max(1)),
            window: window.max(1),
        }
    }

    /// Returns the smoothed confidence and records `current` into history.
    pub fn smooth(&mut self, current: f32) -> f32 {
        let rolling_mean = if self.history.is_empty() {
            current
        } else {
            self.history.iter().sum::<f32>() / self.history.len() as f32
        };
        let smoothed = 0.7 * current + 0.3 * rolling_mean;

        self.history.push_back(current);
        if self.history.len() > self.window {
            self.history.pop_front();
        }

        smoothed
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_has_no_history_to_blend_against() {
        let mut s = ConfidenceSmoother::new(5);
        assert_eq!(s.smooth(0.8), 0.8);
    }

    #[test]
    fn blends_toward_rolling_mean_on_subsequent_calls() {
        let mut s = ConfidenceSmoother::new(5);
        s.smooth(0.9);
        let second = s.smooth(0.1);
        assert!((second - (0.7 * 0.1 + 0.3 * 0.9)).abs() < 1e-6);
    }

    #[test]
    fn window_bounds_history_length() {
        let mut s = ConfidenceSmoother::new(2);
        for _ in 0..10 {
            s.smooth(0.5);
        }
        assert_eq!(s.history.len(), 2);
    }
}
