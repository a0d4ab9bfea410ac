//! Adaptive draft scheduling (spec §4.5): decides whether it's worth
//! running another draft ASR+translation pass on a segment still being
//! spoken, trading latency against wasted work. Grounded in
//! `adaptive_controller.py`'s `AdaptiveDraftController`, extended with a
//! fourth gate the original doesn't have: a minimum-accumulated-audio floor,
//! so the very first sliver of a segment never gets drafted before there's
//! enough signal for a useful transcript.

use std::time::{Duration, Instant};

/// Why a draft pass was skipped this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooSoonSinceLastDraft,
    StillSpeaking,
    QueueBackpressure,
    InsufficientAudio,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::TooSoonSinceLastDraft => "too_soon_since_last_draft",
            SkipReason::StillSpeaking => "still_speaking",
            SkipReason::QueueBackpressure => "queue_backpressure",
            SkipReason::InsufficientAudio => "insufficient_audio",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DraftControllerStats {
    pub drafts_requested: u64,
    pub skipped_too_soon: u64,
    pub skipped_still_speaking: u64,
    pub skipped_backpressure: u64,
    pub skipped_insufficient_audio: u64,
}

impl DraftControllerStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooSoonSinceLastDraft => self.skipped_too_soon += 1,
            SkipReason::StillSpeaking => self.skipped_still_speaking += 1,
            SkipReason::QueueBackpressure => self.skipped_backpressure += 1,
            SkipReason::InsufficientAudio => self.skipped_insufficient_audio += 1,
        }
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped_too_soon
            + self.skipped_still_speaking
            + self.skipped_backpressure
            + self.skipped_insufficient_audio
    }
}

/// Four short-circuit gates, evaluated in order so the cheapest check runs
/// first (spec §4.5 "Gate order: interval, pause, backpressure, minimum
/// audio" — each gate short-circuits the rest).
pub struct AdaptiveDraftController {
    draft_interval: Duration,
    pause_threshold: Duration,
    max_queue_depth: usize,
    min_speech_duration: Duration,
    last_draft_at: Option<Instant>,
    stats: DraftControllerStats,
}

impl AdaptiveDraftController {
    pub fn new(
        draft_interval_ms: u64,
        pause_threshold_ms: u64,
        max_queue_depth: usize,
        min_speech_duration_ms: u64,
    ) -> Self {
        Self {
            draft_interval: Duration::from_millis(draft_interval_ms),
            pause_threshold: Duration::from_millis(pause_threshold_ms),
            max_queue_depth,
            min_speech_duration: Duration::from_millis(min_speech_duration_ms),
            last_draft_at: None,
            stats: DraftControllerStats::default(),
        }
    }

    /// Decides whether to emit a draft right now.
    ///
    /// - `time_since_last_speech`: how long since audio was last observed as
    ///   speech (a short value means the speaker is mid-utterance).
    /// - `current_queue_depth`: the ASR-in queue's current depth.
    /// - `accumulated_speech_duration`: total speech audio gathered so far
    ///   for the in-progress segment.
    pub fn should_draft(
        &mut self,
        now: Instant,
        time_since_last_speech: Duration,
        current_queue_depth: usize,
        accumulated_speech_duration: Duration,
    ) -> Result<(), SkipReason> {
        if let Some(last) = self.last_draft_at {
            if now.duration_since(last) < self.draft_interval {
                self.stats.record_skip(SkipReason::TooSoonSinceLastDraft);
                return Err(SkipReason::TooSoonSinceLastDraft);
            }
        }

        if time_since_last_speech > self.pause_threshold {
            self.stats.record_skip(SkipReason::StillSpeaking);
            return Err(SkipReason::StillSpeaking);
        }

        if current_queue_depth > self.max_queue_depth {
            self.stats.record_skip(SkipReason::QueueBackpressure);
            return Err(SkipReason::QueueBackpressure);
        }

        if accumulated_speech_duration < self.min_speech_duration {
            self.stats.record_skip(SkipReason::InsufficientAudio);
            return Err(SkipReason::InsufficientAudio);
        }

        self.last_draft_at = Some(now);
        self.stats.drafts_requested += 1;
        Ok(())
    }

    pub fn stats(&self) -> DraftControllerStats {
        self.stats
    }

    pub fn reset_timer(&mut self) {
        self.last_draft_at = None;
    }
}

/// Time-only variant (spec §4.5 "Simple mode"): drafts purely on a fixed
/// cadence, ignoring pause/backpressure/audio-floor gating. Used when a
/// caller wants predictable draft timing over adaptive responsiveness.
pub struct SimpleDraftController {
    draft_interval: Duration,
    last_draft_at: Option<Instant>,
}

impl SimpleDraftController {
    pub fn new(draft_interval_ms: u64) -> Self {
        Self {
            draft_interval: Duration::from_millis(draft_interval_ms),
            last_draft_at: None,
        }
    }

    pub fn should_draft(&mut self, now: Instant) -> bool {
        let due = match self.last_draft_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.draft_interval,
        };
        if due {
            self.last_draft_at = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_gated_only_by_pause_backpressure_and_audio_floor() {
        let mut controller = AdaptiveDraftController::new(2000, 500, 10, 250);
        let now = Instant::now();
        let result = controller.should_draft(
            now,
            Duration::from_millis(100),
            2,
            Duration::from_millis(500),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn too_soon_after_previous_draft_is_skipped() {
        let mut controller = AdaptiveDraftController::new(2000, 500, 10, 250);
        let t0 = Instant::now();
        controller
            .should_draft(t0, Duration::from_millis(0), 0, Duration::from_millis(500))
            .unwrap();
        let t1 = t0 + Duration::from_millis(500);
        let result = controller.should_draft(t1, Duration::from_millis(0), 0, Duration::from_millis(500));
        assert_eq!(result, Err(SkipReason::TooSoonSinceLastDraft));
    }

    #[test]
    fn long_pause_since_speech_is_skipped_as_still_speaking_gate() {
        let mut controller = AdaptiveDraftController::new(0, 500, 10, 0);
        let now = Instant::now();
        let result = controller.should_draft(now, Duration::from_millis(900), 0, Duration::from_millis(0));
        assert_eq!(result, Err(SkipReason::StillSpeaking));
    }

    #[test]
    fn queue_over_capacity_is_backpressure_skip() {
        let mut controller = AdaptiveDraftController::new(0, 500, 5, 0);
        let now = Instant::now();
        let result = controller.should_draft(now, Duration::from_millis(0), 9, Duration::from_millis(0));
        assert_eq!(result, Err(SkipReason::QueueBackpressure));
    }

    #[test]
    fn insufficient_accumulated_audio_is_skipped() {
        let mut controller = AdaptiveDraftController::new(0, 500, 10, 250);
        let now = Instant::now();
        let result = controller.should_draft(now, Duration::from_millis(0), 0, Duration::from_millis(50));
        assert_eq!(result, Err(SkipReason::InsufficientAudio));
    }

    #[test]
    fn stats_tally_matches_skip_reasons() {
        let mut controller = AdaptiveDraftController::new(0, 500, 5, 250);
        let now = Instant::now();
        let _ = controller.should_draft(now, Duration::from_millis(900), 0, Duration::from_millis(0));
        let _ = controller.should_draft(now, Duration::from_millis(0), 9, Duration::from_millis(0));
        let stats = controller.stats();
        assert_eq!(stats.skipped_still_speaking, 1);
        assert_eq!(stats.skipped_backpressure, 1);
        assert_eq!(stats.total_skipped(), 2);
    }

    #[test]
    fn simple_controller_fires_once_per_interval() {
        let mut controller = SimpleDraftController::new(1000);
        let t0 = Instant::now();
        assert!(controller.should_draft(t0));
        assert!(!controller.should_draft(t0 + Duration::from_millis(500)));
        assert!(controller.should_draft(t0 + Duration::from_millis(1100)));
    }
}
