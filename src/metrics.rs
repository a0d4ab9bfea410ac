//! Streaming metrics (spec §6 "Metrics surface"). Grounded in
//! `streaming_metrics.py`'s `StreamingMetricsCollector`, with the
//! module-level `_global_collector` singleton replaced by an explicit
//! object the orchestrator owns and passes by reference (spec §9).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::text_match::matching_block_ratio;

/// TTFT target (spec §6): first-draft-emit minus segment-start.
pub const TARGET_TTFT_MS: f64 = 2000.0;
/// Meaning-latency target: first-translation-emit minus segment-start.
pub const TARGET_MEANING_LATENCY_MS: f64 = 2000.0;
/// Ear-to-voice-lag target: final-emit minus segment-end.
pub const TARGET_EAR_TO_VOICE_LAG_MS: f64 = 500.0;
/// Draft-stability target.
pub const TARGET_STABILITY: f64 = 0.7;
/// Loss-rate target: zero segments silently lost.
pub const TARGET_LOSS_RATE: f64 = 0.0;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Default)]
struct SegmentMetrics {
    segment_id: u64,
    speech_start_time: f64,
    speech_end_time: f64,
    first_draft_time: f64,
    first_meaning_time: f64,
    final_output_time: f64,
    asr_calls: u64,
    draft_count: u64,
    last_draft_text: String,
    final_text: String,
}

/// A point-in-time read of the rolling averages (spec §6 "polled
/// snapshot").
#[derive(Debug, Clone, Default)]
pub struct StreamingMetricsSnapshot {
    pub timestamp: f64,
    pub avg_ttft_ms: f64,
    pub avg_meaning_latency_ms: f64,
    pub avg_ear_to_voice_lag_ms: f64,
    pub avg_draft_stability: f64,
    pub avg_asr_calls_per_segment: f64,
    pub segments_processed: u64,
    pub drafts_generated: u64,
    pub cache_hits: u64,
    pub asr_call_frequency: f64,
    pub loss_rate: f64,
}

impl StreamingMetricsSnapshot {
    pub fn meets_all_targets(&self) -> bool {
        self.avg_ttft_ms < TARGET_TTFT_MS
            && self.avg_meaning_latency_ms < TARGET_MEANING_LATENCY_MS
            && self.avg_ear_to_voice_lag_ms < TARGET_EAR_TO_VOICE_LAG_MS
            && self.avg_draft_stability > TARGET_STABILITY
            && self.loss_rate <= TARGET_LOSS_RATE
    }
}

struct Inner {
    segments: HashMap<Uuid, SegmentMetrics>,
    ttft_history: VecDeque<f64>,
    meaning_latency_history: VecDeque<f64>,
    ear_to_voice_history: VecDeque<f64>,
    stability_history: VecDeque<f64>,
    total_asr_calls: u64,
    total_segments: u64,
    total_drafts: u64,
    total_dropped: u64,
    total_errors: u64,
    cache_hits: u64,
    started_at: f64,
}

/// Collects per-segment timing and computes rolling averages over a bounded
/// history (spec §6: "a polled snapshot"). One instance per pipeline run,
/// shared by reference (`Arc<StreamingMetricsCollector>`) into every stage.
pub struct StreamingMetricsCollector {
    inner: Mutex<Inner>,
    history_size: usize,
}

impl StreamingMetricsCollector {
    pub fn new(history_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                segments: HashMap::new(),
                ttft_history: VecDeque::with_capacity(history_size),
                meaning_latency_history: VecDeque::with_capacity(history_size),
                ear_to_voice_history: VecDeque::with_capacity(history_size),
                stability_history: VecDeque::with_capacity(history_size),
                total_asr_calls: 0,
                total_segments: 0,
                total_drafts: 0,
                total_dropped: 0,
                total_errors: 0,
                cache_hits: 0,
                started_at: now_secs(),
            }),
            history_size: history_size.max(1),
        }
    }

    fn push_bounded(history: &mut VecDeque<f64>, value: f64, cap: usize) {
        if history.len() >= cap {
            history.pop_front();
        }
        history.push_back(value);
    }

    pub fn start_segment(&self, segment_uuid: Uuid, segment_id: u64) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        inner.segments.insert(
            segment_uuid,
            SegmentMetrics {
                segment_id,
                speech_start_time: now_secs(),
                ..Default::default()
            },
        );
        inner.total_segments += 1;
    }

    pub fn record_speech_end(&self, segment_uuid: Uuid) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        if let Some(m) = inner.segments.get_mut(&segment_uuid) {
            m.speech_end_time = now_secs();
        }
    }

    pub fn record_first_draft(&self, segment_uuid: Uuid, draft_text: &str) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        let cap = self.history_size;
        if let Some(m) = inner.segments.get_mut(&segment_uuid) {
            let is_first = m.first_draft_time == 0.0;
            let start = m.speech_start_time;
            m.last_draft_text = draft_text.to_string();
            m.draft_count += 1;
            if is_first {
                let now = now_secs();
                m.first_draft_time = now;
                let ttft_ms = (now - start) * 1000.0;
                Self::push_bounded(&mut inner.ttft_history, ttft_ms, cap);
            }
        }
        inner.total_drafts += 1;
    }

    pub fn record_first_translation(&self, segment_uuid: Uuid) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        let cap = self.history_size;
        if let Some(m) = inner.segments.get_mut(&segment_uuid) {
            if m.first_meaning_time == 0.0 {
                let now = now_secs();
                m.first_meaning_time = now;
                let latency_ms = (now - m.speech_start_time) * 1000.0;
                Self::push_bounded(&mut inner.meaning_latency_history, latency_ms, cap);
            }
        }
    }

    pub fn record_final_output(&self, segment_uuid: Uuid, final_text: &str) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        let cap = self.history_size;
        let Some(m) = inner.segments.get_mut(&segment_uuid) else {
            return;
        };
        let now = now_secs();
        m.final_output_time = now;
        m.final_text = final_text.to_string();

        let lag_ms = if m.speech_end_time > 0.0 {
            Some((now - m.speech_end_time) * 1000.0)
        } else {
            None
        };
        let stability = if !m.last_draft_text.is_empty() && !m.final_text.is_empty() {
            let draft_words: Vec<&str> = m.last_draft_text.split_whitespace().collect();
            let final_words: Vec<&str> = m.final_text.split_whitespace().collect();
            Some(matching_block_ratio(&draft_words, &final_words) as f64)
        } else {
            None
        };

        if let Some(lag) = lag_ms {
            Self::push_bounded(&mut inner.ear_to_voice_history, lag, cap);
        }
        if let Some(stability) = stability {
            Self::push_bounded(&mut inner.stability_history, stability, cap);
        }
        inner.segments.remove(&segment_uuid);
    }

    /// Drops a segment's in-progress metrics entry without contributing a
    /// sample to any rolling average — used when a segment is dropped or
    /// errored before reaching `record_final_output`, so `segments` doesn't
    /// grow unbounded over a long-running session.
    pub fn abandon_segment(&self, segment_uuid: Uuid) {
        self.inner.lock().expect("metrics mutex poisoned").segments.remove(&segment_uuid);
    }

    pub fn record_asr_call(&self, segment_uuid: Uuid) {
        let mut inner = self.inner.lock().expect("metrics mutex poisoned");
        if let Some(m) = inner.segments.get_mut(&segment_uuid) {
            m.asr_calls += 1;
        }
        inner.total_asr_calls += 1;
    }

    pub fn record_cache_hit(&self) {
        self.inner.lock().expect("metrics mutex poisoned").cache_hits += 1;
    }

    pub fn record_dropped(&self) {
        self.inner.lock().expect("metrics mutex poisoned").total_dropped += 1;
    }

    pub fn record_error(&self) {
        self.inner.lock().expect("metrics mutex poisoned").total_errors += 1;
    }

    fn average(history: &VecDeque<f64>) -> f64 {
        if history.is_empty() {
            0.0
        } else {
            history.iter().sum::<f64>() / history.len() as f64
        }
    }

    pub fn snapshot(&self) -> StreamingMetricsSnapshot {
        let inner = self.inner.lock().expect("metrics mutex poisoned");
        let elapsed = (now_secs() - inner.started_at).max(0.0);

        let created = inner.total_segments;
        let loss_rate = if created == 0 {
            0.0
        } else {
            (inner.total_dropped + inner.total_errors) as f64 / created as f64
        };

        StreamingMetricsSnapshot {
            timestamp: now_secs(),
            avg_ttft_ms: Self::average(&inner.ttft_history),
            avg_meaning_latency_ms: Self::average(&inner.meaning_latency_history),
            avg_ear_to_voice_lag_ms: Self::average(&inner.ear_to_voice_history),
            avg_draft_stability: Self::average(&inner.stability_history),
            avg_asr_calls_per_segment: if inner.total_segments > 0 {
                inner.total_asr_calls as f64 / inner.total_segments as f64
            } else {
                0.0
            },
            segments_processed: inner.total_segments,
            drafts_generated: inner.total_drafts,
            cache_hits: inner.cache_hits,
            asr_call_frequency: if elapsed > 0.0 {
                inner.total_asr_calls as f64 / elapsed
            } else {
                0.0
            },
            loss_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn ttft_measures_start_to_first_draft() {
        let collector = StreamingMetricsCollector::new(100);
        let uuid = Uuid::new_v4();
        collector.start_segment(uuid, 1);
        sleep(Duration::from_millis(5));
        collector.record_first_draft(uuid, "hello");

        let snapshot = collector.snapshot();
        assert!(snapshot.avg_ttft_ms >= 4.0);
        assert_eq!(snapshot.drafts_generated, 1);
    }

    #[test]
    fn only_first_draft_counts_toward_ttft() {
        let collector = StreamingMetricsCollector::new(100);
        let uuid = Uuid::new_v4();
        collector.start_segment(uuid, 1);
        collector.record_first_draft(uuid, "hello");
        collector.record_first_draft(uuid, "hello world");
        let snapshot = collector.snapshot();
        // Two drafts recorded, but only one TTFT sample.
        assert_eq!(snapshot.drafts_generated, 2);
    }

    #[test]
    fn final_output_computes_ear_to_voice_lag_and_stability() {
        let collector = StreamingMetricsCollector::new(100);
        let uuid = Uuid::new_v4();
        collector.start_segment(uuid, 1);
        collector.record_first_draft(uuid, "hello world");
        collector.record_speech_end(uuid);
        sleep(Duration::from_millis(5));
        collector.record_final_output(uuid, "hello world today");

        let snapshot = collector.snapshot();
        assert!(snapshot.avg_ear_to_voice_lag_ms >= 4.0);
        assert!(snapshot.avg_draft_stability > 0.0);
    }

    #[test]
    fn loss_rate_accounts_for_drops_and_errors() {
        let collector = StreamingMetricsCollector::new(100);
        collector.start_segment(Uuid::new_v4(), 1);
        collector.start_segment(Uuid::new_v4(), 2);
        collector.record_dropped();
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.loss_rate, 0.5);
    }

    #[test]
    fn history_is_bounded_to_configured_size() {
        let collector = StreamingMetricsCollector::new(2);
        for i in 0..5u64 {
            let uuid = Uuid::new_v4();
            collector.start_segment(uuid, i);
            collector.record_first_draft(uuid, "hi");
        }
        // No panic, and averaging still works with only the last two kept.
        let snapshot = collector.snapshot();
        assert!(snapshot.avg_ttft_ms >= 0.0);
    }

    #[test]
    fn zero_segments_has_zero_loss_rate_not_nan() {
        let collector = StreamingMetricsCollector::new(10);
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.loss_rate, 0.0);
    }
}
