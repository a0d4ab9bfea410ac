//! Segment tracker (spec §4.6.5): an end-to-end trace of every
//! `SpeechSegment` by UUID, guaranteeing no segment is silently lost.
//! Grounded in `segment_tracker.py`'s `SegmentTracker`/`SegmentTrace`, with
//! the global-singleton pattern replaced by an explicit context object
//! constructed once and shared by reference into each worker (spec §9
//! "Global tracker/monitor singletons... re-architect as an explicit
//! context object").

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, error};
use uuid::Uuid;

use crate::pipeline::segment::{DropReason, PipelineStage};

/// One segment's journey through the pipeline (spec §3 "Segment Trace").
#[derive(Debug, Clone)]
pub struct SegmentTrace {
    pub segment_id: u64,
    pub uuid: Uuid,
    pub created_at: Instant,
    pub stage_timestamps: Vec<(PipelineStage, Instant)>,
    pub current_stage: PipelineStage,
    pub error_message: Option<String>,
    pub drop_reason: Option<DropReason>,
    pub asr_text: Option<String>,
    pub translation_text: Option<String>,
}

impl SegmentTrace {
    fn new(segment_id: u64, uuid: Uuid) -> Self {
        let now = Instant::now();
        Self {
            segment_id,
            uuid,
            created_at: now,
            stage_timestamps: vec![(PipelineStage::VadQueued, now)],
            current_stage: PipelineStage::VadQueued,
            error_message: None,
            drop_reason: None,
            asr_text: None,
            translation_text: None,
        }
    }

    pub fn time_at(&self, stage: PipelineStage) -> Option<Instant> {
        self.stage_timestamps
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, t)| *t)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.current_stage,
            PipelineStage::OutputEmitted | PipelineStage::Dropped | PipelineStage::Error
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    pub total_created: u64,
    pub total_emitted: u64,
    pub total_dropped: u64,
    pub total_errors: u64,
    pub in_flight: u64,
}

impl TrackerStats {
    /// spec §8 invariant: `created == emitted + dropped + errors + in_flight`.
    pub fn accounted_for(&self) -> bool {
        self.total_created
            == self.total_emitted + self.total_dropped + self.total_errors + self.in_flight
    }

    pub fn loss_rate(&self) -> f64 {
        if self.total_created == 0 {
            return 0.0;
        }
        (self.total_dropped + self.total_errors) as f64 / self.total_created as f64
    }
}

struct Inner {
    traces: HashMap<Uuid, SegmentTrace>,
    stats: TrackerStats,
}

/// One mutex over all mutable state (spec §5 "each protected by a single
/// mutex guarding their internal maps and counters"). Constructed once and
/// shared by reference (`Arc<SegmentTracker>`) into every worker.
pub struct SegmentTracker {
    inner: Mutex<Inner>,
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                traces: HashMap::new(),
                stats: TrackerStats::default(),
            }),
        }
    }

    /// Registers a new segment at VAD emission time (spec §4.6.5 "Every
    /// Speech Segment gets a UUID at VAD emission").
    pub fn create(&self, segment_id: u64, uuid: Uuid) {
        let mut inner = self.inner.lock().expect("tracker mutex poisoned");
        inner.traces.insert(uuid, SegmentTrace::new(segment_id, uuid));
        inner.stats.total_created += 1;
        inner.stats.in_flight += 1;
        debug!("tracker: segment {segment_id} ({uuid}) created");
    }

    /// Appends a stage transition (spec §3 "append-only... monotonically
    /// non-decreasing").
    pub fn advance(&self, uuid: Uuid, stage: PipelineStage) {
        let mut inner = self.inner.lock().expect("tracker mutex poisoned");
        let Some(trace) = inner.traces.get_mut(&uuid) else {
            return;
        };
        trace.stage_timestamps.push((stage, Instant::now()));
        trace.current_stage = stage;

        match stage {
            PipelineStage::OutputEmitted => {
                inner.stats.total_emitted += 1;
                inner.stats.in_flight = inner.stats.in_flight.saturating_sub(1);
            }
            PipelineStage::Dropped => {
                inner.stats.total_dropped += 1;
                inner.stats.in_flight = inner.stats.in_flight.saturating_sub(1);
            }
            _ => {}
        }
    }

    pub fn record_drop(&self, uuid: Uuid, reason: DropReason) {
        {
            let mut inner = self.inner.lock().expect("tracker mutex poisoned");
            if let Some(trace) = inner.traces.get_mut(&uuid) {
                trace.drop_reason = Some(reason.clone());
            }
        }
        error!("segment {uuid} dropped: {reason}");
        self.advance(uuid, PipelineStage::Dropped);
    }

    /// Records an inference/backend error (spec §7: "Log; mark segment's
    /// stage ERROR; do not kill worker; segment counted in `total_errors`").
    /// A final that errors out has no retry path back into the pipeline, so
    /// this is terminal for the segment: `in_flight` is decremented here,
    /// the same as `record_drop`, to keep `created == emitted + dropped +
    /// errors + in_flight` holding (spec §3, §8).
    pub fn record_error(&self, uuid: Uuid, message: impl Into<String>) {
        let message = message.into();
        {
            let mut inner = self.inner.lock().expect("tracker mutex poisoned");
            if let Some(trace) = inner.traces.get_mut(&uuid) {
                trace.error_message = Some(message.clone());
            }
            inner.stats.total_errors += 1;
            inner.stats.in_flight = inner.stats.in_flight.saturating_sub(1);
        }
        error!("segment {uuid} error: {message}");
        self.advance(uuid, PipelineStage::Error);
    }

    pub fn record_asr_text(&self, uuid: Uuid, text: &str) {
        let mut inner = self.inner.lock().expect("tracker mutex poisoned");
        if let Some(trace) = inner.traces.get_mut(&uuid) {
            trace.asr_text = Some(text.to_string());
        }
    }

    pub fn record_translation_text(&self, uuid: Uuid, text: &str) {
        let mut inner = self.inner.lock().expect("tracker mutex poisoned");
        if let Some(trace) = inner.traces.get_mut(&uuid) {
            trace.translation_text = Some(text.to_string());
        }
    }

    pub fn stats(&self) -> TrackerStats {
        self.inner.lock().expect("tracker mutex poisoned").stats.clone()
    }

    pub fn trace(&self, uuid: Uuid) -> Option<SegmentTrace> {
        self.inner
            .lock()
            .expect("tracker mutex poisoned")
            .traces
            .get(&uuid)
            .cloned()
    }

    pub fn incomplete_traces(&self) -> Vec<SegmentTrace> {
        self.inner
            .lock()
            .expect("tracker mutex poisoned")
            .traces
            .values()
            .filter(|t| !t.is_terminal())
            .cloned()
            .collect()
    }

    pub fn dropped_traces(&self) -> Vec<SegmentTrace> {
        self.inner
            .lock()
            .expect("tracker mutex poisoned")
            .traces
            .values()
            .filter(|t| t.current_stage == PipelineStage::Dropped)
            .cloned()
            .collect()
    }
}

impl Default for SegmentTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_equals_emitted_plus_dropped_plus_errors_plus_in_flight() {
        let tracker = SegmentTracker::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        tracker.create(1, a);
        tracker.create(2, b);
        tracker.create(3, c);

        tracker.advance(a, PipelineStage::OutputEmitted);
        tracker.record_drop(b, DropReason::QueueFull("asr_queue".into()));
        // c stays in flight

        let stats = tracker.stats();
        assert!(stats.accounted_for());
        assert_eq!(stats.total_created, 3);
        assert_eq!(stats.total_emitted, 1);
        assert_eq!(stats.total_dropped, 1);
        assert_eq!(stats.in_flight, 1);
    }

    #[test]
    fn dropped_segment_is_listed_and_has_a_reason() {
        let tracker = SegmentTracker::new();
        let uuid = Uuid::new_v4();
        tracker.create(1, uuid);
        tracker.record_drop(uuid, DropReason::Hallucination);

        let dropped = tracker.dropped_traces();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].drop_reason, Some(DropReason::Hallucination));
    }

    #[test]
    fn errored_segment_leaves_in_flight_and_stays_accounted_for() {
        let tracker = SegmentTracker::new();
        let uuid = Uuid::new_v4();
        tracker.create(1, uuid);
        tracker.record_error(uuid, "inference failed");

        let stats = tracker.stats();
        assert!(stats.accounted_for());
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.in_flight, 0);
        assert!(tracker.incomplete_traces().is_empty());
    }

    #[test]
    fn in_flight_segment_is_incomplete() {
        let tracker = SegmentTracker::new();
        let uuid = Uuid::new_v4();
        tracker.create(1, uuid);
        assert_eq!(tracker.incomplete_traces().len(), 1);
        tracker.advance(uuid, PipelineStage::OutputEmitted);
        assert_eq!(tracker.incomplete_traces().len(), 0);
    }
}
