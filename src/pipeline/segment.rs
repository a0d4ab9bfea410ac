//! The segment data model (spec §3): `SpeechSegment` is VAD's emission,
//! `PipelineSegment` is the mutable envelope that carries it through the
//! downstream stages.

use std::time::Instant;

use uuid::Uuid;

use crate::asr::types::AsrResult;
use crate::translation::types::TranslationResult;

/// A contiguous span of speech detected by the VAD engine.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub id: u64,
    pub uuid: Uuid,
    /// Seconds since session start.
    pub start_time: f64,
    pub end_time: f64,
    pub audio: Vec<f32>,
    /// Mean speech probability over the frames comprising the segment.
    pub vad_confidence: f32,
    /// True when produced by a forced split rather than detected silence.
    pub is_partial: bool,
}

impl SpeechSegment {
    pub fn duration_ms(&self) -> f64 {
        (self.end_time - self.start_time) * 1000.0
    }
}

/// The stage a `PipelineSegment` currently occupies, mirroring the
/// tracker's stage vocabulary (spec §4.6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    VadQueued,
    VadProcessed,
    AsrQueued,
    AsrProcessing,
    AsrComplete,
    TranslationQueued,
    TranslationProcessing,
    TranslationComplete,
    OutputQueued,
    OutputEmitted,
    Dropped,
    Error,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::VadQueued => "VAD_QUEUED",
            PipelineStage::VadProcessed => "VAD_PROCESSED",
            PipelineStage::AsrQueued => "ASR_QUEUED",
            PipelineStage::AsrProcessing => "ASR_PROCESSING",
            PipelineStage::AsrComplete => "ASR_COMPLETE",
            PipelineStage::TranslationQueued => "TRANSLATION_QUEUED",
            PipelineStage::TranslationProcessing => "TRANSLATION_PROCESSING",
            PipelineStage::TranslationComplete => "TRANSLATION_COMPLETE",
            PipelineStage::OutputQueued => "OUTPUT_QUEUED",
            PipelineStage::OutputEmitted => "OUTPUT_EMITTED",
            PipelineStage::Dropped => "DROPPED",
            PipelineStage::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// Why a segment never reached Output.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    QueueFull(String),
    Hallucination,
    LowQuality,
    Other(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::QueueFull(name) => write!(f, "{name} full"),
            DropReason::Hallucination => write!(f, "hallucination"),
            DropReason::LowQuality => write!(f, "low_quality"),
            DropReason::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// The mutable envelope a `SpeechSegment` travels in through ASR and
/// translation. Exactly one per `SpeechSegment`; destroyed on emission or
/// drop.
#[derive(Debug, Clone)]
pub struct PipelineSegment {
    pub speech: SpeechSegment,
    pub is_final: bool,
    pub asr_result: Option<AsrResult>,
    pub translation_result: Option<TranslationResult>,
    pub stage: PipelineStage,
    pub error: Option<String>,
    pub drop_reason: Option<DropReason>,
    /// Monotonically appended (stage, wall-clock instant) pairs.
    pub timestamps: Vec<(PipelineStage, Instant)>,
}

impl PipelineSegment {
    pub fn new(speech: SpeechSegment, is_final: bool) -> Self {
        let mut seg = Self {
            speech,
            is_final,
            asr_result: None,
            translation_result: None,
            stage: PipelineStage::VadQueued,
            error: None,
            drop_reason: None,
            timestamps: Vec::new(),
        };
        seg.advance(PipelineStage::VadQueued);
        seg
    }

    /// Append-only, monotonically non-decreasing stage transition (spec §3
    /// invariant: "A Pipeline Segment's stage-timestamp map is append-only").
    pub fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.timestamps.push((stage, Instant::now()));
    }

    pub fn mark_dropped(&mut self, reason: DropReason) {
        self.drop_reason = Some(reason);
        self.advance(PipelineStage::Dropped);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.advance(PipelineStage::Error);
    }

    pub fn time_at(&self, stage: PipelineStage) -> Option<Instant> {
        self.timestamps
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, t)| *t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_speech() -> SpeechSegment {
        SpeechSegment {
            id: 1,
            uuid: Uuid::new_v4(),
            start_time: 0.0,
            end_time: 1.0,
            audio: vec![0.0; 16_000],
            vad_confidence: 0.9,
            is_partial: false,
        }
    }

    #[test]
    fn timestamps_are_append_only() {
        let mut seg = PipelineSegment::new(sample_speech(), false);
        seg.advance(PipelineStage::AsrQueued);
        seg.advance(PipelineStage::AsrComplete);
        assert_eq!(seg.timestamps.len(), 3);
        assert_eq!(seg.timestamps[0].0, PipelineStage::VadQueued);
        assert_eq!(seg.timestamps[2].0, PipelineStage::AsrComplete);
    }

    #[test]
    fn drop_sets_terminal_stage_and_reason() {
        let mut seg = PipelineSegment::new(sample_speech(), false);
        seg.mark_dropped(DropReason::QueueFull("asr_queue".into()));
        assert_eq!(seg.stage, PipelineStage::Dropped);
        assert_eq!(
            seg.drop_reason.unwrap().to_string(),
            "asr_queue full"
        );
    }
}
