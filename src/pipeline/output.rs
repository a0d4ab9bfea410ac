//! The Output stage (spec §2 "sole emitter to external collaborators",
//! §6 "Output stream"): converts a completed `PipelineSegment` into the
//! externally visible record and hands it to a caller-supplied sink.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::segment::PipelineSegment;

/// One emission to an external collaborator, matching spec §6's output
/// stream contract field for field.
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord {
    pub timestamp: f64,
    pub source_text: String,
    pub translated_text: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub confidence: f32,
    pub processing_time_ms: f64,
    pub is_final: bool,
    pub is_partial: bool,
    pub segment_id: u64,
    pub segment_uuid: Uuid,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl OutputRecord {
    /// Builds the emitted record from a completed segment. Returns `None`
    /// if the segment never produced an ASR result worth emitting (spec §8
    /// "Empty or whitespace-only ASR text is treated as an empty result: no
    /// translation, no output").
    pub fn from_segment(segment: &PipelineSegment) -> Option<Self> {
        let asr = segment.asr_result.as_ref()?;
        if asr.text.trim().is_empty() {
            return None;
        }

        let (translated_text, target_lang, confidence, processing_time_ms) =
            match &segment.translation_result {
                Some(t) => (
                    t.translated_text.clone(),
                    t.target_lang.clone(),
                    t.confidence,
                    t.processing_time.as_secs_f64() * 1000.0,
                ),
                None => (
                    None,
                    String::new(),
                    asr.avg_confidence,
                    asr.processing_time.as_secs_f64() * 1000.0,
                ),
            };

        Some(Self {
            timestamp: now_secs(),
            source_text: asr.text.clone(),
            translated_text,
            source_lang: asr.detected_language.clone().unwrap_or_default(),
            target_lang,
            confidence,
            processing_time_ms,
            is_final: segment.is_final,
            is_partial: segment.speech.is_partial,
            segment_id: segment.speech.id,
            segment_uuid: segment.speech.uuid,
        })
    }
}

/// Anything that can accept a finished output record: a channel to a UI, a
/// file writer, a test collector. Kept minimal so the orchestrator doesn't
/// need to know what's downstream of it.
pub trait OutputSink: Send {
    fn emit(&mut self, record: OutputRecord);
}

/// An in-memory sink, primarily for tests and for buffering before a UI
/// attaches.
#[derive(Default)]
pub struct CollectingSink {
    pub records: Vec<OutputRecord>,
}

impl OutputSink for CollectingSink {
    fn emit(&mut self, record: OutputRecord) {
        self.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::types::AsrResult;
    use crate::pipeline::segment::SpeechSegment;
    use crate::translation::types::TranslationResult;
    use std::time::Duration;

    fn sample_segment(text: &str) -> PipelineSegment {
        let speech = SpeechSegment {
            id: 7,
            uuid: Uuid::new_v4(),
            start_time: 0.0,
            end_time: 1.0,
            audio: vec![0.0; 16_000],
            vad_confidence: 0.9,
            is_partial: false,
        };
        let mut seg = PipelineSegment::new(speech, true);
        seg.asr_result = Some(AsrResult {
            text: text.to_string(),
            detected_language: Some("en".to_string()),
            avg_confidence: 0.8,
            word_timings: None,
            processing_time: Duration::from_millis(120),
            mode: crate::asr::types::AsrMode::Final,
        });
        seg
    }

    #[test]
    fn empty_asr_text_produces_no_output_record() {
        let seg = sample_segment("   ");
        assert!(OutputRecord::from_segment(&seg).is_none());
    }

    #[test]
    fn populated_segment_carries_all_fields() {
        let mut seg = sample_segment("hello there");
        seg.translation_result = Some(TranslationResult {
            source_text: "hello there".to_string(),
            translated_text: Some("hola".to_string()),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
            confidence: 0.9,
            processing_time: Duration::from_millis(50),
            stability: 0.6,
            skipped_reason: None,
        });

        let record = OutputRecord::from_segment(&seg).unwrap();
        assert_eq!(record.source_text, "hello there");
        assert_eq!(record.translated_text, Some("hola".to_string()));
        assert_eq!(record.target_lang, "es");
        assert_eq!(record.segment_id, 7);
        assert!(record.is_final);
        assert!(!record.is_partial);
    }

    #[test]
    fn collecting_sink_accumulates_records_in_order() {
        let mut sink = CollectingSink::default();
        sink.emit(OutputRecord::from_segment(&sample_segment("one")).unwrap());
        sink.emit(OutputRecord::from_segment(&sample_segment("two")).unwrap());
        assert_eq!(sink.records.len(), 2);
        assert_eq!(sink.records[0].source_text, "one");
    }
}
