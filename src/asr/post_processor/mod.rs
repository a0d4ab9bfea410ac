//! ASR post-processing pipeline (spec §4.3): strip artifacts, remove
//! fillers, normalize punctuation/whitespace, reject hallucinations, and
//! score the surviving text for downstream gating. Mirrors `post_processor.py`
//! (see DESIGN.md) as one orchestrating struct per ASR stream.

mod artifacts;
mod coherence;
mod confidence;
mod filler_words;
mod hallucination;
mod normalize;

use crate::asr::dedup;
use crate::asr::types::{AsrOutcome, AsrResult, DraftDisplay};
use crate::config::PipelineConfig;

pub use artifacts::strip_artifacts;
pub use coherence::common_token_coverage;
use self::coherence::CoherenceTracker;
use self::confidence::ConfidenceSmoother;
use self::filler_words::remove_filler_words;
use self::hallucination::is_hallucination;
use self::normalize::normalize;

/// Applied to one ASR stream's results in order, carrying state (confidence
/// history, recent-text window) across calls for a single speech segment.
pub struct PostProcessor {
    confidence: ConfidenceSmoother,
    coherence: CoherenceTracker,
}

impl PostProcessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            confidence: ConfidenceSmoother::new(config.confidence_smoothing_window),
            coherence: CoherenceTracker::new(config.context_coherence_window),
        }
    }

    /// `previous_draft` is the last draft's cleaned text for the same
    /// segment, used for dedup display; `None`/empty for a segment's first
    /// draft or for final results.
    pub fn process(
        &mut self,
        result: AsrResult,
        previous_draft: Option<&str>,
        config: &PipelineConfig,
    ) -> AsrOutcome {
        let lang = result
            .detected_language
            .clone()
            .or_else(|| config.asr_language.clone())
            .unwrap_or_else(|| config.source_language.clone());

        let mut text = strip_artifacts(&result.text);
        text = remove_filler_words(&text, &lang);
        text = normalize(&text);

        let display = if config.enable_deduplication {
            dedup::dedup_display(previous_draft.unwrap_or(""), &text, config.dedup_similarity_threshold)
        } else {
            DraftDisplay::Full(text.clone())
        };

        let mut quality = self.confidence.smooth(result.avg_confidence);
        let mut skip_reason: Option<String> = None;

        if text.trim().is_empty() {
            skip_reason = Some("empty".to_string());
            quality = 0.0;
        } else if is_hallucination(&text, config) {
            skip_reason = Some("hallucination".to_string());
            quality = 0.0;
        } else {
            let coverage = common_token_coverage(&text, &lang);
            if coverage < 0.05 {
                quality *= 0.5;
            }
            let coherence_sim = self.coherence.similarity(&text);
            if coherence_sim < config.context_coherence_threshold {
                quality *= 0.7;
            }
            self.coherence.record(&text);

            if quality < config.quality_confidence_floor {
                skip_reason = Some("low_quality".to_string());
                quality = 0.0;
            }
        }

        let mut result = result;
        result.text = text;

        AsrOutcome {
            result,
            display,
            should_skip_translation: skip_reason.is_some(),
            skip_reason,
            quality_score: quality.clamp(0.0, 1.0),
        }
    }

    /// Clears per-segment state; call when starting a new speech segment.
    pub fn reset(&mut self) {
        self.confidence.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::types::AsrMode;
    use std::time::Duration;

    fn result(text: &str) -> AsrResult {
        AsrResult {
            text: text.to_string(),
            detected_language: Some("en".to_string()),
            avg_confidence: 0.9,
            word_timings: None,
            processing_time: Duration::from_millis(10),
            mode: AsrMode::Draft,
        }
    }

    #[test]
    fn clean_sentence_passes_through_with_high_quality() {
        let cfg = PipelineConfig::default();
        let mut pp = PostProcessor::new(&cfg);
        let outcome = pp.process(result("the quick brown fox jumps over the lazy dog"), None, &cfg);
        assert!(!outcome.should_skip_translation);
        assert!(outcome.quality_score > 0.0);
    }

    #[test]
    fn hallucinated_text_is_skipped() {
        let cfg = PipelineConfig::default();
        let mut pp = PostProcessor::new(&cfg);
        let outcome = pp.process(result(&"ab".repeat(8)), None, &cfg);
        assert!(outcome.should_skip_translation);
        assert_eq!(outcome.skip_reason.as_deref(), Some("hallucination"));
        assert_eq!(outcome.quality_score, 0.0);
    }

    #[test]
    fn filler_and_artifacts_are_stripped_before_scoring() {
        let cfg = PipelineConfig::default();
        let mut pp = PostProcessor::new(&cfg);
        let outcome = pp.process(result("so um (Laughter) this is the actual point"), None, &cfg);
        assert!(!outcome.result.text.to_lowercase().contains("laughter"));
        assert!(!outcome.result.text.to_lowercase().contains("um"));
    }

    #[test]
    fn empty_after_cleanup_is_skipped() {
        let cfg = PipelineConfig::default();
        let mut pp = PostProcessor::new(&cfg);
        let outcome = pp.process(result("um uh"), None, &cfg);
        assert!(outcome.should_skip_translation);
    }
}
