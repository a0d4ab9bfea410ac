//! Streaming translation (spec §4.4): semantic-gated drafts, ungated
//! finals, cache short-circuiting, and per-segment stability scoring.
//! Grounded in `streaming_translator.py`'s `StreamingTranslator`, which
//! wraps a `BaseTranslator` with gating + a cache + a running "previous
//! translation" per segment.

use std::time::Instant;

use log::debug;

use crate::text_match::matching_block_ratio;
use crate::translation::backend::BaseTranslator;
use crate::translation::cache::TranslationCache;
use crate::translation::gating::gate_draft;
use crate::translation::types::{SkipReason, TranslationResult};

/// Drives one speech segment's translations: gating for drafts, an
/// always-on final, and stability scoring against the segment's own prior
/// translation. Not `Send`/shared across segments — the orchestrator
/// constructs one per in-flight segment's translation lifecycle (spec §4.6.2:
/// "translation is stateful across one segment's drafts").
pub struct SegmentTranslation {
    previous_translation: Option<String>,
}

impl SegmentTranslation {
    pub fn new() -> Self {
        Self {
            previous_translation: None,
        }
    }

    fn stability_against_previous(&self, current: &str) -> f32 {
        match &self.previous_translation {
            None => 0.0,
            Some(prev) => {
                let prev_words: Vec<&str> = prev.split_whitespace().collect();
                let cur_words: Vec<&str> = current.split_whitespace().collect();
                matching_block_ratio(&prev_words, &cur_words)
            }
        }
    }

    fn record(&mut self, translated_text: &str) {
        self.previous_translation = Some(translated_text.to_string());
    }
}

impl Default for SegmentTranslation {
    fn default() -> Self {
        Self::new()
    }
}

/// Translates one piece of text end to end: semantic gate (drafts only),
/// cache lookup, backend call, cache fill, stability scoring. Never panics
/// on backend failure — converts it to a `TranslationResult` with
/// `skipped_reason = Some(Error(..))` (spec §4.4 "Error handling", §9
/// "never use panics/exceptions for quality control").
pub struct StreamingTranslator<T: BaseTranslator> {
    backend: T,
    cache: Option<TranslationCache>,
    min_words: usize,
}

impl<T: BaseTranslator> StreamingTranslator<T> {
    pub fn new(backend: T, cache: Option<TranslationCache>, min_words: usize) -> Self {
        Self {
            backend,
            cache,
            min_words,
        }
    }

    pub fn cache(&self) -> Option<&TranslationCache> {
        self.cache.as_ref()
    }

    pub fn cache_mut(&mut self) -> Option<&mut TranslationCache> {
        self.cache.as_mut()
    }

    /// Draft call: gated per spec §4.4. Returns a skip result (no backend
    /// call made) if the fragment's meaning isn't fixed yet.
    pub fn translate_draft(
        &mut self,
        state: &mut SegmentTranslation,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult {
        if let Err(reason) = gate_draft(source_text, source_lang, target_lang, self.min_words) {
            debug!("draft translation gated: {reason}");
            return TranslationResult {
                source_text: source_text.to_string(),
                translated_text: None,
                source_lang: source_lang.to_string(),
                target_lang: target_lang.to_string(),
                confidence: 0.0,
                processing_time: std::time::Duration::from_millis(0),
                stability: 0.0,
                skipped_reason: Some(reason),
            };
        }

        self.translate_unconditional(state, source_text, source_lang, target_lang)
    }

    /// Final call: never gated (spec §4.4 "Finals are never gated").
    pub fn translate_final(
        &mut self,
        state: &mut SegmentTranslation,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult {
        self.translate_unconditional(state, source_text, source_lang, target_lang)
    }

    fn translate_unconditional(
        &mut self,
        state: &mut SegmentTranslation,
        source_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> TranslationResult {
        let started = Instant::now();

        if let Some(cache) = self.cache.as_mut() {
            if let Some(cached) = cache.get(source_text, source_lang, target_lang) {
                let stability = state.stability_against_previous(&cached);
                state.record(&cached);
                return TranslationResult {
                    source_text: source_text.to_string(),
                    translated_text: Some(cached),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    confidence: 1.0,
                    processing_time: started.elapsed(),
                    stability,
                    skipped_reason: None,
                };
            }
        }

        match self.backend.translate(source_text, source_lang, target_lang) {
            Ok(backend_result) => {
                if let Some(cache) = self.cache.as_mut() {
                    cache.put(source_text, source_lang, target_lang, &backend_result.translated_text);
                }
                let stability = state.stability_against_previous(&backend_result.translated_text);
                state.record(&backend_result.translated_text);
                TranslationResult {
                    source_text: source_text.to_string(),
                    translated_text: Some(backend_result.translated_text),
                    source_lang: source_lang.to_string(),
                    target_lang: target_lang.to_string(),
                    confidence: 0.9,
                    processing_time: backend_result.processing_time,
                    stability,
                    skipped_reason: None,
                }
            }
            Err(e) => TranslationResult {
                source_text: source_text.to_string(),
                translated_text: None,
                source_lang: source_lang.to_string(),
                target_lang: target_lang.to_string(),
                confidence: 0.0,
                processing_time: started.elapsed(),
                stability: 0.0,
                skipped_reason: Some(SkipReason::Error(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::backend::BackendResult;
    use anyhow::Result;

    struct EchoTranslator;
    impl BaseTranslator for EchoTranslator {
        fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> Result<BackendResult> {
            Ok(BackendResult {
                translated_text: format!("[{target_lang}] {text}"),
                processing_time: std::time::Duration::from_millis(1),
            })
        }
        fn supported_pairs(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    struct FailingTranslator;
    impl BaseTranslator for FailingTranslator {
        fn translate(&self, _text: &str, _source_lang: &str, _target_lang: &str) -> Result<BackendResult> {
            Err(anyhow::anyhow!("backend unreachable"))
        }
        fn supported_pairs(&self) -> Vec<(String, String)> {
            Vec::new()
        }
    }

    #[test]
    fn sov_draft_gating_matches_scenario_5() {
        let mut translator = StreamingTranslator::new(EchoTranslator, None, 1);
        let mut state = SegmentTranslation::new();

        let r1 = translator.translate_draft(&mut state, "Hello", "en", "ja");
        assert!(r1.is_skipped());
        assert_eq!(r1.skipped_reason, Some(SkipReason::SovIncomplete));

        let r2 = translator.translate_draft(&mut state, "Hello world", "en", "ja");
        assert!(r2.is_skipped());
        assert_eq!(r2.skipped_reason, Some(SkipReason::SovIncomplete));

        let r3 = translator.translate_draft(&mut state, "Hello world today.", "en", "ja");
        assert!(!r3.is_skipped());

        // Finals always translate, regardless of gating.
        let final_result = translator.translate_final(&mut state, "Hello", "en", "ja");
        assert!(!final_result.is_skipped());
    }

    #[test]
    fn first_draft_has_zero_stability() {
        let mut translator = StreamingTranslator::new(EchoTranslator, None, 1);
        let mut state = SegmentTranslation::new();
        let r = translator.translate_draft(&mut state, "I want coffee", "en", "es");
        assert_eq!(r.stability, 0.0);
    }

    #[test]
    fn repeated_draft_of_identical_text_has_high_stability() {
        let mut translator = StreamingTranslator::new(EchoTranslator, None, 1);
        let mut state = SegmentTranslation::new();
        translator.translate_draft(&mut state, "I want coffee", "en", "es");
        let r2 = translator.translate_draft(&mut state, "I want coffee", "en", "es");
        assert_eq!(r2.stability, 1.0);
    }

    #[test]
    fn cache_hit_short_circuits_backend() {
        let cache = TranslationCache::new(8, None);
        let mut translator = StreamingTranslator::new(EchoTranslator, Some(cache), 1);
        let mut state = SegmentTranslation::new();
        let r1 = translator.translate_final(&mut state, "hello there.", "en", "es");
        assert_eq!(translator.cache().unwrap().misses(), 1);

        let mut state2 = SegmentTranslation::new();
        let r2 = translator.translate_final(&mut state2, "hello there.", "en", "es");
        assert_eq!(translator.cache().unwrap().hits(), 1);
        assert_eq!(r1.translated_text, r2.translated_text);
    }

    #[test]
    fn backend_error_surfaces_as_skipped_result_not_a_panic() {
        let mut translator = StreamingTranslator::new(FailingTranslator, None, 1);
        let mut state = SegmentTranslation::new();
        let r = translator.translate_final(&mut state, "hello there.", "en", "es");
        assert!(r.is_skipped());
        assert!(matches!(r.skipped_reason, Some(SkipReason::Error(_))));
    }
}
