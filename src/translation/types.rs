//! Translation result types (spec §3 "Translation Result", §4.4).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    Draft,
    Final,
}

/// Why a draft translation was skipped (spec §4.4 semantic gating).
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TooShort,
    NoVerbOrPunct,
    SovIncomplete,
    Error(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooShort => write!(f, "too_short"),
            SkipReason::NoVerbOrPunct => write!(f, "no_verb_or_punct"),
            SkipReason::SovIncomplete => write!(f, "sov_incomplete"),
            SkipReason::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Immutable once produced.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub source_text: String,
    pub translated_text: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub confidence: f32,
    pub processing_time: Duration,
    /// Normalized longest-matching-block ratio against the previous
    /// translation emitted for the same segment; 1.0 == identical, near-0
    /// == major rewrite. First draft of a segment is 0.0 by definition.
    pub stability: f32,
    pub skipped_reason: Option<SkipReason>,
}

impl TranslationResult {
    pub fn is_skipped(&self) -> bool {
        self.translated_text.is_none()
    }
}

/// Discriminated outcome of one translation call — never an exception for
/// gate-skip/backend-error control flow (spec §9).
#[derive(Debug, Clone)]
pub enum TranslationOutcome {
    Translated(TranslationResult),
    Skipped(TranslationResult),
}

impl TranslationOutcome {
    pub fn into_result(self) -> TranslationResult {
        match self {
            TranslationOutcome::Translated(r) => r,
            TranslationOutcome::Skipped(r) => r,
        }
    }
}
