//! ASR result types (spec §3 "ASR Result", §9 "tagged variant" capability
//! set).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrMode {
    Draft,
    Final,
}

#[derive(Debug, Clone)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u32,
    pub end_ms: u32,
}

/// Immutable once produced.
#[derive(Debug, Clone)]
pub struct AsrResult {
    pub text: String,
    pub detected_language: Option<String>,
    pub avg_confidence: f32,
    pub word_timings: Option<Vec<WordTiming>>,
    pub processing_time: Duration,
    pub mode: AsrMode,
}

/// What the UI should render for a draft: either the full new draft, or
/// (per spec §4.3 dedup) only the new suffix behind an ellipsis marker.
/// Per spec §9 Design Notes this "what to show" framing is acknowledged as
/// a UI concern leaking into the ASR layer; kept here as the distilled
/// spec's own framing, see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftDisplay {
    Full(String),
    Suffix(String),
}

impl DraftDisplay {
    pub fn rendered(&self) -> String {
        match self {
            DraftDisplay::Full(text) => text.clone(),
            DraftDisplay::Suffix(suffix) => format!("…{suffix}"),
        }
    }
}

/// The post-processed, quality-scored outcome of one ASR call. Never a
/// panic/exception for quality control (spec §9) — a discriminated result
/// instead.
#[derive(Debug, Clone)]
pub struct AsrOutcome {
    pub result: AsrResult,
    pub display: DraftDisplay,
    pub should_skip_translation: bool,
    pub skip_reason: Option<String>,
    pub quality_score: f32,
}
