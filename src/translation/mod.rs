//! Streaming translator component (spec §4.4): semantic-gated draft
//! translation, ungated finals, stability scoring, a pivot-capable backend
//! abstraction, and a front-end LRU+TTL cache.

pub mod backend;
pub mod cache;
pub mod gating;
pub mod streaming;
pub mod types;

pub use backend::{BackendResult, BaseTranslator, HttpTranslator, PivotTranslator};
pub use cache::TranslationCache;
pub use gating::{classify_target, TargetWordOrder};
pub use streaming::{SegmentTranslation, StreamingTranslator};
pub use types::{SkipReason, TranslationMode, TranslationOutcome, TranslationResult};
