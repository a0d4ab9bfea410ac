//! Streaming ASR component (spec §4.3): cumulative-context draft/final
//! transcription, dedup display, and post-processing.

pub mod dedup;
pub mod engine;
pub mod post_processor;
pub mod types;

pub use engine::StreamingAsr;
pub use types::{AsrMode, AsrOutcome, AsrResult, DraftDisplay, WordTiming};
