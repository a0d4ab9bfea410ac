//! Streaming ASR (spec §4.3): wraps a loaded `whisper-rs` model behind two
//! call modes, draft and final, matching the beam/precision tradeoff the
//! teacher's `whisper_engine::engine::WhisperEngine` already makes for its
//! own "quick vs. full" transcription paths.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::asr::post_processor::PostProcessor;
use crate::asr::types::{AsrMode, AsrOutcome, AsrResult};
use crate::config::PipelineConfig;

/// Loads a whisper model once; cheap to clone and share across ASR workers
/// (spec §9 "load-once shared models" — each worker still gets its own
/// `whisper_rs::WhisperState` per call, allocated inside `run()`, so sharing
/// the context does not serialize inference on its own).
pub fn load_model(model_path: &Path) -> Result<Arc<WhisperContext>> {
    std::env::set_var("GGML_METAL_LOG_LEVEL", "1");
    std::env::set_var("WHISPER_LOG_LEVEL", "1");

    let path_str = model_path
        .to_str()
        .ok_or_else(|| anyhow!("model path is not valid UTF-8: {}", model_path.display()))?;

    let context = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
        .with_context(|| format!("failed to load whisper model at {}", model_path.display()))?;
    log::info!("loaded whisper model from {}", model_path.display());
    Ok(Arc::new(context))
}

pub struct StreamingAsr {
    context: Arc<WhisperContext>,
    config: PipelineConfig,
    post_processor: PostProcessor,
    previous_draft_text: Option<String>,
}

impl StreamingAsr {
    pub fn new(model_path: &Path, config: PipelineConfig) -> Result<Self> {
        let context = load_model(model_path)?;
        Ok(Self::with_shared_context(context, config))
    }

    /// Builds a streaming session reusing an already-loaded model (spec §9
    /// "load-once shared models"): the ASR worker pool loads the whisper
    /// model once and hands every worker an `Arc` to it instead of each
    /// worker reloading its own copy from disk.
    pub fn with_shared_context(context: Arc<WhisperContext>, config: PipelineConfig) -> Self {
        let post_processor = PostProcessor::new(&config);
        Self {
            context,
            config,
            post_processor,
            previous_draft_text: None,
        }
    }

    /// Call when a new Speech Segment begins: clears dedup and quality
    /// smoothing state so it doesn't leak across segments.
    pub fn start_segment(&mut self) {
        self.previous_draft_text = None;
        self.post_processor.reset();
    }

    /// Minimal beam, transcribes the cumulative audio from segment start to
    /// now. Called repeatedly during a segment.
    pub fn transcribe_draft(&mut self, cumulative_audio: &[f32]) -> Result<AsrOutcome> {
        let raw = self.run(cumulative_audio, AsrMode::Draft)?;
        let previous = self.previous_draft_text.clone();
        let outcome = self
            .post_processor
            .process(raw, previous.as_deref(), &self.config);
        self.previous_draft_text = Some(outcome.result.text.clone());
        Ok(outcome)
    }

    /// Full beam, standard precision, transcribes the full segment audio.
    /// Clears draft state on return, per spec §4.3.
    pub fn transcribe_final(&mut self, full_segment_audio: &[f32]) -> Result<AsrOutcome> {
        let raw = self.run(full_segment_audio, AsrMode::Final)?;
        let outcome = self.post_processor.process(raw, None, &self.config);
        self.previous_draft_text = None;
        Ok(outcome)
    }

    fn run(&self, audio: &[f32], mode: AsrMode) -> Result<AsrResult> {
        if audio.is_empty() {
            return Ok(AsrResult {
                text: String::new(),
                detected_language: self.config.asr_language.clone(),
                avg_confidence: 0.0,
                word_timings: None,
                processing_time: std::time::Duration::from_millis(0),
                mode,
            });
        }

        let (beam_size, temperature) = match mode {
            AsrMode::Draft => (1, 0.0),
            AsrMode::Final => (5, 0.2),
        };

        let mut params = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size,
            patience: 1.0,
        });

        params.set_language(self.config.asr_language.as_deref());
        params.set_translate(false);
        params.set_no_timestamps(false);
        params.set_token_timestamps(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_suppress_blank(true);
        params.set_suppress_non_speech_tokens(true);
        params.set_temperature(temperature);
        params.set_max_initial_ts(1.0);
        params.set_entropy_thold(2.4);
        params.set_logprob_thold(-1.0);
        params.set_no_speech_thold(0.55);
        params.set_single_segment(false);
        params.set_no_context(true);

        let started = Instant::now();
        let mut state = self.context.create_state().context("failed to create whisper state")?;
        state.full(params, audio).context("whisper inference failed")?;
        let num_segments = state.full_n_segments().context("failed to read segment count")?;

        let mut text = String::new();
        let mut word_timings = Vec::new();
        let mut total_confidence = 0.0f32;
        let mut counted_segments = 0usize;

        for i in 0..num_segments {
            let segment_text = match state.full_get_segment_text_lossy(i) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let trimmed = segment_text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);

            // whisper-rs does not expose a per-token logprob directly through
            // this API; approximate confidence from segment length as the
            // teacher's engine does, pending a richer scoring hook.
            let length_score = (trimmed.len() as f32 / 100.0).min(0.9) + 0.1;
            total_confidence += length_score;
            counted_segments += 1;

            let start_ms = state.full_get_segment_t0(i).unwrap_or(0) as u32 * 10;
            let end_ms = state.full_get_segment_t1(i).unwrap_or(0) as u32 * 10;
            for word in trimmed.split_whitespace() {
                word_timings.push(crate::asr::types::WordTiming {
                    word: word.to_string(),
                    start_ms,
                    end_ms,
                });
            }
        }

        let avg_confidence = if counted_segments > 0 {
            total_confidence / counted_segments as f32
        } else {
            0.0
        };

        Ok(AsrResult {
            text,
            detected_language: self.config.asr_language.clone(),
            avg_confidence,
            word_timings: if word_timings.is_empty() {
                None
            } else {
                Some(word_timings)
            },
            processing_time: started.elapsed(),
            mode,
        })
    }
}
