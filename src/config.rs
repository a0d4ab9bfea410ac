//! Pipeline configuration.
//!
//! A single `PipelineConfig` carries every option enumerated in spec §6
//! "Configuration". It is serde (de)serializable so a session can be
//! bootstrapped from a JSON file, matching the teacher's habit of keeping
//! one flat, `Default`-able config struct per subsystem.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioSource {
    Microphone,
    SystemAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaptiveVadEnvironment {
    Auto,
    Quiet,
    Office,
    Noisy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // --- Audio capture (§4.1) ---
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_duration_ms: u32,
    pub audio_source: AudioSource,
    pub audio_device_index: Option<usize>,

    // --- VAD (§4.2) ---
    pub vad_threshold: f32,
    pub min_speech_duration_ms: u32,
    pub min_silence_duration_ms: u32,
    pub vad_lookback_ms: u32,
    pub max_segment_duration_ms: u32,
    pub pause_threshold_ms: u32,
    pub use_adaptive_vad: bool,
    pub adaptive_vad_environment: AdaptiveVadEnvironment,
    pub enable_vad_noise_estimation: bool,
    pub enable_vad_energy_filter: bool,

    // --- ASR (§4.3) ---
    pub asr_model_size: AsrModelSize,
    pub asr_language: Option<String>,
    pub enable_deduplication: bool,
    pub dedup_window_size: usize,
    pub dedup_similarity_threshold: f32,

    // [SUPPLEMENT] hallucination-detector thresholds exposed as config per
    // spec §9 Design Notes ("An implementer should expose these as
    // configuration knobs and not hard-code").
    pub hallucination_min_repeat_unit: usize,
    pub hallucination_max_repeat_unit: usize,
    pub hallucination_repeat_count_threshold: usize,
    pub hallucination_word_repetition_threshold: f32,
    pub hallucination_word_diversity_threshold: f32,
    pub hallucination_word_diversity_min_len: usize,
    pub hallucination_single_char_threshold: f32,
    // Minimum absolute repeat count required before the single-char rule
    // fires, alongside the ratio threshold above (a short string crossing
    // the ratio alone, e.g. "aa", must not be flagged).
    pub hallucination_single_char_min_len: usize,
    pub confidence_smoothing_window: usize,
    pub context_coherence_window: usize,
    pub context_coherence_threshold: f32,
    // Below this smoothed confidence, quality_score is forced to 0 (spec
    // §4.3 "confidence-below-floor-after-smoothing").
    pub quality_confidence_floor: f32,

    // --- Translation (§4.4) ---
    pub source_language: String,
    pub target_language: String,
    pub enable_translation: bool,
    pub enable_translation_cache: bool,
    pub translation_cache_size: usize,
    pub translation_cache_ttl_secs: Option<u64>,
    pub translation_min_words: usize,

    // --- Adaptive draft controller (§4.5) ---
    pub draft_interval_ms: u64,
    pub draft_pause_threshold_ms: u64,
    pub draft_max_queue_depth: usize,

    // --- Concurrency fabric (§4.6) ---
    pub max_queue_size: usize,
    pub process_final_on_shutdown: bool,
    pub shutdown_drain_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_duration_ms: 30,
            audio_source: AudioSource::Microphone,
            audio_device_index: None,

            vad_threshold: 0.5,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 350,
            vad_lookback_ms: 450,
            max_segment_duration_ms: 6000,
            pause_threshold_ms: 800,
            use_adaptive_vad: false,
            adaptive_vad_environment: AdaptiveVadEnvironment::Auto,
            enable_vad_noise_estimation: true,
            enable_vad_energy_filter: true,

            asr_model_size: AsrModelSize::Base,
            asr_language: None,
            enable_deduplication: true,
            dedup_window_size: 5,
            dedup_similarity_threshold: 0.8,

            hallucination_min_repeat_unit: 2,
            hallucination_max_repeat_unit: 20,
            hallucination_repeat_count_threshold: 6,
            hallucination_word_repetition_threshold: 0.6,
            hallucination_word_diversity_threshold: 0.3,
            hallucination_word_diversity_min_len: 100,
            hallucination_single_char_threshold: 0.35,
            hallucination_single_char_min_len: 5,
            confidence_smoothing_window: 5,
            context_coherence_window: 5,
            context_coherence_threshold: 0.5,
            quality_confidence_floor: 0.15,

            source_language: "en".to_string(),
            target_language: "es".to_string(),
            enable_translation: true,
            enable_translation_cache: true,
            translation_cache_size: 512,
            translation_cache_ttl_secs: None,
            translation_min_words: 2,

            draft_interval_ms: 2000,
            draft_pause_threshold_ms: 500,
            draft_max_queue_depth: 2,

            max_queue_size: 10,
            process_final_on_shutdown: true,
            shutdown_drain_timeout_ms: 2000,
        }
    }
}

impl PipelineConfig {
    pub fn chunk_samples(&self) -> usize {
        ((self.sample_rate as u64 * self.chunk_duration_ms as u64) / 1000) as usize
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let cfg = PipelineConfig::default();
        let json = cfg.to_json_string().unwrap();
        let back = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(back.sample_rate, cfg.sample_rate);
        assert_eq!(back.target_language, cfg.target_language);
    }

    #[test]
    fn chunk_samples_matches_30ms_at_16k() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.chunk_samples(), 480);
    }
}
