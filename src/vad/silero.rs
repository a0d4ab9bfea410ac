//! Neural speech-probability estimation (spec §4.2: "a neural
//! speech-probability estimator, the referenced Silero model"). Grounded in
//! the teacher's declared `silero_rs` dependency; wrapped behind a trait so
//! the state machine never depends on the concrete model crate directly
//! (spec §9's tagged-capability idiom applied to the VAD's estimator).

use std::path::Path;

use silero::{Silero, VadConfig};

#[derive(Debug)]
pub enum VadEstimatorError {
    ModelLoad(String),
    Inference(String),
}

impl std::fmt::Display for VadEstimatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VadEstimatorError::ModelLoad(msg) => write!(f, "VAD model load error: {msg}"),
            VadEstimatorError::Inference(msg) => write!(f, "VAD inference error: {msg}"),
        }
    }
}

impl std::error::Error for VadEstimatorError {}

/// A per-frame speech-probability source. Implementations are not required
/// to be thread-safe across concurrent calls; the VAD worker owns a single
/// instance (spec §5: "the VAD's audio buffer, owned by the VAD worker
/// alone").
pub trait SpeechProbabilityEstimator: Send {
    fn predict(&mut self, frame: &[f32]) -> Result<f32, VadEstimatorError>;
}

pub struct SileroEstimator {
    model: Silero,
}

impl SileroEstimator {
    pub fn new(model_path: impl AsRef<Path>, sample_rate: u32) -> Result<Self, VadEstimatorError> {
        let config = VadConfig {
            sample_rate: sample_rate as usize,
            ..Default::default()
        };
        let model = Silero::new(config, model_path.as_ref())
            .map_err(|e| VadEstimatorError::ModelLoad(e.to_string()))?;
        Ok(Self { model })
    }
}

impl SpeechProbabilityEstimator for SileroEstimator {
    fn predict(&mut self, frame: &[f32]) -> Result<f32, VadEstimatorError> {
        self.model
            .calc_level(frame)
            .map_err(|e| VadEstimatorError::Inference(e.to_string()))
    }
}

/// A deterministic estimator for tests and for the "silent input" /
/// synthetic-envelope scenarios in spec §8: returns probabilities fed to it
/// in advance rather than running a real model.
pub struct ScriptedEstimator {
    probs: std::collections::VecDeque<f32>,
    default_prob: f32,
}

impl ScriptedEstimator {
    pub fn new(probs: Vec<f32>) -> Self {
        Self {
            probs: probs.into(),
            default_prob: 0.0,
        }
    }
}

impl SpeechProbabilityEstimator for ScriptedEstimator {
    fn predict(&mut self, _frame: &[f32]) -> Result<f32, VadEstimatorError> {
        Ok(self.probs.pop_front().unwrap_or(self.default_prob))
    }
}
