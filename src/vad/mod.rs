//! VAD Engine (spec §4.2): neural speech-probability estimation driving a
//! SILENCE/SPEECH segmentation state machine, with adaptive and
//! calibration-based threshold variants.

pub mod calibration;
pub mod silero;
pub mod state_machine;
pub mod threshold;

pub use calibration::{CalibrationPhase, CalibrationState};
pub use silero::{ScriptedEstimator, SileroEstimator, SpeechProbabilityEstimator, VadEstimatorError};
pub use state_machine::{VadEngine, VadPhase};
