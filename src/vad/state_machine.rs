//! The VAD segmentation state machine (spec §4.2.1). A state machine over
//! {SILENCE, SPEECH} driven by a per-frame speech-probability estimator,
//! with pre-speech padding, forced splits at a duration ceiling, and a
//! `force_finalize()` escape hatch for shutdown.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::segment::SpeechSegment;

use super::calibration::CalibrationState;
use super::silero::SpeechProbabilityEstimator;
use super::threshold::{rms_db, AdaptiveThreshold, FixedThreshold, ThresholdStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadPhase {
    Silence,
    Speech,
}

struct BoundedRing<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, item: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

enum ThresholdSource {
    Fixed(FixedThreshold),
    Adaptive(AdaptiveThreshold),
    Calibrating(CalibrationState),
}

struct SegmentInProgress {
    start_time: f64,
    audio: Vec<f32>,
    pad_len_samples: usize,
    probs: Vec<f32>,
    inherited_partial: bool,
}

pub struct VadEngine<E: SpeechProbabilityEstimator> {
    estimator: E,
    threshold: ThresholdSource,
    phase: VadPhase,
    chunk_samples: usize,
    chunk_ms: u32,
    sample_rate: u32,
    min_speech_chunks: u32,
    min_silence_chunks: u32,
    pad_chunks: u32,
    max_segment_chunks: u32,
    pause_chunks: u32,
    overlap_samples: usize,
    consecutive_speech: u32,
    consecutive_silence: u32,
    chunk_index: u64,
    pre_speech_ring: BoundedRing<(Vec<f32>, f32)>,
    in_progress: Option<SegmentInProgress>,
    speech_chunks_in_segment: u32,
    next_segment_id: u64,
    last_threshold: f32,
}

fn chunks_for_ms(ms: u32, chunk_ms: u32) -> u32 {
    ((ms + chunk_ms - 1) / chunk_ms).max(1)
}

impl<E: SpeechProbabilityEstimator> VadEngine<E> {
    pub fn new(config: &PipelineConfig, estimator: E) -> Self {
        let chunk_ms = config.chunk_duration_ms;
        let chunk_samples = config.chunk_samples();
        let min_speech_chunks = chunks_for_ms(config.min_speech_duration_ms, chunk_ms);
        let min_silence_chunks = chunks_for_ms(config.min_silence_duration_ms, chunk_ms);
        let pad_chunks = chunks_for_ms(config.vad_lookback_ms, chunk_ms);
        let max_segment_chunks = chunks_for_ms(config.max_segment_duration_ms, chunk_ms);
        let pause_chunks = chunks_for_ms(config.pause_threshold_ms, chunk_ms);
        let overlap_samples = (config.sample_rate as usize * 300) / 1000;

        let threshold = if config.use_adaptive_vad {
            match config.adaptive_vad_environment {
                crate::config::AdaptiveVadEnvironment::Auto => {
                    ThresholdSource::Calibrating(CalibrationState::new(chunk_ms))
                }
                _ => ThresholdSource::Adaptive(AdaptiveThreshold::new(config.vad_threshold)),
            }
        } else {
            ThresholdSource::Fixed(FixedThreshold(config.vad_threshold))
        };

        Self {
            estimator,
            threshold,
            phase: VadPhase::Silence,
            chunk_samples,
            chunk_ms,
            sample_rate: config.sample_rate,
            min_speech_chunks,
            min_silence_chunks,
            pad_chunks,
            max_segment_chunks,
            pause_chunks,
            overlap_samples,
            consecutive_speech: 0,
            consecutive_silence: 0,
            chunk_index: 0,
            pre_speech_ring: BoundedRing::new(pad_chunks as usize + 1),
            in_progress: None,
            speech_chunks_in_segment: 0,
            next_segment_id: 1,
            last_threshold: config.vad_threshold,
        }
    }

    fn pad_frame(&self, frame: &[f32]) -> Vec<f32> {
        if frame.len() >= self.chunk_samples {
            frame.to_vec()
        } else {
            let mut padded = frame.to_vec();
            padded.resize(self.chunk_samples, 0.0);
            padded
        }
    }

    fn chunk_seconds(&self) -> f64 {
        self.chunk_ms as f64 / 1000.0
    }

    fn now_seconds(&self) -> f64 {
        self.chunk_index as f64 * self.chunk_seconds()
    }

    /// Consume one audio frame; returns zero or more completed segments
    /// (spec §4.2.4 output contract).
    pub fn process_frame(&mut self, frame: &[f32]) -> Vec<SpeechSegment> {
        let padded = self.pad_frame(frame);
        self.chunk_index += 1;

        if matches!(self.threshold, ThresholdSource::Calibrating(_)) {
            let just_finished = match &mut self.threshold {
                ThresholdSource::Calibrating(cal) => cal.observe(&padded),
                _ => unreachable!(),
            };
            if just_finished {
                let prior = std::mem::replace(
                    &mut self.threshold,
                    ThresholdSource::Fixed(FixedThreshold(0.5)),
                );
                if let ThresholdSource::Calibrating(cal) = prior {
                    self.threshold = ThresholdSource::Adaptive(cal.into_adaptive_threshold());
                    info!("VAD calibration complete at chunk {}", self.chunk_index);
                }
            } else {
                return Vec::new();
            }
        }

        self.process_frame_inner(padded)
    }

    fn process_frame_inner(&mut self, frame: Vec<f32>) -> Vec<SpeechSegment> {
        let prob = match self.estimator.predict(&frame) {
            Ok(p) => p,
            Err(e) => {
                warn!("VAD estimator error, treating frame as silence: {e}");
                0.0
            }
        };
        let frame_db = rms_db(&frame);
        let currently_silence = self.phase == VadPhase::Silence;
        let threshold = match &mut self.threshold {
            ThresholdSource::Fixed(f) => f.update(frame_db, currently_silence),
            ThresholdSource::Adaptive(a) => a.update(frame_db, currently_silence),
            ThresholdSource::Calibrating(_) => unreachable!("handled in process_frame"),
        };
        self.last_threshold = threshold;
        let is_speech = prob >= threshold;
        let now = self.now_seconds();

        let mut emitted = Vec::new();

        match self.phase {
            VadPhase::Silence => {
                self.pre_speech_ring.push((frame.clone(), prob));
                if is_speech {
                    self.consecutive_speech += 1;
                    self.consecutive_silence = 0;
                } else {
                    self.consecutive_speech = 0;
                }

                if self.consecutive_speech >= self.min_speech_chunks {
                    self.begin_segment(now);
                    self.phase = VadPhase::Speech;
                    self.consecutive_speech = 0;
                    self.consecutive_silence = 0;
                    debug!("VAD SILENCE -> SPEECH at t={now:.3}s");
                }
            }
            VadPhase::Speech => {
                {
                    let seg = self.in_progress.as_mut().expect("in speech with no segment");
                    seg.audio.extend_from_slice(&frame);
                    seg.probs.push(prob);
                }
                self.speech_chunks_in_segment += 1;

                if is_speech {
                    self.consecutive_silence = 0;
                    self.consecutive_speech += 1;
                } else {
                    self.consecutive_silence += 1;
                    self.consecutive_speech = 0;
                }

                if self.consecutive_silence >= self.min_silence_chunks {
                    if let Some(seg) = self.end_segment(now, false) {
                        emitted.push(seg);
                    }
                    self.phase = VadPhase::Silence;
                } else if self.speech_chunks_in_segment >= self.max_segment_chunks {
                    emitted.extend(self.forced_split(now));
                }
            }
        }

        emitted
    }

    fn begin_segment(&mut self, now: f64) {
        let pad_frames: Vec<(Vec<f32>, f32)> = self.pre_speech_ring.iter().cloned().collect();
        let mut audio = Vec::new();
        let mut probs = Vec::new();
        for (f, p) in &pad_frames {
            audio.extend_from_slice(f);
            probs.push(*p);
        }
        let pad_len_samples = audio.len();
        let start_time = now - (pad_frames.len() as f64) * self.chunk_seconds();

        self.in_progress = Some(SegmentInProgress {
            start_time,
            audio,
            pad_len_samples,
            probs,
            inherited_partial: false,
        });
        self.speech_chunks_in_segment = 0;
        self.pre_speech_ring.clear();
    }

    fn end_segment(&mut self, now: f64, is_partial: bool) -> Option<SpeechSegment> {
        let in_progress = self.in_progress.take()?;
        // The confirmed-silence run that triggered this emission isn't part
        // of the spoken content; back the end time off by it.
        let silence_seconds = self.consecutive_silence as f64 * self.chunk_seconds();
        let end_time = (now - silence_seconds).max(in_progress.start_time);
        let trim_samples =
            ((self.consecutive_silence as usize) * self.chunk_samples).min(in_progress.audio.len());
        let audio = in_progress.audio[..in_progress.audio.len() - trim_samples].to_vec();

        let confidence = if in_progress.probs.is_empty() {
            0.0
        } else {
            in_progress.probs.iter().sum::<f32>() / in_progress.probs.len() as f32
        };

        let segment = SpeechSegment {
            id: self.next_segment_id,
            uuid: Uuid::new_v4(),
            start_time: in_progress.start_time,
            end_time,
            audio,
            vad_confidence: confidence,
            is_partial: is_partial || in_progress.inherited_partial,
        };
        self.next_segment_id += 1;
        self.consecutive_silence = 0;
        self.speech_chunks_in_segment = 0;
        info!(
            "VAD segment {} emitted: {:.3}s-{:.3}s partial={}",
            segment.id, segment.start_time, segment.end_time, segment.is_partial
        );
        Some(segment)
    }

    fn find_pause_run_start(&self, probs: &[f32]) -> Option<usize> {
        let need = self.pause_chunks as usize;
        if probs.len() < need {
            return None;
        }
        let mut run_len = 0usize;
        for i in (0..probs.len()).rev() {
            if probs[i] < self.last_threshold {
                run_len += 1;
                if run_len >= need {
                    return Some(i + need - 1 - (run_len - 1));
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Splits a too-long segment (spec §4.2.1 "Forced split"). Returns the
    /// emitted first half; the remainder continues as the next segment.
    fn forced_split(&mut self, now: f64) -> Vec<SpeechSegment> {
        let in_progress = match self.in_progress.take() {
            Some(s) => s,
            None => return Vec::new(),
        };

        let pause_start = self.find_pause_run_start(&in_progress.probs);

        let (first_audio, rest_audio, rest_start_time, rest_inherited) =
            if let Some(run_start_chunk) = pause_start {
                let split_sample =
                    (in_progress.pad_len_samples + run_start_chunk * self.chunk_samples)
                        .min(in_progress.audio.len());
                let first = in_progress.audio[..split_sample].to_vec();
                let rest = in_progress.audio[split_sample..].to_vec();
                let rest_start = now - (rest.len() as f64 / self.sample_rate as f64);
                (first, rest, rest_start, true)
            } else {
                let overlap = self.overlap_samples.min(in_progress.audio.len());
                let split_sample = in_progress.audio.len() - overlap;
                let first = in_progress.audio[..split_sample].to_vec();
                let rest = in_progress.audio[split_sample..].to_vec();
                let rest_start = now - (rest.len() as f64 / self.sample_rate as f64);
                (first, rest, rest_start, true)
            };

        let confidence = if in_progress.probs.is_empty() {
            0.0
        } else {
            in_progress.probs.iter().sum::<f32>() / in_progress.probs.len() as f32
        };

        let segment = SpeechSegment {
            id: self.next_segment_id,
            uuid: Uuid::new_v4(),
            start_time: in_progress.start_time,
            end_time: now,
            audio: first_audio,
            vad_confidence: confidence,
            is_partial: true,
        };
        self.next_segment_id += 1;
        warn!(
            "VAD forced split at segment {} (max_segment_duration reached)",
            segment.id
        );

        self.in_progress = Some(SegmentInProgress {
            start_time: rest_start_time,
            audio: rest_audio,
            pad_len_samples: 0,
            probs: Vec::new(),
            inherited_partial: rest_inherited,
        });
        self.speech_chunks_in_segment = 0;
        self.consecutive_silence = 0;

        vec![segment]
    }

    /// Emit any in-flight SPEECH segment (used on shutdown).
    pub fn force_finalize(&mut self) -> Option<SpeechSegment> {
        if self.phase != VadPhase::Speech {
            return None;
        }
        let now = self.now_seconds();
        let seg = self.end_segment(now, true);
        self.phase = VadPhase::Silence;
        seg
    }

    pub fn current_threshold(&self) -> f32 {
        self.last_threshold
    }

    pub fn phase(&self) -> VadPhase {
        self.phase
    }

    /// The audio accumulated so far for the segment still being spoken, if
    /// any — what the adaptive draft controller feeds to a draft ASR call
    /// before the segment is finalized (spec §4.5).
    pub fn in_progress_audio(&self) -> Option<&[f32]> {
        self.in_progress.as_ref().map(|s| s.audio.as_slice())
    }

    pub fn in_progress_duration(&self) -> Duration {
        self.in_progress
            .as_ref()
            .map(|s| Duration::from_secs_f64((s.audio.len() as f64 / self.sample_rate as f64).max(0.0)))
            .unwrap_or_default()
    }

    /// How long since the last chunk classified as speech, for the draft
    /// controller's pause gate.
    pub fn time_since_last_speech(&self) -> Duration {
        Duration::from_secs_f64(self.consecutive_silence as f64 * self.chunk_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::silero::ScriptedEstimator;

    fn make_config(max_segment_ms: u32) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.sample_rate = 16_000;
        cfg.chunk_duration_ms = 30;
        cfg.min_speech_duration_ms = 210; // 7 chunks
        cfg.min_silence_duration_ms = 330; // 11 chunks
        cfg.vad_lookback_ms = 450;
        cfg.max_segment_duration_ms = max_segment_ms;
        cfg.pause_threshold_ms = 900;
        cfg.vad_threshold = 0.5;
        cfg.use_adaptive_vad = false;
        cfg
    }

    fn envelope(chunks: usize, speech: bool) -> Vec<f32> {
        vec![if speech { 0.9 } else { 0.1 }; chunks]
    }

    #[test]
    fn silent_input_emits_no_segments() {
        let cfg = make_config(6000);
        let chunk_samples = cfg.chunk_samples();
        let probs = envelope(333, false); // ~10s of silence at 30ms chunks
        let mut vad = VadEngine::new(&cfg, ScriptedEstimator::new(probs));
        let zero_frame = vec![0.0f32; chunk_samples];
        let mut total = Vec::new();
        for _ in 0..333 {
            total.extend(vad.process_frame(&zero_frame));
        }
        assert!(total.is_empty());
    }

    #[test]
    fn single_short_utterance_emits_one_final_segment() {
        let cfg = make_config(6000);
        let chunk_samples = cfg.chunk_samples();
        let mut probs = envelope(20, false);
        probs.extend(envelope(83, true)); // ~2.5s of speech
        probs.extend(envelope(40, false));
        let mut vad = VadEngine::new(&cfg, ScriptedEstimator::new(probs));
        let frame = vec![0.01f32; chunk_samples];
        let mut emitted = Vec::new();
        for _ in 0..143 {
            emitted.extend(vad.process_frame(&frame));
        }
        assert_eq!(emitted.len(), 1);
        assert!(!emitted[0].is_partial);
        assert!(emitted[0].duration_ms() > 0.0);
    }

    #[test]
    fn forced_split_bounds_segment_duration() {
        let cfg = make_config(4000); // ~133 chunks ceiling
        let chunk_samples = cfg.chunk_samples();
        let mut probs = envelope(10, false);
        probs.extend(envelope(333, true)); // ~10s continuous speech
        let mut vad = VadEngine::new(&cfg, ScriptedEstimator::new(probs));
        let frame = vec![0.02f32; chunk_samples];
        let mut emitted = Vec::new();
        for _ in 0..343 {
            emitted.extend(vad.process_frame(&frame));
        }
        assert!(emitted.len() >= 2);
        for seg in &emitted {
            assert!(seg.duration_ms() <= cfg.max_segment_duration_ms as f64 + 1.0);
            assert!(seg.is_partial);
        }
        let ids: Vec<u64> = emitted.iter().map(|s| s.id).collect();
        for w in ids.windows(2) {
            assert_eq!(w[1], w[0] + 1);
        }
    }
}
