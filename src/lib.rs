//! Real-time streaming speech-to-speech translation core.
//!
//! Captures one audio device, segments it into speech with a neural VAD,
//! runs cumulative-context streaming ASR in draft/final modes, and feeds
//! finished transcripts through semantically-gated streaming translation —
//! all wired together by the concurrency fabric in [`pipeline`].
//!
//! This crate is a library: it has no UI of its own. A caller starts
//! capture with [`start_capture`], hands the resulting channel to
//! [`pipeline::Pipeline::spawn`] along with a VAD estimator, an ASR model
//! path, a translation backend, and an [`pipeline::OutputSink`], and reads
//! results from the sink until [`pipeline::Pipeline::shutdown`].

#[macro_use]
pub mod macros;

pub mod asr;
pub mod audio;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod text_match;
pub mod translation;
pub mod vad;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cpal::traits::DeviceTrait;
use crossbeam::channel::Receiver;

use crate::audio::capture::{start_stream, AudioCapture, AudioError};
use crate::audio::devices::{resolve_device, DeviceType};
use crate::config::PipelineConfig;

/// Initializes the ambient logger (reads `RUST_LOG`, defaults to `info`,
/// timestamps to millisecond precision). Call once, before starting capture
/// or spawning a pipeline.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

/// A live capture stream plus the channels `Pipeline::spawn` reads from.
/// Drop order matters: `stream` must outlive the capture session — once it
/// drops, the underlying `cpal` stream stops and `audio_rx` goes idle.
pub struct CaptureHandle {
    pub stream: cpal::Stream,
    pub audio_rx: Receiver<Vec<f32>>,
    pub error_rx: Receiver<AudioError>,
    pub capture: Arc<AudioCapture>,
}

/// Resolves the configured input device (or the host default), starts a
/// `cpal` stream at the device's own native format, and wires it through an
/// `AudioCapture` that resamples to `config.sample_rate` and downmixes to
/// mono (spec §4.1). The returned `audio_rx` is exactly what
/// `pipeline::Pipeline::spawn` expects as its `audio_rx` argument.
pub fn start_capture(config: &PipelineConfig) -> Result<CaptureHandle> {
    let device_type = DeviceType::from(config.audio_source);
    let device = resolve_device(device_type, config.audio_device_index).context("failed to resolve an input device")?;

    let supported = device
        .default_input_config()
        .context("failed to read the input device's default config")?;
    let source_sample_rate = supported.sample_rate().0;
    let channels = supported.channels();

    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let (capture, audio_rx, error_rx) = AudioCapture::new(device_type, source_sample_rate, config.sample_rate, channels);
    let capture = Arc::new(capture);

    let stream = start_stream(&device, &stream_config, capture.clone())
        .map_err(|e| anyhow!("failed to start capture stream: {e}"))?;

    Ok(CaptureHandle {
        stream,
        audio_rx,
        error_rx,
        capture,
    })
}
