//! Audio capture (spec §4.1). Grounded in the teacher's
//! `audio/pipeline/capture.rs`: a persistent resampler reused across calls
//! (never reconstructed per chunk — the teacher's comments call out the
//! energy-amplification bug that causes), a bounded channel the device
//! callback never blocks on, and the same `AudioError` shape.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::audio::devices::DeviceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioError {
    DeviceDisconnected,
    PermissionDenied,
    ChannelClosed,
    StreamFailed,
    BufferOverflow,
    ProcessingFailed,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            AudioError::DeviceDisconnected => "audio device disconnected",
            AudioError::PermissionDenied => "audio device permission denied",
            AudioError::ChannelClosed => "audio handoff channel closed",
            AudioError::StreamFailed => "audio stream failed",
            AudioError::BufferOverflow => "audio handoff channel full, chunk dropped",
            AudioError::ProcessingFailed => "audio processing failed",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for AudioError {}

fn build_resampler(from_rate: u32, to_rate: u32, chunk_size: usize) -> Option<SincFixedIn<f32>> {
    if from_rate == to_rate {
        return None;
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let (sinc_len, interpolation, oversampling) = if ratio >= 2.0 {
        (512, SincInterpolationType::Cubic, 512)
    } else if ratio >= 1.5 {
        (384, SincInterpolationType::Cubic, 384)
    } else if ratio > 1.0 {
        (256, SincInterpolationType::Linear, 256)
    } else if ratio <= 0.5 {
        (512, SincInterpolationType::Cubic, 512)
    } else {
        (384, SincInterpolationType::Linear, 384)
    };

    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: 0.95,
        interpolation,
        oversampling_factor: oversampling,
        window: WindowFunction::BlackmanHarris2,
    };

    match SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1) {
        Ok(r) => Some(r),
        Err(e) => {
            warn!("failed to build resampler ({from_rate}Hz -> {to_rate}Hz): {e}");
            None
        }
    }
}

fn mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Captures audio from one device and hands mono, resampled `f32` chunks to
/// a bounded channel. The device callback never blocks: a full channel drops
/// the chunk and reports `BufferOverflow` rather than stalling the driver.
pub struct AudioCapture {
    device_type: DeviceType,
    target_sample_rate: u32,
    source_sample_rate: u32,
    channels: u16,
    resampler: Arc<Mutex<Option<SincFixedIn<f32>>>>,
    resampler_input_buffer: Arc<Mutex<Vec<f32>>>,
    resampler_chunk_size: usize,
    sender: Sender<Vec<f32>>,
    error_sender: Sender<AudioError>,
    stopped: Arc<AtomicBool>,
}

impl AudioCapture {
    const RESAMPLER_CHUNK_SIZE: usize = 512;

    pub fn new(
        device_type: DeviceType,
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
    ) -> (Self, Receiver<Vec<f32>>, Receiver<AudioError>) {
        let (sender, receiver) = bounded(64);
        let (error_sender, error_receiver) = bounded(16);

        let resampler = build_resampler(source_sample_rate, target_sample_rate, Self::RESAMPLER_CHUNK_SIZE);
        if resampler.is_some() {
            info!(
                "capture: resampling {device_type:?} {source_sample_rate}Hz -> {target_sample_rate}Hz"
            );
        }

        let capture = Self {
            device_type,
            target_sample_rate,
            source_sample_rate,
            channels,
            resampler: Arc::new(Mutex::new(resampler)),
            resampler_input_buffer: Arc::new(Mutex::new(Vec::with_capacity(Self::RESAMPLER_CHUNK_SIZE * 2))),
            resampler_chunk_size: Self::RESAMPLER_CHUNK_SIZE,
            sender,
            error_sender,
            stopped: Arc::new(AtomicBool::new(false)),
        };

        (capture, receiver, error_receiver)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Device-callback entry point. Must never panic and must never block.
    pub fn process_audio_data(&self, data: &[f32]) {
        if self.stopped.load(Ordering::Relaxed) {
            return;
        }

        let mono_data = mono(data, self.channels);

        let to_send = if self.source_sample_rate != self.target_sample_rate {
            match self.resample_buffered(mono_data) {
                Some(chunk) => chunk,
                None => return, // still buffering toward a full resampler chunk
            }
        } else {
            mono_data
        };

        if to_send.is_empty() {
            return;
        }

        match self.sender.try_send(to_send) {
            Ok(()) => {}
            Err(crossbeam::channel::TrySendError::Full(_)) => {
                let _ = self.error_sender.try_send(AudioError::BufferOverflow);
            }
            Err(crossbeam::channel::TrySendError::Disconnected(_)) => {
                let _ = self.error_sender.try_send(AudioError::ChannelClosed);
            }
        }
    }

    fn resample_buffered(&self, mono_data: Vec<f32>) -> Option<Vec<f32>> {
        let mut buffer = self.resampler_input_buffer.lock().ok()?;
        buffer.extend_from_slice(&mono_data);

        let mut resampler_lock = self.resampler.lock().ok()?;
        let resampler = resampler_lock.as_mut()?;

        let mut out = Vec::new();
        while buffer.len() >= self.resampler_chunk_size {
            let chunk: Vec<f32> = buffer.drain(0..self.resampler_chunk_size).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut waves_out) => {
                    if let Some(produced) = waves_out.pop() {
                        out.extend_from_slice(&produced);
                    }
                }
                Err(e) => {
                    warn!("resampler processing failed: {e}, dropping buffered chunk");
                    break;
                }
            }
        }

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    pub fn handle_stream_error(&self, error: cpal::StreamError) {
        error!("audio stream error ({:?}): {error}", self.device_type);
        let lowered = error.to_string().to_lowercase();
        let mapped = if lowered.contains("disconnect") || lowered.contains("no such device") {
            AudioError::DeviceDisconnected
        } else if lowered.contains("permission") || lowered.contains("access denied") {
            AudioError::PermissionDenied
        } else {
            AudioError::StreamFailed
        };
        let _ = self.error_sender.try_send(mapped);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

/// Builds and plays a `cpal` input stream that feeds `capture`. Returned
/// `cpal::Stream` must be kept alive for the duration of capture.
pub fn start_stream(device: &cpal::Device, config: &cpal::StreamConfig, capture: Arc<AudioCapture>) -> anyhow::Result<cpal::Stream> {
    let err_capture = capture.clone();
    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _| capture.process_audio_data(data),
        move |err| err_capture.handle_stream_error(err),
        None,
    )?;
    stream.play()?;
    debug!("capture stream started");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_when_rates_match() {
        let (capture, rx, _err_rx) = AudioCapture::new(DeviceType::Microphone, 16_000, 16_000, 1);
        capture.process_audio_data(&[0.1, 0.2, 0.3]);
        let received = rx.try_recv().expect("chunk should pass through unresampled");
        assert_eq!(received, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn stereo_input_is_downmixed_to_mono() {
        let (capture, rx, _err_rx) = AudioCapture::new(DeviceType::Microphone, 16_000, 16_000, 2);
        capture.process_audio_data(&[1.0, 0.0, 0.5, 0.5]);
        let received = rx.try_recv().expect("mono chunk");
        assert_eq!(received, vec![0.5, 0.5]);
    }

    #[test]
    fn stopped_capture_drops_incoming_audio() {
        let (capture, rx, _err_rx) = AudioCapture::new(DeviceType::Microphone, 16_000, 16_000, 1);
        capture.stop();
        capture.process_audio_data(&[0.1, 0.2]);
        assert!(rx.try_recv().is_err());
    }
}
