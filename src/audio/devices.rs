//! Device enumeration (spec §4.1): microphone and system-audio sources.
//! Thin wrapper over `cpal`'s host/device API, in the teacher's habit of
//! carrying a small `DeviceType`/`AudioDevice` pair rather than passing
//! `cpal::Device` around directly.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::config::AudioSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Microphone,
    SystemAudio,
}

impl From<AudioSource> for DeviceType {
    fn from(source: AudioSource) -> Self {
        match source {
            AudioSource::Microphone => DeviceType::Microphone,
            AudioSource::SystemAudio => DeviceType::SystemAudio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub device_type: DeviceType,
    pub index: usize,
}

/// Names that mark an input device as a loopback/monitor source rather than
/// a physical microphone, on platforms where loopback shows up as a plain
/// input device (PipeWire/PulseAudio monitor sources on Linux, virtual
/// drivers like BlackHole/Soundflower on macOS).
const LOOPBACK_NAME_HINTS: &[&str] = &["monitor", "loopback", "blackhole", "soundflower", "stereo mix"];

fn looks_like_loopback(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_NAME_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Finds devices capable of system-audio (loopback) capture, per platform.
/// Returns an empty list rather than guessing at a microphone substitute —
/// spec: "System-audio on platforms without a loopback device reports 'not
/// available' at enumeration; never guesses."
fn loopback_devices(host: &cpal::Host) -> Result<Vec<cpal::Device>> {
    let mut found = Vec::new();

    // Linux: PipeWire/PulseAudio expose loopback as a named "monitor" input.
    #[cfg(target_os = "linux")]
    {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if looks_like_loopback(&name) {
                        found.push(device);
                    }
                }
            }
        }
    }

    // macOS: loopback requires a virtual driver (BlackHole, Soundflower),
    // which also shows up as a named input device. No driver, no devices.
    #[cfg(target_os = "macos")]
    {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if looks_like_loopback(&name) {
                        found.push(device);
                    }
                }
            }
        }
    }

    // Windows: WASAPI exposes loopback capture on the default output device
    // itself, so its presence is the loopback-capability signal.
    #[cfg(target_os = "windows")]
    {
        if let Some(device) = host.default_output_device() {
            found.push(device);
        }
    }

    let _ = host; // silence unused-binding warning on targets with no branch above
    Ok(found)
}

/// Lists input-capable devices for the given source kind.
///
/// `Microphone` enumerates the host's input device list directly.
/// `SystemAudio` enumerates only devices with demonstrated loopback
/// capability; if none exist on this platform/host, returns an explicit
/// "not available" error instead of falling back to the microphone list.
pub fn enumerate_devices(device_type: DeviceType) -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();

    let devices: Vec<cpal::Device> = match device_type {
        DeviceType::Microphone => host
            .input_devices()
            .map_err(|e| anyhow!("failed to enumerate input devices: {e}"))?
            .collect(),
        DeviceType::SystemAudio => {
            let found = loopback_devices(&host)?;
            if found.is_empty() {
                return Err(anyhow!(
                    "system audio capture is not available: no loopback device found on this platform"
                ));
            }
            found
        }
    };

    let mut result = Vec::new();
    for (index, device) in devices.into_iter().enumerate() {
        let name = device.name().unwrap_or_else(|_| format!("device-{index}"));
        result.push(AudioDevice {
            name,
            device_type,
            index,
        });
    }
    Ok(result)
}

/// Resolves a configured `audio_device_index` (or the source-appropriate
/// default) to a concrete `cpal::Device`. `SystemAudio` never falls back to
/// a microphone device: with no loopback device available, this fails
/// explicitly rather than guessing (spec §4.1).
pub fn resolve_device(device_type: DeviceType, device_index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match device_type {
        DeviceType::Microphone => {
            if let Some(index) = device_index {
                let device = host
                    .input_devices()
                    .map_err(|e| anyhow!("failed to enumerate input devices: {e}"))?
                    .nth(index)
                    .ok_or_else(|| anyhow!("no input device at index {index}"))?;
                return Ok(device);
            }
            host.default_input_device()
                .ok_or_else(|| anyhow!("no default input device available"))
        }
        DeviceType::SystemAudio => {
            let mut found = loopback_devices(&host)?;
            if found.is_empty() {
                return Err(anyhow!(
                    "system audio capture is not available: no loopback device found on this platform"
                ));
            }
            match device_index {
                Some(index) => {
                    if index >= found.len() {
                        return Err(anyhow!("no loopback device at index {index}"));
                    }
                    Ok(found.swap_remove(index))
                }
                None => Ok(found.swap_remove(0)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_maps_from_audio_source() {
        assert_eq!(DeviceType::from(AudioSource::Microphone), DeviceType::Microphone);
        assert_eq!(DeviceType::from(AudioSource::SystemAudio), DeviceType::SystemAudio);
    }

    #[test]
    fn loopback_name_hints_match_known_monitor_devices() {
        assert!(looks_like_loopback("Monitor of Built-in Audio Analog Stereo"));
        assert!(looks_like_loopback("BlackHole 2ch"));
        assert!(looks_like_loopback("Stereo Mix (Realtek Audio)"));
    }

    #[test]
    fn loopback_name_hints_do_not_match_a_plain_microphone() {
        assert!(!looks_like_loopback("Built-in Microphone"));
        assert!(!looks_like_loopback("USB Headset Mic"));
    }
}
