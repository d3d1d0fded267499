//! Microphone capture using CPAL (Cross-Platform Audio Library).

use crate::audio::recorder::{AudioConstraints, AudioSource};
use crate::capture::device::{MediaDevices, VideoConstraints, VideoSource};
use crate::error::{RehearseError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probes every backend it knows about, and ALSA/JACK print harmless
/// but alarming messages while it does.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on fd 2. Safe as long as no other thread
/// manipulates fd 2 concurrently.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Keep JACK and PipeWire quiet while CPAL probes backends.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: called from main before the runtime starts
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never a microphone.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

fn unavailable(device: &str, message: impl Into<String>) -> RehearseError {
    RehearseError::DeviceUnavailable {
        device: device.to_string(),
        message: message.into(),
    }
}

/// List input devices, marking preferred ones with "\[recommended\]".
///
/// # Errors
/// `DeviceUnavailable` if the host cannot enumerate devices.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    // host must outlive the device iterator
    let _host = host;
    let devices = devices.map_err(|e| unavailable("microphone", format!("enumeration failed: {}", e)))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Preferred PipeWire/Pulse device, else the system default.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }
        host.default_input_device()
            .ok_or_else(|| unavailable("default", "no input device"))
    })
}

fn find_device(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| unavailable(name, format!("enumeration failed: {}", e)))?;
        for device in devices {
            if device.name().is_ok_and(|n| n == name) {
                return Ok(device);
            }
        }
        Err(unavailable(name, "no such input device"))
    })
}

/// Wrapper making `cpal::Stream` Send.
///
/// SAFETY: the stream is only touched through the Mutex in
/// [`CpalAudioSource`], one thread at a time.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live microphone capture producing 16-bit mono PCM at the requested rate.
///
/// Tries i16 then f32 at the target format, and falls back to the device's
/// native config with software mixing and resampling.
pub struct CpalAudioSource {
    device: cpal::Device,
    label: String,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callbacks: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Open `device_name`, or the best default device when `None`.
    ///
    /// # Errors
    /// `DeviceUnavailable` if the device does not exist.
    pub fn new(device_name: Option<&str>, constraints: &AudioConstraints) -> Result<Self> {
        let device = match device_name {
            Some(name) => find_device(name)?,
            None => best_default_device()?,
        };
        let label = device.name().unwrap_or_else(|_| "microphone".to_string());
        if constraints.echo_cancellation {
            debug!(device = %label, "echo cancellation is left to the audio server");
        }
        Ok(Self {
            device,
            label,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(AtomicU64::new(0)),
            sample_rate: constraints.sample_rate,
        })
    }

    fn capture_error(&self, message: impl Into<String>) -> RehearseError {
        unavailable(&self.label, message)
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callbacks);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            stream_error,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callbacks);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|&s| f32_to_i16(s)));
                }
            },
            stream_error,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Capture at the device's native config and convert in software.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let config = self
            .device
            .default_input_config()
            .map_err(|e| self.capture_error(format!("no default input config: {}", e)))?;

        let native_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = config.clone().into();

        info!(
            channels,
            native_rate,
            format = ?config.sample_format(),
            "using native audio format, converting in software"
        );

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callbacks);
        let stream = match config.sample_format() {
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let converted = to_mono_at_rate(data, channels, native_rate, target_rate);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&converted);
                    }
                },
                stream_error,
                None,
            ),
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let samples: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                    let converted = to_mono_at_rate(&samples, channels, native_rate, target_rate);
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(&converted);
                    }
                },
                stream_error,
                None,
            ),
            other => {
                return Err(self.capture_error(format!(
                    "unsupported native sample format {:?}; pick another device",
                    other
                )));
            }
        };
        stream.map_err(|e| self.capture_error(format!("failed to build native stream: {}", e)))
    }
}

fn stream_error(err: cpal::StreamError) {
    warn!(error = %err, "audio stream error");
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Average channels down to mono, then resample.
fn to_mono_at_rate(samples: &[i16], channels: usize, source_rate: u32, target_rate: u32) -> Vec<i16> {
    let mono: Vec<i16> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };
    crate::audio::wav::resample(&mono, source_rate, target_rate)
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
        {
            return Ok(());
        }

        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| self.capture_error(format!("failed to start stream: {}", e)))?;

        // Some PipeWire-ALSA setups accept a non-native config and then never
        // call back.
        std::thread::sleep(Duration::from_millis(200));
        let stream = if self.callbacks.load(Ordering::Relaxed) == 0 {
            debug!(device = %self.label, "no callbacks at preferred format, retrying native");
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            let native = self.build_stream_native()?;
            native
                .play()
                .map_err(|e| self.capture_error(format!("failed to start native stream: {}", e)))?;
            native
        } else {
            stream
        };

        *self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(SendableStream(stream));
        info!(device = %self.label, rate = self.sample_rate, "microphone started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let taken = self
            .stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(stream) = taken {
            stream
                .0
                .pause()
                .map_err(|e| self.capture_error(format!("failed to stop stream: {}", e)))?;
            debug!(device = %self.label, "microphone stopped");
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| self.capture_error("audio buffer poisoned"))?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Host devices: CPAL microphones and no camera.
///
/// Video capture is not available through CPAL, so requests for a camera
/// fail with `DeviceUnavailable` and sessions that need video fail to begin.
#[derive(Debug, Clone, Default)]
pub struct CpalDevices {
    device: Option<String>,
}

impl CpalDevices {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl MediaDevices for CpalDevices {
    fn open_audio(&self, constraints: &AudioConstraints) -> Result<Box<dyn AudioSource>> {
        let mut source = CpalAudioSource::new(self.device.as_deref(), constraints)?;
        source.start()?;
        Ok(Box::new(source))
    }

    fn open_video(&self, _constraints: &VideoConstraints) -> Result<Box<dyn VideoSource>> {
        Err(unavailable("camera", "no camera backend on this host"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let stereo = [100i16, 300, -200, 200];
        assert_eq!(to_mono_at_rate(&stereo, 2, 16000, 16000), vec![200, 0]);
    }

    #[test]
    fn test_to_mono_resamples() {
        let input = vec![42i16; 480];
        let out = to_mono_at_rate(&input, 1, 48000, 16000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn test_f32_to_i16_clamps() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_camera_is_unavailable() {
        let devices = CpalDevices::default();
        let result = devices.open_video(&VideoConstraints::default());
        assert!(matches!(result, Err(RehearseError::DeviceUnavailable { .. })));
    }

    #[test]
    fn test_unknown_device_is_unavailable() {
        let result = CpalAudioSource::new(Some("NonExistentDevice12345"), &AudioConstraints::default());
        match result {
            Err(RehearseError::DeviceUnavailable { device, .. }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            _ => panic!("Expected DeviceUnavailable"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_capture_start_read_stop() {
        let devices = CpalDevices::default();
        let mut source = devices
            .open_audio(&AudioConstraints::default())
            .expect("open microphone");
        std::thread::sleep(Duration::from_millis(100));
        assert!(source.read_samples().is_ok());
        assert!(source.stop().is_ok());
        assert!(source.stop().is_ok());
    }
}
