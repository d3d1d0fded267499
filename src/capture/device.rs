//! Media device seam: acquiring microphone and camera streams.
//!
//! Acquired streams are wrapped in tracks that stop their device exactly
//! once, either explicitly or when dropped, so a track never outlives the
//! scope that owns it.

use crate::audio::recorder::{AudioConstraints, AudioSource, MockAudioSource};
use crate::error::{RehearseError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One encoded camera frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Requested camera settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// Trait for camera sources producing encoded frames.
pub trait VideoSource: Send {
    fn start(&mut self) -> Result<()>;

    /// Stop the camera. Stopping twice is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Drain the frames captured since the last read.
    fn read_frames(&mut self) -> Result<Vec<VideoFrame>>;

    fn label(&self) -> &str {
        "video"
    }
}

/// Provider of device streams.
pub trait MediaDevices: Send + Sync {
    /// Open and start a microphone stream.
    fn open_audio(&self, constraints: &AudioConstraints) -> Result<Box<dyn AudioSource>>;

    /// Open and start a camera stream.
    fn open_video(&self, constraints: &VideoConstraints) -> Result<Box<dyn VideoSource>>;
}

/// An acquired microphone stream.
pub struct AudioTrack {
    source: Box<dyn AudioSource>,
    stopped: bool,
}

impl AudioTrack {
    pub fn new(source: Box<dyn AudioSource>) -> Self {
        Self {
            source,
            stopped: false,
        }
    }

    pub fn read(&mut self) -> Result<Vec<i16>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.source.read_samples()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the underlying device once; later calls do nothing.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        match self.source.stop() {
            Ok(()) => debug!(track = self.source.label(), "audio track stopped"),
            Err(e) => warn!(track = self.source.label(), error = %e, "audio track stop failed"),
        }
    }
}

impl Drop for AudioTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// An acquired camera stream.
pub struct VideoTrack {
    source: Box<dyn VideoSource>,
    stopped: bool,
}

impl VideoTrack {
    pub fn new(source: Box<dyn VideoSource>) -> Self {
        Self {
            source,
            stopped: false,
        }
    }

    pub fn read(&mut self) -> Result<Vec<VideoFrame>> {
        if self.stopped {
            return Ok(Vec::new());
        }
        self.source.read_frames()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        match self.source.stop() {
            Ok(()) => debug!(track = self.source.label(), "video track stopped"),
            Err(e) => warn!(track = self.source.label(), error = %e, "video track stop failed"),
        }
    }
}

impl Drop for VideoTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Video source fed by the host application through a channel.
///
/// Useful when the camera is owned by a UI toolkit that already produces
/// encoded frames.
pub struct ChannelVideoSource {
    receiver: mpsc::UnboundedReceiver<VideoFrame>,
    started: bool,
}

impl ChannelVideoSource {
    /// Create the source and the sender the host pushes frames into.
    pub fn new() -> (Self, mpsc::UnboundedSender<VideoFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: rx,
                started: false,
            },
            tx,
        )
    }
}

impl VideoSource for ChannelVideoSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        self.receiver.close();
        Ok(())
    }

    fn read_frames(&mut self) -> Result<Vec<VideoFrame>> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.receiver.try_recv() {
            if self.started {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    fn label(&self) -> &str {
        "channel video"
    }
}

/// Mock video source for testing
#[derive(Debug, Clone)]
pub struct MockVideoSource {
    frame: Vec<u8>,
    frames_per_read: usize,
    started: bool,
}

impl MockVideoSource {
    pub fn new() -> Self {
        Self {
            frame: vec![0xAB; 1024],
            frames_per_read: 1,
            started: false,
        }
    }

    /// Size of each produced frame in bytes
    pub fn with_frame_size(mut self, bytes: usize) -> Self {
        self.frame = vec![0xAB; bytes];
        self
    }

    pub fn with_frames_per_read(mut self, frames: usize) -> Self {
        self.frames_per_read = frames;
        self
    }
}

impl Default for MockVideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for MockVideoSource {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn read_frames(&mut self) -> Result<Vec<VideoFrame>> {
        if !self.started {
            return Ok(Vec::new());
        }
        Ok((0..self.frames_per_read)
            .map(|_| VideoFrame::new(self.frame.clone()))
            .collect())
    }

    fn label(&self) -> &str {
        "mock camera"
    }
}

/// Counts device opens and stops across every track a provider hands out.
#[derive(Debug, Default)]
pub struct DeviceProbe {
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl DeviceProbe {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Tracks opened and not yet stopped.
    pub fn open_now(&self) -> usize {
        self.opened().saturating_sub(self.released())
    }
}

struct ProbedAudio {
    inner: MockAudioSource,
    probe: Arc<DeviceProbe>,
}

impl AudioSource for ProbedAudio {
    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        if self.inner.is_started() {
            self.probe.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.stop()
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        self.inner.read_samples()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

struct ProbedVideo {
    inner: MockVideoSource,
    probe: Arc<DeviceProbe>,
    started: bool,
}

impl VideoSource for ProbedVideo {
    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.inner.start()
    }

    fn stop(&mut self) -> Result<()> {
        if self.started {
            self.started = false;
            self.probe.released.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.stop()
    }

    fn read_frames(&mut self) -> Result<Vec<VideoFrame>> {
        self.inner.read_frames()
    }

    fn label(&self) -> &str {
        self.inner.label()
    }
}

/// Mock device provider for testing
#[derive(Clone)]
pub struct MockDevices {
    audio: MockAudioSource,
    video: MockVideoSource,
    fail_audio: bool,
    fail_video: bool,
    probe: Arc<DeviceProbe>,
}

impl MockDevices {
    pub fn new() -> Self {
        Self {
            audio: MockAudioSource::new(),
            video: MockVideoSource::new(),
            fail_audio: false,
            fail_video: false,
            probe: Arc::new(DeviceProbe::default()),
        }
    }

    pub fn with_audio(mut self, audio: MockAudioSource) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_video(mut self, video: MockVideoSource) -> Self {
        self.video = video;
        self
    }

    pub fn with_audio_failure(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    pub fn with_video_failure(mut self) -> Self {
        self.fail_video = true;
        self
    }

    pub fn probe(&self) -> Arc<DeviceProbe> {
        Arc::clone(&self.probe)
    }
}

impl Default for MockDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for MockDevices {
    fn open_audio(&self, _constraints: &AudioConstraints) -> Result<Box<dyn AudioSource>> {
        if self.fail_audio {
            return Err(RehearseError::DeviceUnavailable {
                device: "mock microphone".to_string(),
                message: "permission denied".to_string(),
            });
        }
        let mut source = ProbedAudio {
            inner: self.audio.clone(),
            probe: Arc::clone(&self.probe),
        };
        source.start()?;
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(source))
    }

    fn open_video(&self, _constraints: &VideoConstraints) -> Result<Box<dyn VideoSource>> {
        if self.fail_video {
            return Err(RehearseError::DeviceUnavailable {
                device: "mock camera".to_string(),
                message: "camera busy".to_string(),
            });
        }
        let mut source = ProbedVideo {
            inner: self.video.clone(),
            probe: Arc::clone(&self.probe),
            started: false,
        };
        source.start()?;
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(source))
    }
}
