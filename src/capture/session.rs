//! Capture session: device lifecycle and the dual-encoder pump.
//!
//! One pump task owns the acquired tracks and both encoders. It polls the
//! shared microphone stream and fans every buffer out to the transcription
//! encoder and, when video was requested, the archival encoder. The tracks
//! are stopped when the pump exits, whatever the reason: stop, cancel,
//! teardown (the session handle was dropped) or a device failure. A torn
//! down session still finalizes and uploads its archival recording.

use crate::audio::gate::NoiseGate;
use crate::audio::recorder::AudioConstraints;
use crate::capture::device::{AudioTrack, MediaDevices, VideoConstraints, VideoTrack};
use crate::capture::encoder::{ArchivalBlob, ArchivalEncoder, AudioBlob, TranscriptionEncoder};
use crate::config::CaptureConfig;
use crate::error::{RehearseError, Result};
use crate::remote::upload::Uploader;
use crate::session::{SessionContext, SessionMetadata};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What happened to the archival recording after stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchivalOutcome {
    /// Handed to the upload collaborator.
    Uploaded { bytes: usize },
    /// Nothing was recorded, or no uploader is configured.
    Skipped,
    /// Encoding or upload failed; logged only.
    Failed(String),
}

/// Result of stopping a capture session.
#[derive(Debug)]
pub struct RecordingBundle {
    /// Voice-only recording for the transcription service.
    pub transcription: AudioBlob,
    /// Background finalization of the archival recording, if video was captured.
    pub archival: Option<JoinHandle<ArchivalOutcome>>,
}

/// Settings for one capture session, usually derived from [`CaptureConfig`].
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub audio: AudioConstraints,
    pub video: VideoConstraints,
    pub noise_gate_threshold: f32,
    pub archival_bitrate_bps: u32,
    pub chunk_interval: Duration,
    pub poll_interval: Duration,
}

impl From<&CaptureConfig> for CaptureOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            audio: AudioConstraints {
                sample_rate: config.sample_rate,
                echo_cancellation: config.echo_cancellation,
                noise_suppression: config.noise_suppression,
            },
            video: VideoConstraints::default(),
            noise_gate_threshold: config.noise_gate_threshold,
            archival_bitrate_bps: config.archival_bitrate_bps,
            chunk_interval: Duration::from_millis(config.chunk_interval_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

enum PumpExit {
    Stop,
    Cancel,
    Teardown,
    DeviceLost(String),
}

struct PumpOutput {
    transcription: TranscriptionEncoder,
    archival: Option<ArchivalEncoder>,
}

struct Tracks {
    audio: AudioTrack,
    video: Option<VideoTrack>,
}

impl Tracks {
    fn release(&mut self) {
        self.audio.stop();
        if let Some(video) = self.video.as_mut() {
            video.stop();
        }
    }
}

/// An active recording. Created by [`CaptureSession::begin`], finished by
/// [`CaptureSession::stop`] or [`CaptureSession::cancel`].
pub struct CaptureSession {
    metadata: SessionMetadata,
    control: Option<oneshot::Sender<bool>>,
    pump: Option<JoinHandle<PumpOutput>>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl CaptureSession {
    /// Acquire devices and start both encoders.
    ///
    /// # Errors
    /// `DeviceUnavailable` if the microphone, or the camera when requested,
    /// cannot be opened. Anything already opened is released before returning.
    pub async fn begin(
        ctx: &SessionContext,
        want_video: bool,
        devices: Arc<dyn MediaDevices>,
        options: CaptureOptions,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> Result<Self> {
        let session_id = ctx.session_id();
        let audio_constraints = options.audio;
        let video_constraints = options.video;

        let tracks = tokio::task::spawn_blocking(move || -> Result<Tracks> {
            let audio = AudioTrack::new(devices.open_audio(&audio_constraints)?);
            // On camera failure the audio track drops here and is released.
            let video = if want_video {
                Some(VideoTrack::new(devices.open_video(&video_constraints)?))
            } else {
                None
            };
            Ok(Tracks { audio, video })
        })
        .await
        .map_err(|e| RehearseError::DeviceUnavailable {
            device: "capture".to_string(),
            message: format!("device acquisition task failed: {}", e),
        })?
        .inspect_err(|e| warn!(%session_id, error = %e, "device acquisition failed"))?;

        if audio_constraints.echo_cancellation {
            debug!(%session_id, "echo cancellation requested; relying on the host audio stack");
        }

        let sample_rate = audio_constraints.sample_rate;
        let transcription = TranscriptionEncoder::new(sample_rate);
        let archival = tracks.video.is_some().then(|| {
            ArchivalEncoder::new(sample_rate, options.archival_bitrate_bps, options.chunk_interval)
        });
        let gate = audio_constraints
            .noise_suppression
            .then(|| NoiseGate::new(options.noise_gate_threshold));

        let (control_tx, control_rx) = oneshot::channel();
        let pump = tokio::spawn(run_pump(
            tracks,
            transcription,
            archival,
            gate,
            options.poll_interval,
            options.chunk_interval,
            control_rx,
        ));

        info!(%session_id, video = want_video, "capture started");
        Ok(Self {
            metadata: ctx.metadata.clone(),
            control: Some(control_tx),
            pump: Some(pump),
            uploader,
        })
    }

    /// Whether the session is still recording.
    pub fn is_active(&self) -> bool {
        self.control.is_some()
    }

    /// Stop recording, release the devices and finalize both encoders.
    ///
    /// The transcription blob is returned immediately; the archival
    /// recording is finalized and uploaded in the background. Returns
    /// `Ok(None)` if the session was already stopped or cancelled.
    ///
    /// # Errors
    /// `Encoder` if the transcription blob cannot be produced. The devices
    /// are released regardless.
    pub async fn stop(&mut self) -> Result<Option<RecordingBundle>> {
        let Some(output) = self.shutdown(true).await? else {
            return Ok(None);
        };

        let transcription = output.transcription.finish()?;
        let archival = output.archival.map(|encoder| {
            tokio::spawn(finalize_archival(
                encoder,
                self.uploader.clone(),
                self.metadata.clone(),
            ))
        });

        info!(
            session_id = %self.metadata.session_id,
            duration_ms = transcription.duration_ms,
            archival = archival.is_some(),
            "capture stopped"
        );
        Ok(Some(RecordingBundle {
            transcription,
            archival,
        }))
    }

    /// Stop recording and discard everything captured.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.shutdown(false).await?.is_some() {
            info!(session_id = %self.metadata.session_id, "capture cancelled");
        }
        Ok(())
    }

    async fn shutdown(&mut self, keep: bool) -> Result<Option<PumpOutput>> {
        let Some(control) = self.control.take() else {
            return Ok(None);
        };
        // The pump may already have exited on a device failure.
        let _ = control.send(keep);

        let Some(pump) = self.pump.take() else {
            return Ok(None);
        };
        let output = pump.await.map_err(|e| RehearseError::Encoder {
            encoder: "capture".to_string(),
            message: format!("capture task failed: {}", e),
        })?;
        Ok(Some(output))
    }
}

impl Drop for CaptureSession {
    /// Tears down an active session. Devices are released by the pump and
    /// whatever the archival encoder holds is still finalized and uploaded.
    fn drop(&mut self) {
        let Some(control) = self.control.take() else {
            return;
        };
        drop(control);
        let Some(pump) = self.pump.take() else {
            return;
        };
        debug!(session_id = %self.metadata.session_id, "capture session dropped while active");

        let uploader = self.uploader.clone();
        let metadata = self.metadata.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match pump.await {
                        Ok(PumpOutput {
                            archival: Some(encoder),
                            ..
                        }) => {
                            finalize_archival(encoder, uploader, metadata).await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "capture task failed during teardown"),
                    }
                });
            }
            Err(_) => warn!(
                session_id = %metadata.session_id,
                "capture session dropped outside a runtime; archival recording discarded"
            ),
        }
    }
}

async fn run_pump(
    mut tracks: Tracks,
    mut transcription: TranscriptionEncoder,
    mut archival: Option<ArchivalEncoder>,
    gate: Option<NoiseGate>,
    poll_interval: Duration,
    chunk_interval: Duration,
    mut control: oneshot::Receiver<bool>,
) -> PumpOutput {
    let mut poll = time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut chunks = time::interval_at(Instant::now() + chunk_interval, chunk_interval);
    chunks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            signal = &mut control => {
                break match signal {
                    Ok(true) => PumpExit::Stop,
                    Ok(false) => PumpExit::Cancel,
                    Err(_) => PumpExit::Teardown,
                };
            }
            _ = poll.tick() => {
                if let Err(e) = pump_once(&mut tracks, &mut transcription, &mut archival, gate) {
                    break PumpExit::DeviceLost(e.to_string());
                }
            }
            _ = chunks.tick() => {
                if let Some(encoder) = archival.as_mut() {
                    encoder.flush_chunk();
                }
            }
        }
    };

    match &exit {
        PumpExit::Stop | PumpExit::Teardown => {
            // Whatever the device buffered since the last poll.
            if let Err(e) = pump_once(&mut tracks, &mut transcription, &mut archival, gate) {
                warn!(error = %e, "final capture read failed");
            }
        }
        PumpExit::Cancel => debug!("capture pump cancelled"),
        PumpExit::DeviceLost(reason) => warn!(%reason, "capture device lost"),
    }

    tracks.release();

    PumpOutput {
        transcription,
        archival,
    }
}

fn pump_once(
    tracks: &mut Tracks,
    transcription: &mut TranscriptionEncoder,
    archival: &mut Option<ArchivalEncoder>,
    gate: Option<NoiseGate>,
) -> Result<()> {
    let mut samples = tracks.audio.read()?;
    if !samples.is_empty() {
        if let Some(gate) = gate {
            gate.apply(&mut samples);
        }
        transcription.push(&samples);
        if let Some(encoder) = archival.as_mut()
            && encoder.failure().is_none()
            && let Err(e) = encoder.push_audio(&samples)
        {
            warn!(error = %e, "archival encoder stopped accepting audio");
        }
    }

    if let Some(video) = tracks.video.as_mut() {
        let frames = match video.read() {
            Ok(frames) => frames,
            Err(e) => {
                // The camera only feeds the archival recording.
                warn!(error = %e, "camera read failed; continuing audio-only");
                video.stop();
                Vec::new()
            }
        };
        if let Some(encoder) = archival.as_mut() {
            for frame in &frames {
                if encoder.failure().is_some() {
                    break;
                }
                if let Err(e) = encoder.push_video(frame) {
                    warn!(error = %e, "archival encoder stopped accepting video");
                }
            }
        }
    }
    Ok(())
}

async fn finalize_archival(
    encoder: ArchivalEncoder,
    uploader: Option<Arc<dyn Uploader>>,
    metadata: SessionMetadata,
) -> ArchivalOutcome {
    let blob: ArchivalBlob = match encoder.finish() {
        Ok(blob) => blob,
        Err(e) => {
            warn!(session_id = %metadata.session_id, error = %e, "archival recording failed");
            return ArchivalOutcome::Failed(e.to_string());
        }
    };

    if blob.is_empty() {
        debug!(session_id = %metadata.session_id, "archival recording empty, skipping upload");
        return ArchivalOutcome::Skipped;
    }

    let Some(uploader) = uploader else {
        debug!(session_id = %metadata.session_id, "no upload collaborator configured");
        return ArchivalOutcome::Skipped;
    };

    let bytes = blob.bytes.len();
    match uploader.upload(blob, &metadata).await {
        Ok(()) => {
            info!(session_id = %metadata.session_id, bytes, "archival recording uploaded");
            ArchivalOutcome::Uploaded { bytes }
        }
        Err(e) => {
            warn!(session_id = %metadata.session_id, error = %e, "archival upload failed");
            ArchivalOutcome::Failed(e.to_string())
        }
    }
}
