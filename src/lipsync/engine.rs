//! Media-clock driven viseme animation.
//!
//! Each render tick polls the player position, looks the position up in the
//! cue timeline and emits one absolute [`VisemeFrame`]. The stream always
//! ends with a rest frame so the avatar never keeps a stale mouth shape.

use crate::config::Config;
use crate::error::{RehearseError, Result};
use crate::lipsync::cues::CueTimeline;
use crate::lipsync::morph::{MorphTable, VisemeFrame};
use crate::lipsync::player::Player;
use crate::payload::PlayableResource;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Maps playback position to morph weights.
#[derive(Debug, Clone)]
pub struct LipSyncEngine {
    table: Arc<MorphTable>,
    tick: Duration,
}

impl LipSyncEngine {
    pub fn new(table: MorphTable, tick_hz: u32) -> Self {
        Self {
            table: Arc::new(table),
            tick: Duration::from_secs_f64(1.0 / tick_hz.max(1) as f64),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.lipsync.morph_table()?,
            config.playback.tick_hz,
        ))
    }

    pub fn table(&self) -> &MorphTable {
        &self.table
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Frame for a playback position.
    pub fn frame_at(&self, cues: &CueTimeline, position: Duration) -> VisemeFrame {
        self.table.frame(cues.viseme_at(position.as_secs_f64()))
    }

    /// Frames for every tick of the timeline without playing audio,
    /// followed by a rest frame.
    pub fn render(&self, cues: &CueTimeline) -> Vec<(Duration, VisemeFrame)> {
        let end = Duration::from_secs_f64(cues.duration());
        let mut frames = Vec::new();
        let mut position = Duration::ZERO;
        while position < end {
            frames.push((position, self.frame_at(cues, position)));
            position += self.tick;
        }
        frames.push((position, self.table.rest_frame()));
        frames
    }

    /// Start `player` on `resource` and animate against `cues`.
    ///
    /// The stream owns the resource; it is released once, when playback
    /// finishes, is stopped, or fails to start.
    ///
    /// # Errors
    /// `Playback` if the player cannot start.
    pub async fn play(
        &self,
        player: Arc<dyn Player>,
        resource: PlayableResource,
        cues: CueTimeline,
    ) -> Result<AnimationStream> {
        if let Err(e) = player.start(&resource).await {
            warn!(error = %e, local = resource.is_local(), "playback failed to start");
            drop(resource);
            return Err(match e {
                RehearseError::Playback { .. } => e,
                other => RehearseError::Playback {
                    message: other.to_string(),
                },
            });
        }

        info!(cues = cues.len(), local = resource.is_local(), "playback started");
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            resource: Mutex::new(Some(resource)),
            player,
            stop: Mutex::new(Some(stop_tx)),
        });
        let (finished_tx, finished_rx) = watch::channel(false);

        tokio::spawn(run_ticks(
            Arc::clone(&shared),
            Arc::clone(&self.table),
            cues,
            self.tick,
            frame_tx,
            stop_rx,
            finished_tx,
        ));

        Ok(AnimationStream {
            frames: frame_rx,
            handle: PlaybackHandle {
                shared,
                finished: finished_rx,
            },
        })
    }
}

struct Shared {
    resource: Mutex<Option<PlayableResource>>,
    player: Arc<dyn Player>,
    /// Emptied when playback ends from either side; later stops are no-ops.
    stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shared {
    fn take_stop(&self) -> Option<oneshot::Sender<()>> {
        self.stop
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Drop the resource if nobody has yet.
    fn release(&self) {
        let taken = self
            .resource
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(resource) = taken {
            debug!(local = resource.is_local(), "playback resource released");
        }
    }
}

/// Frames for one playback plus the handle controlling it.
pub struct AnimationStream {
    frames: mpsc::UnboundedReceiver<VisemeFrame>,
    handle: PlaybackHandle,
}

impl AnimationStream {
    /// Next frame, or `None` once the stream has ended.
    pub async fn next_frame(&mut self) -> Option<VisemeFrame> {
        self.frames.recv().await
    }

    pub fn handle(&self) -> &PlaybackHandle {
        &self.handle
    }

    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<VisemeFrame>, PlaybackHandle) {
        (self.frames, self.handle)
    }
}

/// Controls a running playback. Dropping the handle stops it.
pub struct PlaybackHandle {
    shared: Arc<Shared>,
    finished: watch::Receiver<bool>,
}

impl PlaybackHandle {
    /// Cancel future ticks and release the resource. Idempotent.
    pub fn stop(&self) {
        if let Some(sender) = self.shared.take_stop() {
            debug!("playback stop requested");
            let _ = sender.send(());
            self.shared.player.stop();
            self.shared.release();
        }
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// A receiver that flips to `true` when the tick loop has exited.
    pub fn finished(&self) -> watch::Receiver<bool> {
        self.finished.clone()
    }

    /// Wait for playback to end on its own or through [`PlaybackHandle::stop`].
    pub async fn wait(&self) {
        let mut finished = self.finished.clone();
        // Err means the tick task is gone, which also means it finished.
        let _ = finished.wait_for(|done| *done).await;
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    shared: Arc<Shared>,
    table: Arc<MorphTable>,
    cues: CueTimeline,
    tick: Duration,
    frames: mpsc::UnboundedSender<VisemeFrame>,
    mut stop: oneshot::Receiver<()>,
    finished: watch::Sender<bool>,
) {
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if shared.player.is_finished() {
                    break;
                }
                let viseme = shared
                    .player
                    .position()
                    .and_then(|position| cues.viseme_at(position.as_secs_f64()));
                let _ = frames.send(table.frame(viseme));
                ticks += 1;
            }
        }
    }

    let natural_end = shared.take_stop().is_some();
    let _ = frames.send(table.rest_frame());
    if natural_end {
        shared.player.stop();
    }
    shared.release();
    finished.send_replace(true);
    debug!(ticks, "lip-sync stream ended");
}
