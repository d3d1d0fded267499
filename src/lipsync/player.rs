//! Audio playback seam driven by the lip-sync engine.

use crate::error::{RehearseError, Result};
use crate::payload::{PlayableResource, UrlOrigin};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Plays one resource and reports the media clock.
///
/// Methods take `&self` so the engine's tick task and the caller's
/// playback handle can share one player.
#[async_trait]
pub trait Player: Send + Sync {
    /// Begin playing `resource`. Resolves once audio is actually playing.
    async fn start(&self, resource: &PlayableResource) -> Result<()>;

    /// Current playback position, `None` before start.
    fn position(&self) -> Option<Duration>;

    /// Whether the resource has played to the end or playback was stopped.
    fn is_finished(&self) -> bool;

    /// Stop playback. Stopping twice is a no-op.
    fn stop(&self);
}

/// What a [`ScriptedPlayer`] was asked to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayedResource {
    Url { url: String, origin: UrlOrigin },
    Buffer { id: u64, bytes: usize },
}

#[derive(Debug, Default)]
struct ScriptState {
    started_at: Option<Instant>,
    stopped_at: Option<Duration>,
    played: Vec<PlayedResource>,
}

/// Mock player whose clock follows tokio time for a fixed duration.
///
/// Pair with `#[tokio::test(start_paused = true)]` for deterministic positions.
#[derive(Debug)]
pub struct ScriptedPlayer {
    duration: Duration,
    fail_start: bool,
    state: Mutex<ScriptState>,
    stop_calls: AtomicUsize,
}

impl ScriptedPlayer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            fail_start: false,
            state: Mutex::new(ScriptState::default()),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Resources passed to `start`, in order.
    pub fn played(&self) -> Vec<PlayedResource> {
        self.lock().played.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn elapsed(&self) -> Option<Duration> {
        let state = self.lock();
        if let Some(at) = state.stopped_at {
            return Some(at);
        }
        state
            .started_at
            .map(|start| start.elapsed().min(self.duration))
    }
}

#[async_trait]
impl Player for ScriptedPlayer {
    async fn start(&self, resource: &PlayableResource) -> Result<()> {
        let played = match resource {
            PlayableResource::Url(url) => PlayedResource::Url {
                url: url.url.clone(),
                origin: url.origin,
            },
            PlayableResource::Buffer(buf) => PlayedResource::Buffer {
                id: buf.id(),
                bytes: buf.len(),
            },
        };
        let mut state = self.lock();
        state.played.push(played);
        if self.fail_start {
            return Err(RehearseError::Playback {
                message: "mock output device rejected the stream".to_string(),
            });
        }
        state.started_at = Some(Instant::now());
        state.stopped_at = None;
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.elapsed()
    }

    fn is_finished(&self) -> bool {
        let stopped = self.lock().stopped_at.is_some();
        stopped || self.elapsed().is_some_and(|e| e >= self.duration)
    }

    fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let position = self.elapsed();
        let mut state = self.lock();
        if state.started_at.is_some() && state.stopped_at.is_none() {
            state.stopped_at = position;
        }
    }
}
