//! rehearse - voice conversation engine for role-play training
//!
//! Captures the trainee's voice (and optionally video), turns whatever audio
//! the dialogue service returns into something playable, animates an avatar
//! mouth against viseme cues while it plays, and drives turn-taking,
//! goal analysis and end-of-conversation detection.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod capture;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod conversation;
pub mod defaults;
pub mod error;
pub mod lipsync;
pub mod payload;
pub mod remote;
pub mod session;

// Device seams
pub use audio::recorder::AudioSource;
pub use capture::{CaptureSession, MediaDevices, VideoSource};

// Payloads and playback
pub use lipsync::{LipSyncEngine, Player};
pub use payload::{AudioPayload, PayloadNormalizer, PlayableResource};

// Conversation
pub use conversation::{ConversationEvent, TraineeInput, TurnController, TurnState};
pub use remote::{DialogueService, GoalEvaluator, Uploader};
pub use session::SessionContext;

// Error handling
pub use error::{RehearseError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
