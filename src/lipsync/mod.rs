//! Viseme-timed lip-sync for customer audio playback.

pub mod cues;
pub mod engine;
pub mod morph;
pub mod player;
#[cfg(feature = "playback")]
pub mod rodio_player;

pub use cues::{CueRecord, CueTimeline, MouthCue, Viseme};
pub use engine::{AnimationStream, LipSyncEngine, PlaybackHandle};
pub use morph::{MorphTable, MorphTarget, VisemeFrame};
pub use player::{PlayedResource, Player, ScriptedPlayer};
#[cfg(feature = "playback")]
pub use rodio_player::RodioPlayer;
