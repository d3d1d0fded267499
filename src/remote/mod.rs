//! Remote collaborators: dialogue, goal evaluation and recording upload.

pub mod dialogue;
pub mod goals;
#[cfg(feature = "remote-http")]
pub mod http;
pub mod upload;

pub use dialogue::{DialogueReply, DialogueRequest, DialogueService, MockDialogue, Utterance};
pub use goals::{GoalEvaluator, GoalReport, GoalRequest, MockGoalEvaluator};
#[cfg(feature = "remote-http")]
pub use http::{HttpDialogue, HttpGoalEvaluator, HttpServices, HttpUploader, build_client};
pub use upload::{RecordingUploader, Uploader};
