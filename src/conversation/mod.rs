//! Conversation orchestration: transcript, turn state, closing detection
//! and goal analysis.

pub mod closing;
pub mod controller;
pub mod goals;
pub mod state;
pub mod transcript;

pub use closing::{ClosingLexicon, end_wait};
pub use controller::{Collaborators, TraineeInput, TurnController, TurnOutcome};
pub use goals::{AchievedGoals, GoalTracker};
pub use state::{TurnEvent, TurnState, transition};
pub use transcript::{ChatLine, ChatTurn, Speaker, Transcript};

/// Notifications emitted by a [`TurnController`] for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// A turn was appended to the transcript.
    TurnAppended(ChatTurn),
    StateChanged { from: TurnState, to: TurnState },
    /// The achieved-goal set was replaced by a newer analysis.
    GoalsUpdated(AchievedGoals),
    /// A user-facing message, e.g. after a failed dialogue request.
    Notice(String),
}
