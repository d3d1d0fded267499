//! Turn-taking state machine.
//!
//! Transitions are a pure function of (state, event); the controller applies
//! them at its await points.

use crate::error::{RehearseError, Result};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TurnState {
    AwaitingTraineeInput,
    ProcessingTraineeTurn,
    AwaitingCustomerAudio,
    PlayingCustomerTurn,
    Ended,
}

impl TurnState {
    /// Whether a new trainee turn may be submitted.
    pub fn accepts_input(self) -> bool {
        self == TurnState::AwaitingTraineeInput
    }

    /// States during which a submitted turn is still being handled.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            TurnState::ProcessingTraineeTurn
                | TurnState::AwaitingCustomerAudio
                | TurnState::PlayingCustomerTurn
        )
    }

    pub fn is_terminal(self) -> bool {
        self == TurnState::Ended
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::AwaitingTraineeInput => "awaiting-trainee-input",
            TurnState::ProcessingTraineeTurn => "processing-trainee-turn",
            TurnState::AwaitingCustomerAudio => "awaiting-customer-audio",
            TurnState::PlayingCustomerTurn => "playing-customer-turn",
            TurnState::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnEvent {
    /// Trainee submitted voice or text.
    Submit,
    /// The dialogue service answered.
    ReplyReceived,
    /// The dialogue service failed; back to the pre-call state.
    RemoteFailed,
    /// Customer turn handed to playback, or shown text-only.
    CustomerDispatched,
    /// Customer audio ended or was stopped.
    PlaybackFinished,
    /// The armed end-of-conversation wait ran out.
    EndTimerElapsed,
}

impl fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnEvent::Submit => "submit",
            TurnEvent::ReplyReceived => "reply-received",
            TurnEvent::RemoteFailed => "remote-failed",
            TurnEvent::CustomerDispatched => "customer-dispatched",
            TurnEvent::PlaybackFinished => "playback-finished",
            TurnEvent::EndTimerElapsed => "end-timer-elapsed",
        };
        f.write_str(name)
    }
}

/// Next state for `event` in `state`.
///
/// # Errors
/// `InvalidTransition` when `event` is not accepted in `state`.
pub fn transition(state: TurnState, event: TurnEvent) -> Result<TurnState> {
    use TurnEvent::*;
    use TurnState::*;

    match (state, event) {
        (AwaitingTraineeInput, Submit) => Ok(ProcessingTraineeTurn),
        (ProcessingTraineeTurn, ReplyReceived) => Ok(AwaitingCustomerAudio),
        (ProcessingTraineeTurn, RemoteFailed) => Ok(AwaitingTraineeInput),
        (AwaitingCustomerAudio, CustomerDispatched) => Ok(PlayingCustomerTurn),
        (PlayingCustomerTurn, PlaybackFinished) => Ok(AwaitingTraineeInput),
        (PlayingCustomerTurn, EndTimerElapsed) => Ok(Ended),
        (from, event) => Err(RehearseError::InvalidTransition {
            from: from.to_string(),
            event: event.to_string(),
        }),
    }
}
