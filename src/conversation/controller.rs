//! Turn controller: drives one trainee/customer exchange at a time.
//!
//! The controller owns the transcript for the session. A submitted turn
//! goes to the dialogue service; on reply the trainee and customer turns are
//! appended in that order, the customer audio is normalized and handed to
//! the lip-sync engine, and goal analysis is rescheduled. A closing phrase
//! arms the end timer, which starts when the customer turn is dispatched.

use crate::capture::encoder::AudioBlob;
use crate::config::ConversationConfig;
use crate::conversation::ConversationEvent;
use crate::conversation::closing::{ClosingLexicon, end_wait};
use crate::conversation::goals::{AchievedGoals, GoalTracker};
use crate::conversation::state::{TurnEvent, TurnState, transition};
use crate::conversation::transcript::{ChatTurn, Speaker, Transcript};
use crate::error::{RehearseError, Result};
use crate::lipsync::cues::CueTimeline;
use crate::lipsync::engine::{AnimationStream, LipSyncEngine};
use crate::lipsync::player::Player;
use crate::payload::{AudioPayload, PayloadNormalizer};
use crate::remote::dialogue::{DialogueReply, DialogueRequest, DialogueService, Utterance};
use crate::remote::goals::GoalEvaluator;
use crate::session::SessionContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Trainee text for a voice turn the service could not transcribe.
const UNTRANSCRIBED: &str = "[inaudible]";

/// A trainee submission.
#[derive(Debug, Clone)]
pub enum TraineeInput {
    Text(String),
    Voice(AudioBlob),
}

/// The services a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub dialogue: Arc<dyn DialogueService>,
    pub goals: Option<Arc<dyn GoalEvaluator>>,
    /// Speaker output. Without one, customer turns are text-only.
    pub player: Option<Arc<dyn Player>>,
}

/// Result of a completed submission.
pub struct TurnOutcome {
    pub trainee: ChatTurn,
    pub customer: ChatTurn,
    /// Frames for the customer audio, if it is playing.
    pub animation: Option<AnimationStream>,
    /// Lexicon phrase that armed the end timer.
    pub closing: Option<String>,
    /// Why the customer turn fell back to text-only, if it did.
    pub degraded: Option<String>,
}

pub struct TurnController {
    ctx: SessionContext,
    config: ConversationConfig,
    collaborators: Collaborators,
    engine: LipSyncEngine,
    normalizer: PayloadNormalizer,
    lexicon: ClosingLexicon,
    transcript: Transcript,
    goals: GoalTracker,
    state: Arc<watch::Sender<TurnState>>,
    events: mpsc::UnboundedSender<ConversationEvent>,
    finisher: Option<JoinHandle<()>>,
}

impl TurnController {
    pub fn new(
        ctx: SessionContext,
        config: ConversationConfig,
        engine: LipSyncEngine,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(TurnState::AwaitingTraineeInput);
        let goals = GoalTracker::new(
            collaborators.goals.clone(),
            ctx.goals.clone(),
            Duration::from_millis(config.goal_delay_after_customer_ms),
            Duration::from_millis(config.goal_delay_after_trainee_ms),
            events.clone(),
        );

        let controller = Self {
            lexicon: ClosingLexicon::from_config(&config),
            ctx,
            config,
            collaborators,
            engine,
            normalizer: PayloadNormalizer::new(),
            transcript: Transcript::new(),
            goals,
            state: Arc::new(state),
            events,
            finisher: None,
        };
        (controller, events_rx)
    }

    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TurnState> {
        self.state.subscribe()
    }

    /// Wait until the controller reaches `target`.
    pub async fn wait_for_state(&self, target: TurnState) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == target).await;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn achieved_goals(&self) -> AchievedGoals {
        self.goals.achieved()
    }

    pub fn normalizer(&self) -> &PayloadNormalizer {
        &self.normalizer
    }

    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Open the conversation with a customer line, e.g. the persona's greeting.
    pub fn greet(&mut self, text: &str) -> Result<()> {
        if !self.transcript.is_empty() {
            return Err(RehearseError::Other(
                "greeting must be the first turn".to_string(),
            ));
        }
        self.append(ChatTurn::new(Speaker::Customer, text));
        Ok(())
    }

    /// Submit a trainee turn and present the customer's reply.
    ///
    /// # Errors
    /// - `TurnInProgress` while an earlier turn is still being handled
    /// - `InvalidTransition` once the conversation has ended
    /// - `RemoteService` if the dialogue service fails; the state returns to
    ///   awaiting input so the trainee can retry
    pub async fn submit(&mut self, input: TraineeInput) -> Result<TurnOutcome> {
        let current = self.state();
        if current.is_busy() {
            return Err(RehearseError::TurnInProgress {
                state: current.to_string(),
            });
        }
        self.apply(TurnEvent::Submit)?;

        let utterance = match &input {
            TraineeInput::Text(text) => Utterance::text(text),
            TraineeInput::Voice(blob) => Utterance::audio(blob),
        };
        let request = DialogueRequest {
            session: self.ctx.metadata.clone(),
            transcript: self.transcript.lines(),
            utterance,
        };

        let reply = match self.collaborators.dialogue.respond(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %self.ctx.session_id(), error = %e, "dialogue request failed");
                self.notice(format!("The customer could not respond. Please try again. ({e})"));
                self.apply(TurnEvent::RemoteFailed)?;
                return Err(e);
            }
        };
        self.apply(TurnEvent::ReplyReceived)?;

        let trainee_text = match &input {
            TraineeInput::Text(text) => text.clone(),
            TraineeInput::Voice(_) => reply
                .transcribed_text
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTRANSCRIBED.to_string()),
        };
        let trainee = self.append(ChatTurn::new(Speaker::Trainee, &trainee_text));

        let mut degraded = None;
        let payload = match reply.customer_audio.as_ref().map(AudioPayload::from_json) {
            Some(Ok(payload)) => Some(payload),
            Some(Err(e)) => {
                warn!(error = %e, "customer audio ignored");
                degraded = Some(e.to_string());
                None
            }
            None => None,
        };
        let customer = self.append(
            ChatTurn::new(Speaker::Customer, &reply.customer_response_text)
                .with_audio(payload.clone()),
        );

        let closing = self
            .lexicon
            .find(&reply.customer_response_text)
            .or_else(|| self.lexicon.find(&trainee_text))
            .map(str::to_string);

        let animation = match payload {
            Some(payload) => match self.present(payload, &reply).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "customer audio unavailable, continuing text-only");
                    degraded = Some(e.to_string());
                    None
                }
            },
            None => None,
        };

        self.apply(TurnEvent::CustomerDispatched)?;
        let wait = closing.as_ref().map(|phrase| {
            let wait = end_wait(&reply.customer_response_text, &self.config);
            info!(phrase = %phrase, ?wait, "closing phrase detected, end timer armed");
            wait
        });
        self.spawn_finisher(animation.as_ref().map(|a| a.handle().finished()), wait);

        Ok(TurnOutcome {
            trainee,
            customer,
            animation,
            closing,
            degraded,
        })
    }

    /// Normalize and start the customer audio.
    async fn present(
        &self,
        payload: AudioPayload,
        reply: &DialogueReply,
    ) -> Result<Option<AnimationStream>> {
        let resource = self.normalizer.normalize(payload, None)?;
        let Some(player) = self.collaborators.player.clone() else {
            debug!("no player configured, customer turn is text-only");
            return Ok(None);
        };
        let cues = match reply.mouth_cues.as_deref() {
            Some(records) => CueTimeline::from_records(records).unwrap_or_else(|e| {
                warn!(error = %e, "mouth cues ignored");
                CueTimeline::default()
            }),
            None => CueTimeline::default(),
        };
        self.engine.play(player, resource, cues).await.map(Some)
    }

    /// Move out of the playing state once the customer turn is over: on the
    /// end timer if armed, otherwise when playback finishes.
    fn spawn_finisher(&mut self, finished: Option<watch::Receiver<bool>>, end_wait: Option<Duration>) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let event = match end_wait {
                Some(wait) => {
                    tokio::time::sleep(wait).await;
                    TurnEvent::EndTimerElapsed
                }
                None => {
                    if let Some(mut finished) = finished {
                        let _ = finished.wait_for(|done| *done).await;
                    }
                    TurnEvent::PlaybackFinished
                }
            };
            if let Err(e) = apply_event(&state, &events, event) {
                warn!(error = %e, "turn finisher could not advance state");
            }
        });
        if let Some(previous) = self.finisher.replace(task) {
            previous.abort();
        }
    }

    fn append(&mut self, turn: ChatTurn) -> ChatTurn {
        let speaker = turn.speaker;
        let turn = self.transcript.push(turn).clone();
        debug!(speaker = %speaker, turns = self.transcript.len(), "turn appended");
        let _ = self.events.send(ConversationEvent::TurnAppended(turn.clone()));
        self.goals.schedule(self.transcript.lines(), speaker);
        turn
    }

    fn notice(&self, message: String) {
        let _ = self.events.send(ConversationEvent::Notice(message));
    }

    fn apply(&self, event: TurnEvent) -> Result<TurnState> {
        apply_event(&self.state, &self.events, event)
    }
}

impl Drop for TurnController {
    fn drop(&mut self) {
        if let Some(finisher) = self.finisher.take() {
            finisher.abort();
        }
    }
}

/// Apply `event` atomically and announce the change.
fn apply_event(
    state: &watch::Sender<TurnState>,
    events: &mpsc::UnboundedSender<ConversationEvent>,
    event: TurnEvent,
) -> Result<TurnState> {
    let mut outcome = None;
    state.send_if_modified(|current| {
        let from = *current;
        let next = transition(from, event);
        let changed = match &next {
            Ok(to) => {
                *current = *to;
                *to != from
            }
            Err(_) => false,
        };
        outcome = Some((from, next));
        changed
    });

    let (from, next) = outcome.ok_or_else(|| RehearseError::Other("state update skipped".to_string()))?;
    let to = next?;
    if from != to {
        debug!(%from, %to, %event, "turn state changed");
        let _ = events.send(ConversationEvent::StateChanged { from, to });
    }
    Ok(to)
}
