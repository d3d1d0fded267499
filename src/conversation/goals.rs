//! Debounced goal-achievement analysis.
//!
//! Every transcript append reschedules one analysis. Only the newest
//! scheduled call may apply its result, and that result replaces the
//! achieved set outright, so goals can regress between passes.

use crate::conversation::ConversationEvent;
use crate::conversation::transcript::{ChatLine, Speaker};
use crate::remote::goals::{GoalEvaluator, GoalRequest};
use crate::session::GoalSet;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Indices of achieved goals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AchievedGoals(BTreeSet<usize>);

impl AchievedGoals {
    /// Keep only indices that name one of `goal_count` goals.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>, goal_count: usize) -> Self {
        let mut set = BTreeSet::new();
        for index in indices {
            if index < goal_count {
                set.insert(index);
            } else {
                warn!(index, goal_count, "ignoring out-of-range goal index");
            }
        }
        Self(set)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

/// Schedules goal analysis with last-write-wins semantics.
pub struct GoalTracker {
    evaluator: Option<Arc<dyn GoalEvaluator>>,
    goals: GoalSet,
    delay_after_customer: Duration,
    delay_after_trainee: Duration,
    generation: Arc<AtomicU64>,
    pending: Option<JoinHandle<()>>,
    achieved: Arc<watch::Sender<AchievedGoals>>,
    events: mpsc::UnboundedSender<ConversationEvent>,
}

impl GoalTracker {
    pub fn new(
        evaluator: Option<Arc<dyn GoalEvaluator>>,
        goals: GoalSet,
        delay_after_customer: Duration,
        delay_after_trainee: Duration,
        events: mpsc::UnboundedSender<ConversationEvent>,
    ) -> Self {
        let (achieved, _) = watch::channel(AchievedGoals::default());
        Self {
            evaluator,
            goals,
            delay_after_customer,
            delay_after_trainee,
            generation: Arc::new(AtomicU64::new(0)),
            pending: None,
            achieved: Arc::new(achieved),
            events,
        }
    }

    /// Current achieved set.
    pub fn achieved(&self) -> AchievedGoals {
        self.achieved.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AchievedGoals> {
        self.achieved.subscribe()
    }

    /// Schedule an analysis of `transcript`, superseding any earlier one.
    ///
    /// `after` is the speaker of the turn that was just appended.
    pub fn schedule(&mut self, transcript: Vec<ChatLine>, after: Speaker) {
        let Some(evaluator) = self.evaluator.clone() else {
            return;
        };
        if self.goals.is_empty() || !transcript.iter().any(|l| l.role == Speaker::Trainee) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.pending.take() {
            previous.abort();
        }

        let delay = match after {
            Speaker::Customer => self.delay_after_customer,
            Speaker::Trainee => self.delay_after_trainee,
        };
        let request = GoalRequest {
            transcript,
            goals: self.goals.descriptions().to_vec(),
        };
        let goal_count = self.goals.len();
        let latest = Arc::clone(&self.generation);
        let achieved = Arc::clone(&self.achieved);
        let events = self.events.clone();

        debug!(generation, ?delay, "goal analysis scheduled");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = match evaluator.evaluate(request).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(generation, error = %e, "goal analysis failed");
                    return;
                }
            };

            let next = AchievedGoals::from_indices(report.achieved, goal_count);
            let mut applied = false;
            achieved.send_if_modified(|current| {
                if latest.load(Ordering::SeqCst) != generation {
                    return false;
                }
                applied = true;
                let changed = *current != next;
                *current = next.clone();
                changed
            });

            if applied {
                debug!(generation, achieved = next.len(), "goal analysis applied");
                let _ = events.send(ConversationEvent::GoalsUpdated(next));
            } else {
                debug!(generation, "stale goal analysis discarded");
            }
        }));
    }

    /// Drop any scheduled or in-flight analysis.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for GoalTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}
