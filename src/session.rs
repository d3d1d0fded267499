//! Per-session context owned by the embedding application.
//!
//! The caller creates one [`SessionContext`] per role-play and threads it
//! through the capture session and the turn controller. Nothing in the
//! crate keeps session state in globals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptive metadata sent alongside dialogue requests and uploads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: Uuid,
    pub scenario: String,
    pub persona: String,
    pub trainee_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Ordered goal descriptions for the scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoalSet(pub Vec<String>);

impl GoalSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn descriptions(&self) -> &[String] {
        &self.0
    }
}

/// Explicit session state shared by reference between the core components.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub metadata: SessionMetadata,
    pub goals: GoalSet,
    pub want_video: bool,
}

impl SessionContext {
    /// Start a new session for a scenario/persona pair.
    pub fn new(scenario: &str, persona: &str) -> Self {
        Self {
            metadata: SessionMetadata {
                session_id: Uuid::new_v4(),
                scenario: scenario.to_string(),
                persona: persona.to_string(),
                trainee_id: None,
                started_at: Utc::now(),
            },
            goals: GoalSet::default(),
            want_video: false,
        }
    }

    /// Set the goals the trainee is evaluated against.
    pub fn with_goals<I, S>(mut self, goals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.goals = GoalSet(goals.into_iter().map(Into::into).collect());
        self
    }

    /// Record archival video alongside the voice capture.
    pub fn with_video(mut self, want_video: bool) -> Self {
        self.want_video = want_video;
        self
    }

    /// Attach the trainee's identifier.
    pub fn with_trainee(mut self, trainee_id: &str) -> Self {
        self.metadata.trainee_id = Some(trainee_id.to_string());
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.metadata.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_has_unique_id() {
        let a = SessionContext::new("cold-call", "skeptical-buyer");
        let b = SessionContext::new("cold-call", "skeptical-buyer");
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.metadata.scenario, "cold-call");
        assert_eq!(a.metadata.persona, "skeptical-buyer");
        assert!(!a.want_video);
    }

    #[test]
    fn test_builder_sets_goals_video_and_trainee() {
        let ctx = SessionContext::new("renewal", "busy-cfo")
            .with_goals(["Introduce yourself", "Ask about budget"])
            .with_video(true)
            .with_trainee("t-42");

        assert_eq!(ctx.goals.len(), 2);
        assert_eq!(ctx.goals.descriptions()[1], "Ask about budget");
        assert!(ctx.want_video);
        assert_eq!(ctx.metadata.trainee_id.as_deref(), Some("t-42"));
    }

    #[test]
    fn test_goal_set_serializes_as_plain_list() {
        let goals = GoalSet(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_string(&goals).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }
}
