use crate::payload::AudioPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Trainee,
    Customer,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Trainee => write!(f, "trainee"),
            Speaker::Customer => write!(f, "customer"),
        }
    }
}

/// One utterance in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    #[serde(skip)]
    pub audio: Option<AudioPayload>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(speaker: Speaker, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.to_string(),
            audio: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_audio(mut self, audio: Option<AudioPayload>) -> Self {
        self.audio = audio;
        self
    }
}

/// Role/text pair sent to remote collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub role: Speaker,
    pub text: String,
}

/// The canonical, append-only turn sequence for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, turn: ChatTurn) -> &ChatTurn {
        self.turns.push(turn);
        let last = self.turns.len() - 1;
        &self.turns[last]
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    pub fn has_trainee_turn(&self) -> bool {
        self.turns.iter().any(|t| t.speaker == Speaker::Trainee)
    }

    pub fn lines(&self) -> Vec<ChatLine> {
        self.turns
            .iter()
            .map(|t| ChatLine {
                role: t.speaker,
                text: t.text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_serializes_lowercase() {
        let line = ChatLine {
            role: Speaker::Customer,
            text: "Hi".to_string(),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["role"], "customer");
    }

    #[test]
    fn transcript_preserves_append_order() {
        let mut transcript = Transcript::new();
        assert!(!transcript.has_trainee_turn());

        transcript.push(ChatTurn::new(Speaker::Customer, "Hello, how can I help?"));
        transcript.push(ChatTurn::new(Speaker::Trainee, "I'm calling about your fleet."));
        transcript.push(ChatTurn::new(Speaker::Customer, "Go on."));

        assert!(transcript.has_trainee_turn());
        let roles: Vec<Speaker> = transcript.lines().iter().map(|l| l.role).collect();
        assert_eq!(roles, vec![Speaker::Customer, Speaker::Trainee, Speaker::Customer]);
        assert_eq!(transcript.last().unwrap().text, "Go on.");
    }

    #[test]
    fn turn_ids_are_unique() {
        let a = ChatTurn::new(Speaker::Trainee, "x");
        let b = ChatTurn::new(Speaker::Trainee, "x");
        assert_ne!(a.id, b.id);
    }
}
