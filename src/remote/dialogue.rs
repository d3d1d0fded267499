//! Dialogue service: transcribes the trainee and writes the customer reply.

use crate::capture::encoder::AudioBlob;
use crate::conversation::transcript::ChatLine;
use crate::error::{RehearseError, Result};
use crate::lipsync::cues::CueRecord;
use crate::session::SessionMetadata;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// The trainee's new utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Utterance {
    Text { text: String },
    /// Recorded voice, base64 encoded.
    Audio { audio: String, mime: String },
}

impl Utterance {
    pub fn text(text: &str) -> Self {
        Utterance::Text {
            text: text.to_string(),
        }
    }

    pub fn audio(blob: &AudioBlob) -> Self {
        Utterance::Audio {
            audio: STANDARD.encode(&blob.bytes),
            mime: blob.mime.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DialogueRequest {
    pub session: SessionMetadata,
    /// Every turn so far, not including `utterance`.
    pub transcript: Vec<ChatLine>,
    pub utterance: Utterance,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DialogueReply {
    /// What the service heard, for voice utterances.
    #[serde(default)]
    pub transcribed_text: Option<String>,
    pub customer_response_text: String,
    /// Audio reference in any of the shapes `AudioPayload::from_json` accepts.
    #[serde(default, alias = "customer_audio_payload")]
    pub customer_audio: Option<serde_json::Value>,
    #[serde(default, alias = "mouthCues")]
    pub mouth_cues: Option<Vec<CueRecord>>,
}

impl DialogueReply {
    pub fn text(response: &str) -> Self {
        Self {
            customer_response_text: response.to_string(),
            ..Self::default()
        }
    }

    pub fn with_audio(mut self, audio: serde_json::Value) -> Self {
        self.customer_audio = Some(audio);
        self
    }

    pub fn with_transcription(mut self, text: &str) -> Self {
        self.transcribed_text = Some(text.to_string());
        self
    }

    pub fn with_cues(mut self, cues: Vec<CueRecord>) -> Self {
        self.mouth_cues = Some(cues);
        self
    }
}

#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueReply>;
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(DialogueReply),
    Failure(String),
}

/// Mock dialogue service for testing
///
/// Replays scripted replies in order; once the script runs out every call
/// gets the fallback reply.
#[derive(Debug)]
pub struct MockDialogue {
    script: Mutex<VecDeque<Scripted>>,
    fallback: DialogueReply,
    delay: Option<Duration>,
    requests: Mutex<Vec<DialogueRequest>>,
}

impl MockDialogue {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: DialogueReply::text("Could you tell me more about that?"),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, reply: DialogueReply) -> Self {
        self.push(Scripted::Reply(reply));
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.push(Scripted::Failure(message.to_string()));
        self
    }

    /// Simulate network latency on every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<DialogueRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn push(&self, entry: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(entry);
    }
}

impl Default for MockDialogue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DialogueService for MockDialogue {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueReply> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Failure(message)) => Err(RehearseError::remote("dialogue", message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
