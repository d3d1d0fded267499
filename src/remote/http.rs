//! reqwest clients for the remote collaborators.

use crate::capture::encoder::ArchivalBlob;
use crate::config::ServicesConfig;
use crate::error::{RehearseError, Result};
use crate::remote::dialogue::{DialogueReply, DialogueRequest, DialogueService};
use crate::remote::goals::{GoalEvaluator, GoalReport, GoalRequest};
use crate::remote::upload::Uploader;
use crate::session::SessionMetadata;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Build the shared HTTP client with the configured request timeout.
pub fn build_client(config: &ServicesConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| RehearseError::Other(format!("Failed to build HTTP client: {e}")))
}

async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    body: &Req,
) -> Result<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| RehearseError::remote(service, format!("request to {url} failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RehearseError::remote(
            service,
            format!("{url} returned status {status}"),
        ));
    }

    let text = response
        .text()
        .await
        .map_err(|e| RehearseError::remote(service, format!("failed to read response: {e}")))?;
    debug!(service, bytes = text.len(), "remote response received");

    serde_json::from_str(&text)
        .map_err(|e| RehearseError::remote(service, format!("failed to parse response: {e}")))
}

/// Dialogue service reached over HTTP.
pub struct HttpDialogue {
    client: reqwest::Client,
    url: String,
}

impl HttpDialogue {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl DialogueService for HttpDialogue {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueReply> {
        post_json(&self.client, "dialogue", &self.url, &request).await
    }
}

/// Goal evaluator reached over HTTP.
///
/// Calls carry no timeout of their own; a newer analysis supersedes a slow one.
pub struct HttpGoalEvaluator {
    client: reqwest::Client,
    url: String,
}

impl HttpGoalEvaluator {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl GoalEvaluator for HttpGoalEvaluator {
    async fn evaluate(&self, request: GoalRequest) -> Result<GoalReport> {
        post_json(&self.client, "goals", &self.url, &request).await
    }
}

/// Uploads archival recordings as a raw body with session headers.
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
}

impl HttpUploader {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, recording: ArchivalBlob, metadata: &SessionMetadata) -> Result<()> {
        let bytes = recording.bytes.len();
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, recording.mime.as_str())
            .header("X-Session-Id", metadata.session_id.to_string())
            .header("X-Scenario", metadata.scenario.as_str())
            .header("X-Persona", metadata.persona.as_str())
            .body(recording.bytes)
            .send()
            .await
            .map_err(|e| RehearseError::remote("upload", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RehearseError::remote(
                "upload",
                format!("{} returned status {}", self.url, response.status()),
            ));
        }
        debug!(bytes, "recording uploaded");
        Ok(())
    }
}

/// HTTP collaborators for whichever services are configured.
pub struct HttpServices {
    pub dialogue: Option<Arc<dyn DialogueService>>,
    pub goals: Option<Arc<dyn GoalEvaluator>>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

impl HttpServices {
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self {
            dialogue: config.dialogue_url.as_deref().map(|url| {
                Arc::new(HttpDialogue::new(client.clone(), url)) as Arc<dyn DialogueService>
            }),
            goals: config
                .goals_url
                .as_deref()
                .map(|url| Arc::new(HttpGoalEvaluator::new(url)) as Arc<dyn GoalEvaluator>),
            uploader: config
                .upload_url
                .as_deref()
                .map(|url| Arc::new(HttpUploader::new(client.clone(), url)) as Arc<dyn Uploader>),
        })
    }
}
