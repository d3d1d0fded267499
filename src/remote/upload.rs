//! Upload collaborator for finished archival recordings.

use crate::capture::encoder::ArchivalBlob;
use crate::error::{RehearseError, Result};
use crate::session::SessionMetadata;
use async_trait::async_trait;
use std::sync::Mutex;

/// Accepts finished recordings. Failures are logged by the caller, never
/// surfaced to the trainee.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, recording: ArchivalBlob, metadata: &SessionMetadata) -> Result<()>;
}

/// Mock uploader for testing: keeps every upload in memory.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<(ArchivalBlob, SessionMetadata)>>,
    fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to reject every upload
    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn uploads(&self) -> Vec<(ArchivalBlob, SessionMetadata)> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, recording: ArchivalBlob, metadata: &SessionMetadata) -> Result<()> {
        if self.fail {
            return Err(RehearseError::remote("upload", "storage rejected the recording"));
        }
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((recording, metadata.clone()));
        Ok(())
    }
}
