//! Error types for rehearse.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RehearseError {
    // Device errors
    #[error("Device unavailable: {device}: {message}")]
    DeviceUnavailable { device: String, message: String },

    // Payload errors
    #[error("Unrecognized audio payload: {message}")]
    UnrecognizedPayload { message: String },

    #[error("Failed to decode audio payload: {message}")]
    Decode { message: String },

    // Playback errors
    #[error("Playback failed: {message}")]
    Playback { message: String },

    // Remote collaborator errors
    #[error("{service} service error: {message}")]
    RemoteService { service: String, message: String },

    // Encoder errors
    #[error("{encoder} encoder failed: {message}")]
    Encoder { encoder: String, message: String },

    // Conversation state errors
    #[error("Invalid transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("A turn is already in progress ({state})")]
    TurnInProgress { state: String },

    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl RehearseError {
    /// Whether the caller should fall back to a text-only turn instead of
    /// surfacing this failure.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RehearseError::DeviceUnavailable { .. }
                | RehearseError::UnrecognizedPayload { .. }
                | RehearseError::Decode { .. }
                | RehearseError::Playback { .. }
        )
    }

    pub(crate) fn remote(service: &str, message: impl Into<String>) -> Self {
        RehearseError::RemoteService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RehearseError>;
