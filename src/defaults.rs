//! Default configuration constants for rehearse.
//!
//! Shared constants used across configuration types and runtime components.

/// Capture sample rate in Hz.
///
/// 16kHz mono is what the transcription service expects; the archival
/// recording uses the same stream so both encoders share one device.
pub const SAMPLE_RATE: u32 = 16000;

/// Target bitrate of the archival (audio + video) recording in bits per second.
pub const ARCHIVAL_BITRATE_BPS: u32 = 2_500_000;

/// Archival chunk cadence in milliseconds.
///
/// Chunks bound memory growth and keep everything up to the last second
/// if the session is torn down abruptly.
pub const CHUNK_INTERVAL_MS: u64 = 1000;

/// How often the capture pump polls the device buffers.
pub const POLL_INTERVAL_MS: u64 = 20;

/// RMS level below which captured audio is gated to silence when noise
/// suppression is enabled.
pub const NOISE_GATE_THRESHOLD: f32 = 0.01;

/// Lip-sync render ticks per second.
pub const TICK_HZ: u32 = 60;

/// Lower bound of the wait between the closing line being dispatched and
/// the conversation ending.
pub const END_WAIT_MIN_MS: u64 = 3000;

/// Upper bound of the closing-line wait.
pub const END_WAIT_MAX_MS: u64 = 8000;

/// Estimated speaking time per character of the closing line.
pub const END_WAIT_MS_PER_CHAR: u64 = 60;

/// Goal analysis debounce after a customer turn is appended.
pub const GOAL_DELAY_AFTER_CUSTOMER_MS: u64 = 800;

/// Goal analysis debounce after a trainee turn is appended.
///
/// Longer than the customer delay: a trainee turn is normally followed
/// within moments by the customer's reply, which reschedules the call.
pub const GOAL_DELAY_AFTER_TRAINEE_MS: u64 = 2000;

/// Timeout for requests to the dialogue and upload services.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// MIME type assumed for decoded audio when neither the payload nor the
/// caller declares one.
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Phrases that mark the customer closing the conversation.
///
/// Matched as raw case-insensitive substrings.
pub const CLOSING_PHRASES: &[&str] = &[
    "goodbye",
    "good bye",
    "bye",
    "have a great day",
    "have a nice day",
    "have a good day",
    "thanks for your time",
    "thank you for your time",
    "talk to you later",
    "take care",
    "see you",
];
