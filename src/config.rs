use crate::defaults;
use crate::error::{RehearseError, Result};
use crate::lipsync::morph::{MorphTable, MorphTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub lipsync: LipSyncConfig,
    pub conversation: ConversationConfig,
    pub services: ServicesConfig,
}

/// Microphone/camera capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub noise_gate_threshold: f32,
    pub archival_bitrate_bps: u32,
    pub chunk_interval_ms: u64,
    pub poll_interval_ms: u64,
}

/// Customer audio playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_hz: u32,
}

/// Viseme to morph-target mapping, keyed by viseme symbol (A-H, X).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LipSyncConfig {
    pub morphs: BTreeMap<String, MorphTarget>,
}

/// Turn-taking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    pub closing_phrases: Vec<String>,
    pub end_wait_min_ms: u64,
    pub end_wait_max_ms: u64,
    pub end_wait_ms_per_char: u64,
    pub goal_delay_after_customer_ms: u64,
    pub goal_delay_after_trainee_ms: u64,
}

/// Remote collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicesConfig {
    pub dialogue_url: Option<String>,
    pub goals_url: Option<String>,
    pub upload_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            echo_cancellation: true,
            noise_suppression: true,
            noise_gate_threshold: defaults::NOISE_GATE_THRESHOLD,
            archival_bitrate_bps: defaults::ARCHIVAL_BITRATE_BPS,
            chunk_interval_ms: defaults::CHUNK_INTERVAL_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_hz: defaults::TICK_HZ,
        }
    }
}

impl Default for LipSyncConfig {
    fn default() -> Self {
        Self {
            morphs: MorphTable::default().to_config(),
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            closing_phrases: defaults::CLOSING_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            end_wait_min_ms: defaults::END_WAIT_MIN_MS,
            end_wait_max_ms: defaults::END_WAIT_MAX_MS,
            end_wait_ms_per_char: defaults::END_WAIT_MS_PER_CHAR,
            goal_delay_after_customer_ms: defaults::GOAL_DELAY_AFTER_CUSTOMER_MS,
            goal_delay_after_trainee_ms: defaults::GOAL_DELAY_AFTER_TRAINEE_MS,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            dialogue_url: None,
            goals_url: None,
            upload_url: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl LipSyncConfig {
    /// Build the morph table for the configured avatar rig.
    pub fn morph_table(&self) -> Result<MorphTable> {
        MorphTable::from_config(&self.morphs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(RehearseError::ConfigParse {
                        message: format!("{}: {}", path.display(), e),
                    })
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - REHEARSE_DIALOGUE_URL → services.dialogue_url
    /// - REHEARSE_GOALS_URL → services.goals_url
    /// - REHEARSE_UPLOAD_URL → services.upload_url
    /// - REHEARSE_AUDIO_DEVICE → capture.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("REHEARSE_DIALOGUE_URL")
            && !url.is_empty()
        {
            self.services.dialogue_url = Some(url);
        }

        if let Ok(url) = std::env::var("REHEARSE_GOALS_URL")
            && !url.is_empty()
        {
            self.services.goals_url = Some(url);
        }

        if let Ok(url) = std::env::var("REHEARSE_UPLOAD_URL")
            && !url.is_empty()
        {
            self.services.upload_url = Some(url);
        }

        if let Ok(device) = std::env::var("REHEARSE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.capture.device = Some(device);
        }

        self
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.capture.sample_rate == 0 {
            return Err(RehearseError::ConfigInvalidValue {
                key: "capture.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.capture.chunk_interval_ms == 0 || self.capture.poll_interval_ms == 0 {
            return Err(RehearseError::ConfigInvalidValue {
                key: "capture.chunk_interval_ms".to_string(),
                message: "intervals must be positive".to_string(),
            });
        }
        if self.playback.tick_hz == 0 {
            return Err(RehearseError::ConfigInvalidValue {
                key: "playback.tick_hz".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.conversation.end_wait_min_ms > self.conversation.end_wait_max_ms {
            return Err(RehearseError::ConfigInvalidValue {
                key: "conversation.end_wait_min_ms".to_string(),
                message: format!(
                    "{} exceeds end_wait_max_ms {}",
                    self.conversation.end_wait_min_ms, self.conversation.end_wait_max_ms
                ),
            });
        }
        self.lipsync.morph_table()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/rehearse/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rehearse")
            .join("config.toml")
    }
}
