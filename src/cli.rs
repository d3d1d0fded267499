//! Command-line interface for rehearse
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Voice role-play rehearsal from the terminal
#[derive(Parser, Debug)]
#[command(
    name = "rehearse",
    version,
    about = "Voice role-play rehearsal: capture, lip-sync and turn control"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a duration such as `5s`, `1m30s` or a bare number of seconds.
fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(std::time::Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available microphones
    Devices,

    /// Classify and decode an audio payload (JSON value or plain string)
    Decode {
        /// Payload text; read from stdin when omitted
        payload: Option<String>,

        /// MIME type to assume when the payload declares none
        #[arg(long, value_name = "MIME")]
        mime: Option<String>,

        /// Write decoded bytes to this file
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Render a mouth-cue file into viseme frames
    Visemes {
        /// Cue file in Rhubarb JSON format
        cues: PathBuf,

        /// Frames per second (default: playback.tick_hz)
        #[arg(long, value_name = "HZ")]
        tick_hz: Option<u32>,

        /// Print one JSON object per frame
        #[arg(long)]
        json: bool,
    },

    /// Record the microphone and write the voice recording as WAV
    Record {
        /// How long to record. Examples: 5, 10s, 1m
        #[arg(long, short = 'd', value_name = "DURATION", default_value = "5s", value_parser = parse_duration)]
        duration: std::time::Duration,

        /// Output WAV file
        #[arg(long, short = 'o', value_name = "FILE", default_value = "recording.wav")]
        output: PathBuf,

        /// Audio input device (default: capture.device or the system default)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Also record an archival video track
        #[arg(long)]
        video: bool,
    },

    /// Hold a text conversation with a remote customer persona
    Chat {
        /// Scenario identifier sent to the dialogue service
        #[arg(long, default_value = "practice")]
        scenario: String,

        /// Persona identifier sent to the dialogue service
        #[arg(long, default_value = "customer")]
        persona: String,

        /// Goal the trainee is evaluated against (repeatable)
        #[arg(long = "goal", value_name = "TEXT")]
        goals: Vec<String>,

        /// Opening line spoken by the customer
        #[arg(long, value_name = "TEXT")]
        greeting: Option<String>,

        /// Do not play customer audio
        #[arg(long)]
        mute: bool,
    },

    /// View and check configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Print the built-in defaults as a starting configuration file
    Dump,
    /// Load and validate the configuration
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["rehearse"]).is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["rehearse", "-vv", "devices"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["rehearse", "devices", "--config", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/r.toml")));
    }

    #[test]
    fn test_parse_decode() {
        let cli = Cli::try_parse_from(["rehearse", "decode", "https://a/b.mp3", "--mime", "audio/mpeg"])
            .unwrap();
        match cli.command {
            Commands::Decode {
                payload,
                mime,
                output,
            } => {
                assert_eq!(payload.as_deref(), Some("https://a/b.mp3"));
                assert_eq!(mime.as_deref(), Some("audio/mpeg"));
                assert!(output.is_none());
            }
            _ => panic!("Expected Decode command"),
        }
    }

    #[test]
    fn test_parse_record_defaults() {
        let cli = Cli::try_parse_from(["rehearse", "record"]).unwrap();
        match cli.command {
            Commands::Record {
                duration,
                output,
                device,
                video,
            } => {
                assert_eq!(duration, Duration::from_secs(5));
                assert_eq!(output, PathBuf::from("recording.wav"));
                assert!(device.is_none());
                assert!(!video);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_parse_record_compound_duration() {
        let cli = Cli::try_parse_from(["rehearse", "record", "-d", "1m30s", "--video"]).unwrap();
        match cli.command {
            Commands::Record { duration, video, .. } => {
                assert_eq!(duration, Duration::from_secs(90));
                assert!(video);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_parse_record_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["rehearse", "record", "-d", "soon"]).is_err());
    }

    #[test]
    fn test_parse_chat_with_goals() {
        let cli = Cli::try_parse_from([
            "rehearse",
            "chat",
            "--persona",
            "skeptical-cfo",
            "--goal",
            "Ask about budget",
            "--goal",
            "Book a follow-up",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat {
                scenario,
                persona,
                goals,
                greeting,
                mute,
            } => {
                assert_eq!(scenario, "practice");
                assert_eq!(persona, "skeptical-cfo");
                assert_eq!(goals, vec!["Ask about budget", "Book a follow-up"]);
                assert!(greeting.is_none());
                assert!(!mute);
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_parse_visemes() {
        let cli = Cli::try_parse_from(["rehearse", "visemes", "cues.json", "--tick-hz", "30", "--json"])
            .unwrap();
        match cli.command {
            Commands::Visemes { cues, tick_hz, json } => {
                assert_eq!(cues, PathBuf::from("cues.json"));
                assert_eq!(tick_hz, Some(30));
                assert!(json);
            }
            _ => panic!("Expected Visemes command"),
        }
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = Cli::try_parse_from(["rehearse", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Validate
            }
        ));
    }

    #[test]
    fn test_parse_config_dump() {
        let cli = Cli::try_parse_from(["rehearse", "config", "dump"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Dump
            }
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["rehearse", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { shell: Shell::Bash }));
    }
}
