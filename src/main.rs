use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use rehearse::audio::capture::{CpalDevices, list_devices, suppress_audio_warnings};
use rehearse::capture::{ArchivalOutcome, CaptureOptions, CaptureSession, MediaDevices};
use rehearse::cli::{Cli, Commands, ConfigAction};
use rehearse::config::Config;
use rehearse::conversation::{
    Collaborators, ConversationEvent, Speaker, TraineeInput, TurnController, TurnState,
};
use rehearse::lipsync::{CueTimeline, LipSyncEngine, Player};
use rehearse::payload::{AudioPayload, PayloadNormalizer, PlayableResource};
use rehearse::remote::HttpServices;
use rehearse::session::SessionContext;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Before the runtime spawns any threads.
    suppress_audio_warnings();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    tracing::debug!(version = %rehearse::version_string(), "starting");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Devices => list_audio_devices(),
        Commands::Decode {
            payload,
            mime,
            output,
        } => decode_payload(payload, mime.as_deref(), output.as_deref()),
        Commands::Visemes {
            cues,
            tick_hz,
            json,
        } => {
            let config = load_config(cli.config.as_deref())?;
            render_visemes(&config, &cues, tick_hz, json)
        }
        Commands::Record {
            duration,
            output,
            device,
            video,
        } => {
            let config = load_config(cli.config.as_deref())?;
            record(config, duration, &output, device, video, cli.quiet).await
        }
        Commands::Chat {
            scenario,
            persona,
            goals,
            greeting,
            mute,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let ctx = SessionContext::new(&scenario, &persona).with_goals(goals);
            chat(config, ctx, greeting, mute).await
        }
        Commands::Config { action } => handle_config_command(action, cli.config.as_deref()),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "rehearse",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise the level follows -q/-v/-vv.
fn init_logging(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/rehearse/config.toml)
/// 3. Built-in defaults
///
/// Environment overrides apply on top, then the result is validated.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;
    if devices.is_empty() {
        bail!("No audio input devices found");
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }
    Ok(())
}

fn decode_payload(payload: Option<String>, mime: Option<&str>, output: Option<&Path>) -> Result<()> {
    let text = match payload {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let text = text.trim();
    // Bare strings are accepted without JSON quoting.
    let value = serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()));

    let payload = AudioPayload::from_json(&value)?;
    println!("{} {}", "Shape:".dimmed(), payload.kind());

    let normalizer = PayloadNormalizer::new();
    match normalizer.normalize(payload, mime)? {
        PlayableResource::Url(url) => {
            println!("{} {:?}", "Origin:".dimmed(), url.origin);
            println!("{} {}", "URL:".dimmed(), truncate(&url.url, 96));
            if output.is_some() {
                bail!("payload is a URL; nothing to write");
            }
        }
        PlayableResource::Buffer(audio) => {
            println!("{} {}", "MIME:".dimmed(), audio.mime());
            println!("{} {} bytes", "Size:".dimmed(), audio.len());
            if let Some(path) = output {
                std::fs::write(path, audio.bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("{}", format!("Wrote {}", path.display()).green());
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}…", s.chars().take(max).collect::<String>())
    }
}

fn render_visemes(config: &Config, cues: &Path, tick_hz: Option<u32>, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(cues)
        .with_context(|| format!("failed to read {}", cues.display()))?;
    let timeline = CueTimeline::from_rhubarb_json(&text)?;
    let engine = LipSyncEngine::new(
        config.lipsync.morph_table()?,
        tick_hz.unwrap_or(config.playback.tick_hz),
    );

    for (at, frame) in engine.render(&timeline) {
        if json {
            println!(
                "{}",
                serde_json::json!({ "t": at.as_secs_f64(), "weights": frame.weights })
            );
        } else {
            match frame.dominant() {
                Some((morph, weight)) => println!("{:>8.3}s  {} {:.2}", at.as_secs_f64(), morph, weight),
                None => println!("{:>8.3}s  {}", at.as_secs_f64(), "rest".dimmed()),
            }
        }
    }
    Ok(())
}

async fn record(
    config: Config,
    duration: Duration,
    output: &Path,
    device: Option<String>,
    video: bool,
    quiet: bool,
) -> Result<()> {
    let services = HttpServices::from_config(&config.services)?;
    let devices: Arc<dyn MediaDevices> =
        Arc::new(CpalDevices::new(device.or(config.capture.device.clone())));
    let ctx = SessionContext::new("recording", "none").with_video(video);

    let mut session = CaptureSession::begin(
        &ctx,
        video,
        devices,
        CaptureOptions::from(&config.capture),
        services.uploader,
    )
    .await?;

    if !quiet {
        eprintln!(
            "{} for {} (Ctrl+C to stop early)",
            "Recording".green(),
            humantime::format_duration(duration)
        );
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    let Some(bundle) = session.stop().await? else {
        bail!("recording was already stopped");
    };
    std::fs::write(output, &bundle.transcription.bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    if !quiet {
        println!(
            "Wrote {} ({} ms)",
            output.display().green(),
            bundle.transcription.duration_ms
        );
    }

    if let Some(archival) = bundle.archival {
        match archival.await? {
            ArchivalOutcome::Uploaded { bytes } => println!("Archival recording uploaded ({} bytes)", bytes),
            ArchivalOutcome::Skipped => println!("{}", "Archival recording skipped".dimmed()),
            ArchivalOutcome::Failed(reason) => eprintln!("{} {}", "Archival upload failed:".yellow(), reason),
        }
    }
    Ok(())
}

async fn chat(config: Config, ctx: SessionContext, greeting: Option<String>, mute: bool) -> Result<()> {
    let services = HttpServices::from_config(&config.services)?;
    let Some(dialogue) = services.dialogue else {
        bail!("services.dialogue_url is not configured (or set REHEARSE_DIALOGUE_URL)");
    };

    let player = if mute { None } else { speaker(&config)? };
    let engine = LipSyncEngine::from_config(&config)?;
    let (mut controller, mut events) = TurnController::new(
        ctx,
        config.conversation.clone(),
        engine,
        Collaborators {
            dialogue,
            goals: services.goals,
            player,
        },
    );

    let goals = controller.session().goals.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ConversationEvent::TurnAppended(turn) if turn.speaker == Speaker::Customer => {
                    println!("{} {}", "customer:".cyan().bold(), turn.text);
                }
                ConversationEvent::GoalsUpdated(achieved) => {
                    for (index, goal) in goals.descriptions().iter().enumerate() {
                        let mark = if achieved.contains(index) { "x" } else { " " };
                        println!("  [{}] {}", mark, goal.dimmed());
                    }
                }
                ConversationEvent::Notice(message) => eprintln!("{}", message.yellow()),
                _ => {}
            }
        }
    });

    if let Some(text) = greeting {
        controller.greet(&text)?;
    }

    let mut state = controller.subscribe_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match controller.submit(TraineeInput::Text(line.to_string())).await {
            Ok(outcome) => {
                if let Some(animation) = outcome.animation {
                    // Frames are not rendered here; the stream just has to
                    // stay alive until playback ends.
                    tokio::spawn(async move {
                        let (mut frames, handle) = animation.into_parts();
                        while frames.recv().await.is_some() {}
                        drop(handle);
                    });
                }
                if let Some(reason) = outcome.degraded {
                    tracing::warn!(%reason, "customer audio unavailable");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "turn failed");
                continue;
            }
        }

        let settled = state.wait_for(|s| !s.is_busy()).await.map(|s| *s);
        if settled.is_ok_and(|s| s == TurnState::Ended) {
            println!("{}", "Conversation ended.".dimmed());
            break;
        }
    }
    Ok(())
}

#[cfg(feature = "playback")]
fn speaker(config: &Config) -> Result<Option<Arc<dyn Player>>> {
    let client = rehearse::remote::build_client(&config.services)?;
    Ok(Some(Arc::new(rehearse::lipsync::RodioPlayer::new(client))))
}

#[cfg(not(feature = "playback"))]
fn speaker(_config: &Config) -> Result<Option<Arc<dyn Player>>> {
    Ok(None)
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Dump => print!("{}", toml::to_string_pretty(&Config::default())?),
        ConfigAction::Validate => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            config.validate()?;
            println!("{}", format!("{} is valid", config_path.display()).green());
        }
    }
    Ok(())
}
