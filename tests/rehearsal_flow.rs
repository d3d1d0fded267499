//! A full rehearsal: capture a voice turn, send it, animate the reply,
//! analyze goals and end on a closing line.

use base64::Engine;
use rehearse::audio::recorder::MockAudioSource;
use rehearse::capture::{CaptureOptions, CaptureSession, MockDevices};
use rehearse::config::ConversationConfig;
use rehearse::conversation::{
    Collaborators, ConversationEvent, Speaker, TraineeInput, TurnController, TurnState,
};
use rehearse::lipsync::{CueRecord, LipSyncEngine, MorphTable, Player, ScriptedPlayer};
use rehearse::remote::{
    DialogueReply, GoalEvaluator, MockDialogue, MockGoalEvaluator, Utterance,
};
use rehearse::session::SessionContext;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

fn cue(start: f64, end: f64, value: &str) -> CueRecord {
    CueRecord {
        start,
        end,
        value: value.to_string(),
    }
}

async fn record_voice_turn(ctx: &SessionContext) -> rehearse::capture::AudioBlob {
    let devices = MockDevices::new()
        .with_audio(MockAudioSource::new().with_samples(vec![1200; 320]).with_read_limit(4));
    let probe = devices.probe();
    let options = CaptureOptions {
        noise_gate_threshold: 0.0,
        ..CaptureOptions::default()
    };

    let mut session = CaptureSession::begin(ctx, false, Arc::new(devices), options, None)
        .await
        .unwrap();
    time::sleep(Duration::from_millis(200)).await;
    let bundle = session.stop().await.unwrap().unwrap();
    assert_eq!(probe.open_now(), 0);
    bundle.transcription
}

#[tokio::test(start_paused = true)]
async fn voice_turn_through_to_closing() {
    let ctx = SessionContext::new("renewal", "procurement-lead")
        .with_goals(["Confirm the renewal date", "Ask about seat count"]);

    let reply_audio = base64::engine::general_purpose::STANDARD.encode(b"RIFF....WAVEfmt ");
    let dialogue = Arc::new(
        MockDialogue::new()
            .with_reply(
                DialogueReply::text("Sure, our renewal is in March.")
                    .with_transcription("When does your contract renew?")
                    .with_audio(json!({ "base64": reply_audio, "mime": "audio/wav" }))
                    .with_cues(vec![cue(0.0, 0.3, "D"), cue(0.3, 0.6, "B")]),
            )
            .with_reply(DialogueReply::text("Thank you, goodbye.")),
    );
    let evaluator = Arc::new(MockGoalEvaluator::new().with_report(&[0]));
    let player = Arc::new(ScriptedPlayer::new(Duration::from_millis(600)));

    let (mut controller, mut events) = TurnController::new(
        ctx.clone(),
        ConversationConfig::default(),
        LipSyncEngine::new(MorphTable::default(), 10),
        Collaborators {
            dialogue: dialogue.clone(),
            goals: Some(evaluator.clone() as Arc<dyn GoalEvaluator>),
            player: Some(player.clone() as Arc<dyn Player>),
        },
    );

    // Turn 1: voice, animated reply.
    let blob = record_voice_turn(&ctx).await;
    let outcome = controller.submit(TraineeInput::Voice(blob)).await.unwrap();
    assert_eq!(outcome.trainee.text, "When does your contract renew?");
    assert!(outcome.closing.is_none());
    assert!(outcome.customer.audio.is_some());
    assert_eq!(controller.normalizer().outstanding(), 1);

    let mut animation = outcome.animation.unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = animation.next_frame().await {
        frames.push(frame);
    }
    assert!(frames.iter().any(|f| f.weight("viseme_AA") == 1.0));
    assert!(frames.iter().any(|f| f.weight("viseme_kk") == 1.0));
    assert!(frames.last().unwrap().is_rest());

    controller.wait_for_state(TurnState::AwaitingTraineeInput).await;
    assert_eq!(controller.normalizer().outstanding(), 0);

    let request = &dialogue.requests()[0];
    assert!(matches!(request.utterance, Utterance::Audio { ref mime, .. } if mime == "audio/wav"));
    assert_eq!(request.session.session_id, ctx.session_id());

    time::sleep(Duration::from_secs(1)).await;
    assert!(controller.achieved_goals().contains(0));

    // Turn 2: text, closing line, text-only.
    let outcome = controller
        .submit(TraineeInput::Text("Great, talk soon.".into()))
        .await
        .unwrap();
    assert_eq!(outcome.closing.as_deref(), Some("goodbye"));
    assert_eq!(dialogue.requests()[1].transcript.len(), 2);

    time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(controller.state(), TurnState::PlayingCustomerTurn);
    time::sleep(Duration::from_millis(200)).await;
    assert_eq!(controller.state(), TurnState::Ended);

    let speakers: Vec<Speaker> = controller
        .transcript()
        .turns()
        .iter()
        .map(|t| t.speaker)
        .collect();
    assert_eq!(
        speakers,
        vec![Speaker::Trainee, Speaker::Customer, Speaker::Trainee, Speaker::Customer]
    );

    let mut saw_goals = false;
    let mut last_state = None;
    while let Ok(event) = events.try_recv() {
        match event {
            ConversationEvent::GoalsUpdated(_) => saw_goals = true,
            ConversationEvent::StateChanged { to, .. } => last_state = Some(to),
            _ => {}
        }
    }
    assert!(saw_goals);
    assert_eq!(last_state, Some(TurnState::Ended));
}

#[tokio::test(start_paused = true)]
async fn trainee_closing_line_also_ends_conversation() {
    let (mut controller, _events) = TurnController::new(
        SessionContext::new("cold-call", "gatekeeper"),
        ConversationConfig::default(),
        LipSyncEngine::new(MorphTable::default(), 30),
        Collaborators {
            dialogue: Arc::new(MockDialogue::new().with_reply(DialogueReply::text("Alright."))),
            goals: None,
            player: None,
        },
    );

    let outcome = controller
        .submit(TraineeInput::Text("Thanks for your time, bye!".into()))
        .await
        .unwrap();
    assert!(outcome.closing.is_some());

    time::sleep(Duration::from_millis(3100)).await;
    assert_eq!(controller.state(), TurnState::Ended);
}
