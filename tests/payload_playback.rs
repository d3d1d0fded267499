//! Payload shapes through normalization into playback.

use rehearse::lipsync::{CueTimeline, LipSyncEngine, MorphTable, PlayedResource, ScriptedPlayer};
use rehearse::payload::{PayloadNormalizer, UrlOrigin};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn engine() -> LipSyncEngine {
    LipSyncEngine::new(MorphTable::default(), 10)
}

async fn play_to_end(normalizer: &PayloadNormalizer, payload: serde_json::Value) -> Arc<ScriptedPlayer> {
    let player = Arc::new(ScriptedPlayer::new(Duration::from_millis(300)));
    let resource = normalizer.normalize_json(&payload, None).unwrap();
    let stream = engine()
        .play(player.clone(), resource, CueTimeline::default())
        .await
        .unwrap();
    stream.handle().wait().await;
    player
}

#[tokio::test(start_paused = true)]
async fn data_url_field_is_played_verbatim_without_allocation() {
    let normalizer = PayloadNormalizer::new();
    let url = "data:audio/mpeg;base64,SUQzBAAAAAAA";

    let player = play_to_end(&normalizer, json!({ "dataUrl": url })).await;

    assert_eq!(
        player.played(),
        vec![PlayedResource::Url {
            url: url.to_string(),
            origin: UrlOrigin::Indirect
        }]
    );
    assert_eq!(normalizer.ledger().allocated(), 0);
}

#[tokio::test(start_paused = true)]
async fn https_url_is_played_directly() {
    let normalizer = PayloadNormalizer::new();
    let url = "https://tts.example.com/replies/42.mp3";

    let player = play_to_end(&normalizer, json!(url)).await;

    assert_eq!(
        player.played(),
        vec![PlayedResource::Url {
            url: url.to_string(),
            origin: UrlOrigin::Remote
        }]
    );
    assert_eq!(normalizer.ledger().allocated(), 0);
    assert_eq!(normalizer.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn base64_blob_is_released_after_playback() {
    let normalizer = PayloadNormalizer::new();

    let player = play_to_end(
        &normalizer,
        json!({ "base64": "SUQzBAAAAAAAI1RTU0UAAAAPAAAD", "mime": "audio/mpeg" }),
    )
    .await;

    assert!(matches!(player.played()[0], PlayedResource::Buffer { bytes, .. } if bytes > 0));
    assert_eq!(normalizer.ledger().allocated(), 1);
    assert_eq!(normalizer.ledger().released(), 1);
    assert_eq!(normalizer.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn serialized_buffer_object_becomes_local_audio() {
    let normalizer = PayloadNormalizer::new();

    let player = play_to_end(&normalizer, json!({ "type": "Buffer", "data": [73, 68, 51] })).await;

    assert!(matches!(player.played()[0], PlayedResource::Buffer { bytes: 3, .. }));
    assert_eq!(normalizer.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn stopping_mid_playback_releases_once() {
    let normalizer = PayloadNormalizer::new();
    let player = Arc::new(ScriptedPlayer::new(Duration::from_secs(10)));
    let resource = normalizer
        .normalize_json(&json!({ "base64": "UklGRiQAAABXQVZF" }), Some("audio/wav"))
        .unwrap();
    assert_eq!(resource.mime(), Some("audio/wav"));

    let stream = engine()
        .play(player.clone(), resource, CueTimeline::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(normalizer.outstanding(), 1);

    stream.handle().stop();
    stream.handle().stop();
    stream.handle().wait().await;

    assert_eq!(normalizer.outstanding(), 0);
    assert_eq!(normalizer.ledger().released(), 1);
    assert!(player.stop_calls() >= 1);
}

#[test]
fn malformed_payloads_allocate_nothing() {
    let normalizer = PayloadNormalizer::new();
    assert!(normalizer.normalize_json(&json!({ "base64": "%%%" }), None).is_err());
    assert!(normalizer.normalize_json(&json!({ "unexpected": 1 }), None).is_err());
    assert!(normalizer.normalize_json(&json!(null), None).is_err());
    assert_eq!(normalizer.ledger().allocated(), 0);
}
