//! Speaker output through rodio.
//!
//! `rodio::OutputStream` is not `Send`, so each playback gets a dedicated
//! thread that owns the stream and parks until the player is stopped. The
//! `Sink` itself is shared with the async side for position queries.

use crate::error::{RehearseError, Result};
use crate::lipsync::player::Player;
use crate::payload::types::has_prefix_ignore_case;
use crate::payload::{PlayableResource, UrlResource, decode_base64};
use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

struct Active {
    sink: Arc<Sink>,
    shutdown: std_mpsc::Sender<()>,
}

/// [`Player`] that plays through the default output device.
pub struct RodioPlayer {
    client: reqwest::Client,
    active: Mutex<Option<Active>>,
}

impl RodioPlayer {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Active>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bytes for a resource: local buffers as-is, data URIs decoded here,
    /// remote URLs fetched.
    async fn load(&self, resource: &PlayableResource) -> Result<Vec<u8>> {
        match resource {
            PlayableResource::Buffer(buf) => Ok(buf.bytes().to_vec()),
            PlayableResource::Url(UrlResource { url, .. }) if has_prefix_ignore_case(url, "data:") => {
                decode_data_uri(url)
            }
            PlayableResource::Url(UrlResource { url, .. }) => self.fetch(url).await,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| playback_error(format!("failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(playback_error(format!(
                "fetching {} returned status {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| playback_error(format!("failed to read {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Player for RodioPlayer {
    async fn start(&self, resource: &PlayableResource) -> Result<()> {
        let bytes = self.load(resource).await?;
        debug!(bytes = bytes.len(), "decoding customer audio");

        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<Arc<Sink>, String>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("rehearse-playback".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to open audio output: {}", e)));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("failed to create audio sink: {}", e)));
                        return;
                    }
                };
                let source = match Decoder::new(Cursor::new(bytes)) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("unsupported audio data: {}", e)));
                        return;
                    }
                };
                sink.append(source);
                let sink = Arc::new(sink);
                if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                    return;
                }
                // Returns on stop or when the player is dropped.
                let _ = shutdown_rx.recv();
                sink.stop();
            })
            .map_err(|e| playback_error(format!("failed to spawn playback thread: {}", e)))?;

        let sink = ready_rx
            .await
            .map_err(|_| playback_error("playback thread exited".to_string()))?
            .map_err(playback_error)?;

        let previous = self.lock().replace(Active {
            sink,
            shutdown: shutdown_tx,
        });
        if let Some(previous) = previous {
            warn!("starting playback while another is active; stopping the previous one");
            let _ = previous.shutdown.send(());
        }
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        self.lock().as_ref().map(|active| active.sink.get_pos())
    }

    fn is_finished(&self) -> bool {
        self.lock().as_ref().is_none_or(|active| active.sink.empty())
    }

    fn stop(&self) {
        if let Some(active) = self.lock().take() {
            active.sink.stop();
            let _ = active.shutdown.send(());
            debug!("speaker playback stopped");
        }
    }
}

fn playback_error(message: String) -> RehearseError {
    RehearseError::Playback { message }
}

/// Decode a `data:` URI body. Only base64 bodies carry binary audio.
fn decode_data_uri(url: &str) -> Result<Vec<u8>> {
    let rest = if has_prefix_ignore_case(url, "data:") {
        &url["data:".len()..]
    } else {
        url
    };
    let Some((header, body)) = rest.split_once(',') else {
        return Err(RehearseError::Decode {
            message: "data URI has no body".to_string(),
        });
    };
    if header.to_ascii_lowercase().ends_with(";base64") {
        decode_base64(body)
    } else {
        Ok(body.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_data_uri() {
        assert_eq!(
            decode_data_uri("data:audio/wav;base64,UklGRg==").unwrap(),
            b"RIFF".to_vec()
        );
    }

    #[test]
    fn upper_case_data_uri_is_decoded_locally() {
        let url = "DATA:audio/wav;BASE64,UklGRg==";
        assert!(has_prefix_ignore_case(url, "data:"));
        assert_eq!(decode_data_uri(url).unwrap(), b"RIFF".to_vec());
    }

    #[test]
    fn plain_data_uri_body_is_taken_literally() {
        assert_eq!(decode_data_uri("data:text/plain,abc").unwrap(), b"abc".to_vec());
    }

    #[test]
    fn data_uri_without_comma_is_rejected() {
        assert!(matches!(
            decode_data_uri("data:audio/wav;base64"),
            Err(RehearseError::Decode { .. })
        ));
    }

    #[test]
    fn idle_player_reports_finished() {
        let player = RodioPlayer::default();
        assert!(player.is_finished());
        assert_eq!(player.position(), None);
        player.stop();
    }
}
