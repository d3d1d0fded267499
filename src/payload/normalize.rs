//! Normalization of audio payloads into playable resources.
//!
//! URL-shaped payloads are never decoded locally: not every playback backend
//! accepts a synthetic fetch against a custom scheme, so data URIs travel
//! verbatim. Base64 and raw buffers become owned [`LocalAudio`] buffers that
//! release themselves when dropped.

use crate::defaults;
use crate::error::{RehearseError, Result};
use crate::payload::types::AudioPayload;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Standard-alphabet decoder that tolerates non-zero trailing bits and any
/// padding, like the browser `atob` the service output is tested against.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where a URL resource came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOrigin {
    Remote,
    DataUri,
    Indirect,
}

/// A URL the playback backend resolves itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlResource {
    pub url: String,
    pub origin: UrlOrigin,
}

/// Counts local audio allocations so leaks and double releases are observable.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    live: AtomicUsize,
    allocated: AtomicU64,
    released: AtomicU64,
}

impl AllocationLedger {
    /// Buffers currently alive.
    pub fn outstanding(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Buffers ever allocated.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Buffers ever released.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

/// Locally decoded audio bytes with an owned lifetime.
///
/// Released exactly once: when dropped, or through [`LocalAudio::release`].
pub struct LocalAudio {
    id: u64,
    bytes: Vec<u8>,
    mime: String,
    ledger: Arc<AllocationLedger>,
}

impl LocalAudio {
    fn new(bytes: Vec<u8>, mime: String, ledger: Arc<AllocationLedger>) -> Self {
        let id = ledger.allocated.fetch_add(1, Ordering::SeqCst) + 1;
        ledger.live.fetch_add(1, Ordering::SeqCst);
        debug!(id, bytes = bytes.len(), %mime, "allocated local audio");
        Self {
            id,
            bytes,
            mime,
            ledger,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Release the buffer now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LocalAudio {
    fn drop(&mut self) {
        self.ledger.live.fetch_sub(1, Ordering::SeqCst);
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
        debug!(id = self.id, "released local audio");
    }
}

impl fmt::Debug for LocalAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAudio")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .field("mime", &self.mime)
            .finish()
    }
}

/// Handle to audio the playback backend can open.
#[derive(Debug)]
pub enum PlayableResource {
    Url(UrlResource),
    Buffer(LocalAudio),
}

impl PlayableResource {
    /// Whether this resource owns a local allocation.
    pub fn is_local(&self) -> bool {
        matches!(self, PlayableResource::Buffer(_))
    }

    pub fn as_url(&self) -> Option<&UrlResource> {
        match self {
            PlayableResource::Url(url) => Some(url),
            PlayableResource::Buffer(_) => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&LocalAudio> {
        match self {
            PlayableResource::Buffer(buf) => Some(buf),
            PlayableResource::Url(_) => None,
        }
    }

    /// Declared MIME type, when known without fetching.
    pub fn mime(&self) -> Option<&str> {
        match self {
            PlayableResource::Buffer(buf) => Some(buf.mime()),
            PlayableResource::Url(UrlResource { url, .. }) => data_uri_mime(url),
        }
    }
}

/// Turns [`AudioPayload`]s into [`PlayableResource`]s.
#[derive(Debug, Clone, Default)]
pub struct PayloadNormalizer {
    ledger: Arc<AllocationLedger>,
}

impl PayloadNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation counters for buffers produced by this normalizer.
    pub fn ledger(&self) -> &AllocationLedger {
        &self.ledger
    }

    /// Local buffers produced by this normalizer that are still alive.
    pub fn outstanding(&self) -> usize {
        self.ledger.outstanding()
    }

    /// Normalize a payload, using `mime_hint` when the payload declares no type.
    ///
    /// # Errors
    /// `Decode` for malformed base64, `UnrecognizedPayload` for an empty raw
    /// buffer. Nothing is allocated on either path.
    pub fn normalize(
        &self,
        payload: AudioPayload,
        mime_hint: Option<&str>,
    ) -> Result<PlayableResource> {
        let kind = payload.kind();
        let resource = match payload {
            AudioPayload::RemoteUrl(url) => PlayableResource::Url(UrlResource {
                url,
                origin: UrlOrigin::Remote,
            }),
            AudioPayload::DataUri(url) => PlayableResource::Url(UrlResource {
                url,
                origin: UrlOrigin::DataUri,
            }),
            AudioPayload::Base64Blob { data, mime } => {
                let bytes = decode_base64(&data)?;
                PlayableResource::Buffer(LocalAudio::new(
                    bytes,
                    resolve_mime(mime.as_deref(), mime_hint),
                    Arc::clone(&self.ledger),
                ))
            }
            AudioPayload::IndirectUrl(url) => PlayableResource::Url(UrlResource {
                url,
                origin: UrlOrigin::Indirect,
            }),
            AudioPayload::RawBuffer { bytes, mime } => {
                if bytes.is_empty() {
                    return Err(RehearseError::UnrecognizedPayload {
                        message: "empty byte buffer".to_string(),
                    });
                }
                PlayableResource::Buffer(LocalAudio::new(
                    bytes,
                    resolve_mime(mime.as_deref(), mime_hint),
                    Arc::clone(&self.ledger),
                ))
            }
        };
        debug!(kind, local = resource.is_local(), "normalized audio payload");
        Ok(resource)
    }

    /// Classify and normalize a JSON payload in one step.
    pub fn normalize_json(
        &self,
        value: &serde_json::Value,
        mime_hint: Option<&str>,
    ) -> Result<PlayableResource> {
        let payload = AudioPayload::from_json(value).inspect_err(|e| {
            warn!(error = %e, "audio payload shape not recognized");
        })?;
        self.normalize(payload, mime_hint)
    }
}

fn resolve_mime(declared: Option<&str>, hint: Option<&str>) -> String {
    declared
        .filter(|m| !m.is_empty())
        .or(hint.filter(|m| !m.is_empty()))
        .unwrap_or(defaults::DEFAULT_AUDIO_MIME)
        .to_string()
}

/// Decode standard or URL-safe base64, with or without padding.
///
/// Whitespace is ignored, `-`/`_` are mapped to `+`/`/`, and the input is
/// padded to a multiple of four before decoding.
pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
    let mut cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    if cleaned.is_empty() {
        return Err(RehearseError::Decode {
            message: "empty base64 input".to_string(),
        });
    }

    let remainder = cleaned.len() % 4;
    if remainder != 0 {
        cleaned.extend(std::iter::repeat_n('=', 4 - remainder));
    }

    LENIENT_STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|e| RehearseError::Decode {
            message: e.to_string(),
        })
}

/// MIME type declared in a `data:` URI header, if any.
pub fn data_uri_mime(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("data:")?;
    let header = &rest[..rest.find(',')?];
    let mime = header.split(';').next().unwrap_or("");
    if mime.is_empty() { None } else { Some(mime) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
    use serde_json::json;

    /// Deterministic byte generator for decoder comparisons.
    fn pseudo_random_bytes(seed: u64, len: usize) -> Vec<u8> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (state >> 56) as u8
            })
            .collect()
    }

    #[test]
    fn test_decode_matches_reference_for_all_alphabets() {
        for seed in 0..64u64 {
            for len in [1usize, 2, 3, 4, 5, 31, 32, 33, 257] {
                let bytes = pseudo_random_bytes(seed, len);
                let encodings = [
                    STANDARD.encode(&bytes),
                    STANDARD_NO_PAD.encode(&bytes),
                    URL_SAFE.encode(&bytes),
                    URL_SAFE_NO_PAD.encode(&bytes),
                ];
                for encoded in encodings {
                    let decoded = decode_base64(&encoded).unwrap();
                    assert_eq!(decoded, bytes, "mismatch for {}", encoded);
                }
            }
        }
    }

    #[test]
    fn test_decode_strips_whitespace() {
        let encoded = STANDARD.encode(b"hello lipsync");
        let wrapped = format!("  {}\n{}\r\n", &encoded[..8], &encoded[8..]);
        assert_eq!(decode_base64(&wrapped).unwrap(), b"hello lipsync");
    }

    #[test]
    fn test_decode_rejects_bad_alphabet() {
        let err = decode_base64("AB$D").unwrap_err();
        assert!(matches!(err, RehearseError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_irreparable_length() {
        // One leftover symbol cannot encode a byte.
        let err = decode_base64("AAAAA").unwrap_err();
        assert!(matches!(err, RehearseError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_padding_in_the_middle() {
        assert!(decode_base64("AA==AAAA").is_err());
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        assert!(decode_base64(" \n ").is_err());
    }

    #[test]
    fn test_remote_url_allocates_nothing() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer
            .normalize_json(&json!("https://x/y.mp3"), None)
            .unwrap();

        assert!(!resource.is_local());
        let url = resource.as_url().unwrap();
        assert_eq!(url.url, "https://x/y.mp3");
        assert_eq!(url.origin, UrlOrigin::Remote);
        assert_eq!(normalizer.ledger().allocated(), 0);
    }

    #[test]
    fn test_data_url_object_passes_through_verbatim() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer
            .normalize_json(&json!({"dataUrl": "data:audio/wav;base64,AAAA"}), None)
            .unwrap();

        let url = resource.as_url().unwrap();
        assert_eq!(url.url, "data:audio/wav;base64,AAAA");
        assert_eq!(url.origin, UrlOrigin::Indirect);
        assert_eq!(resource.mime(), Some("audio/wav"));
        assert_eq!(normalizer.ledger().allocated(), 0);
    }

    #[test]
    fn test_data_uri_string_passes_through() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer
            .normalize(
                AudioPayload::DataUri("data:audio/mpeg;base64,SUQz".to_string()),
                Some("audio/wav"),
            )
            .unwrap();
        assert_eq!(resource.as_url().unwrap().origin, UrlOrigin::DataUri);
        assert_eq!(normalizer.outstanding(), 0);
    }

    #[test]
    fn test_base64_decodes_into_local_buffer_with_hint() {
        let normalizer = PayloadNormalizer::new();
        let encoded = URL_SAFE_NO_PAD.encode([0xfb, 0xff, 0xfe, 0x01]);
        let resource = normalizer
            .normalize(
                AudioPayload::Base64Blob {
                    data: encoded,
                    mime: None,
                },
                Some("audio/wav"),
            )
            .unwrap();

        let buffer = resource.as_buffer().unwrap();
        assert_eq!(buffer.bytes(), &[0xfb, 0xff, 0xfe, 0x01]);
        assert_eq!(buffer.mime(), "audio/wav");
        assert_eq!(normalizer.outstanding(), 1);

        drop(resource);
        assert_eq!(normalizer.outstanding(), 0);
        assert_eq!(normalizer.ledger().released(), 1);
    }

    #[test]
    fn test_declared_mime_wins_over_hint() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer
            .normalize_json(&json!({"base64": "AAAA", "mime": "audio/ogg"}), Some("audio/wav"))
            .unwrap();
        assert_eq!(resource.mime(), Some("audio/ogg"));
    }

    #[test]
    fn test_missing_mime_falls_back_to_default() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer.normalize_json(&json!("AAAA"), None).unwrap();
        assert_eq!(resource.mime(), Some(defaults::DEFAULT_AUDIO_MIME));
    }

    #[test]
    fn test_malformed_base64_allocates_nothing() {
        let normalizer = PayloadNormalizer::new();
        for bad in ["A", "AB$D", "!!!!", "AAAAA", "AA==AAAA"] {
            let err = normalizer
                .normalize(
                    AudioPayload::Base64Blob {
                        data: bad.to_string(),
                        mime: None,
                    },
                    None,
                )
                .unwrap_err();
            assert!(matches!(err, RehearseError::Decode { .. }), "{}", bad);
        }
        assert_eq!(normalizer.ledger().allocated(), 0);
        assert_eq!(normalizer.outstanding(), 0);
    }

    #[test]
    fn test_raw_buffer_is_wrapped_directly() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer
            .normalize(AudioPayload::from_bytes(b"RIFF".to_vec(), None), Some("audio/wav"))
            .unwrap();
        let buffer = resource.as_buffer().unwrap();
        assert_eq!(buffer.bytes(), b"RIFF");
        assert_eq!(buffer.mime(), "audio/wav");
    }

    #[test]
    fn test_empty_raw_buffer_is_rejected() {
        let normalizer = PayloadNormalizer::new();
        let err = normalizer
            .normalize(AudioPayload::from_bytes(Vec::new(), None), None)
            .unwrap_err();
        assert!(matches!(err, RehearseError::UnrecognizedPayload { .. }));
        assert_eq!(normalizer.ledger().allocated(), 0);
    }

    #[test]
    fn test_unrecognized_json_fails() {
        let normalizer = PayloadNormalizer::new();
        let err = normalizer.normalize_json(&json!(17), None).unwrap_err();
        assert!(matches!(err, RehearseError::UnrecognizedPayload { .. }));
    }

    #[test]
    fn test_release_is_exactly_once() {
        let normalizer = PayloadNormalizer::new();
        let resource = normalizer.normalize_json(&json!("AAAA"), None).unwrap();
        let PlayableResource::Buffer(buffer) = resource else {
            panic!("expected local buffer");
        };
        buffer.release();
        assert_eq!(normalizer.ledger().allocated(), 1);
        assert_eq!(normalizer.ledger().released(), 1);
        assert_eq!(normalizer.outstanding(), 0);
    }

    #[test]
    fn test_data_uri_mime() {
        assert_eq!(data_uri_mime("data:audio/wav;base64,AAAA"), Some("audio/wav"));
        assert_eq!(data_uri_mime("data:,hello"), None);
        assert_eq!(data_uri_mime("https://x/y.mp3"), None);
    }
}
