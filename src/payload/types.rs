//! Audio payload shapes returned by the speech-synthesis service.
//!
//! The service is not consistent about how it returns audio. All shape
//! probing happens here, once, at the boundary; everything downstream
//! matches on [`AudioPayload`] only.

use crate::error::{RehearseError, Result};
use serde_json::Value;

/// One audio reference, exactly one shape populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPayload {
    /// `http://` or `https://` URL, played as-is.
    RemoteUrl(String),
    /// `data:` URI, handed to the playback backend verbatim.
    DataUri(String),
    /// Standard or URL-safe base64 text, with an optional declared MIME type.
    Base64Blob { data: String, mime: Option<String> },
    /// Raw audio bytes.
    RawBuffer { bytes: Vec<u8>, mime: Option<String> },
    /// Value of a `dataUrl` field: a data URI or any other URL, passed through.
    IndirectUrl(String),
}

impl AudioPayload {
    /// Classify a JSON value from a dialogue response.
    ///
    /// Resolution order, first match wins:
    /// 1. string with an `http(s)://` prefix
    /// 2. string with a `data:` prefix
    /// 3. any other non-empty string, or an object with a `base64` field
    /// 4. object with a `dataUrl` field
    /// 5. byte array, or a serialized buffer object (`{"type":"Buffer","data":[..]}`)
    /// 6. object with an `audioUrl` field
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::from_string(s),
            Value::Object(map) => {
                let mime = map
                    .get("mime")
                    .or_else(|| map.get("mimeType"))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                if let Some(data) = map.get("base64").and_then(Value::as_str) {
                    return Ok(AudioPayload::Base64Blob {
                        data: data.to_string(),
                        mime,
                    });
                }
                if let Some(url) = map.get("dataUrl").and_then(Value::as_str) {
                    return Ok(AudioPayload::IndirectUrl(url.to_string()));
                }
                if let Some(Value::Array(items)) = map.get("data")
                    && map.get("type").and_then(Value::as_str) == Some("Buffer")
                {
                    return Ok(AudioPayload::RawBuffer {
                        bytes: bytes_from_array(items)?,
                        mime,
                    });
                }
                if let Some(url) = map.get("audioUrl").and_then(Value::as_str) {
                    return Ok(AudioPayload::RemoteUrl(url.to_string()));
                }

                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                Err(RehearseError::UnrecognizedPayload {
                    message: format!("object with keys [{}]", keys.join(", ")),
                })
            }
            Value::Array(items) => Ok(AudioPayload::RawBuffer {
                bytes: bytes_from_array(items)?,
                mime: None,
            }),
            other => Err(RehearseError::UnrecognizedPayload {
                message: format!("unsupported JSON {}", json_kind(other)),
            }),
        }
    }

    /// Classify a bare string payload.
    pub fn from_string(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RehearseError::UnrecognizedPayload {
                message: "empty string".to_string(),
            });
        }
        if has_prefix_ignore_case(trimmed, "http://") || has_prefix_ignore_case(trimmed, "https://")
        {
            return Ok(AudioPayload::RemoteUrl(trimmed.to_string()));
        }
        if has_prefix_ignore_case(trimmed, "data:") {
            return Ok(AudioPayload::DataUri(trimmed.to_string()));
        }
        Ok(AudioPayload::Base64Blob {
            data: trimmed.to_string(),
            mime: None,
        })
    }

    /// Wrap a binary response body.
    pub fn from_bytes(bytes: Vec<u8>, mime: Option<&str>) -> Self {
        AudioPayload::RawBuffer {
            bytes,
            mime: mime.map(str::to_string),
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AudioPayload::RemoteUrl(_) => "remote_url",
            AudioPayload::DataUri(_) => "data_uri",
            AudioPayload::Base64Blob { .. } => "base64",
            AudioPayload::RawBuffer { .. } => "raw_buffer",
            AudioPayload::IndirectUrl(_) => "indirect_url",
        }
    }
}

pub(crate) fn has_prefix_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn bytes_from_array(items: &[Value]) -> Result<Vec<u8>> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| RehearseError::UnrecognizedPayload {
                    message: format!("byte array contains non-byte value {}", item),
                })
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_https_string_is_remote_url() {
        let payload = AudioPayload::from_json(&json!("https://x/y.mp3")).unwrap();
        assert_eq!(payload, AudioPayload::RemoteUrl("https://x/y.mp3".to_string()));
    }

    #[test]
    fn test_http_prefix_is_case_insensitive() {
        let payload = AudioPayload::from_string("HTTP://cdn/a.wav").unwrap();
        assert!(matches!(payload, AudioPayload::RemoteUrl(_)));
    }

    #[test]
    fn test_data_string_is_data_uri() {
        let payload = AudioPayload::from_json(&json!("data:audio/wav;base64,AAAA")).unwrap();
        assert_eq!(
            payload,
            AudioPayload::DataUri("data:audio/wav;base64,AAAA".to_string())
        );
    }

    #[test]
    fn test_other_string_is_base64() {
        let payload = AudioPayload::from_json(&json!("SUQzBAAAAAAA")).unwrap();
        assert_eq!(
            payload,
            AudioPayload::Base64Blob {
                data: "SUQzBAAAAAAA".to_string(),
                mime: None
            }
        );
    }

    #[test]
    fn test_empty_string_is_unrecognized() {
        let err = AudioPayload::from_json(&json!("   ")).unwrap_err();
        assert!(matches!(err, RehearseError::UnrecognizedPayload { .. }));
    }

    #[test]
    fn test_base64_object_keeps_mime() {
        let payload =
            AudioPayload::from_json(&json!({"base64": "AAAA", "mime": "audio/wav"})).unwrap();
        assert_eq!(
            payload,
            AudioPayload::Base64Blob {
                data: "AAAA".to_string(),
                mime: Some("audio/wav".to_string())
            }
        );
    }

    #[test]
    fn test_base64_field_wins_over_data_url() {
        let payload =
            AudioPayload::from_json(&json!({"dataUrl": "https://x/a.mp3", "base64": "AAAA"}))
                .unwrap();
        assert_eq!(payload.kind(), "base64");
    }

    #[test]
    fn test_data_url_object_is_indirect() {
        let payload =
            AudioPayload::from_json(&json!({"dataUrl": "data:audio/wav;base64,AAAA"})).unwrap();
        assert_eq!(
            payload,
            AudioPayload::IndirectUrl("data:audio/wav;base64,AAAA".to_string())
        );
    }

    #[test]
    fn test_data_url_wins_over_audio_url() {
        let payload = AudioPayload::from_json(
            &json!({"audioUrl": "https://a/1.mp3", "dataUrl": "https://b/2.mp3"}),
        )
        .unwrap();
        assert_eq!(payload, AudioPayload::IndirectUrl("https://b/2.mp3".to_string()));
    }

    #[test]
    fn test_byte_array_is_raw_buffer() {
        let payload = AudioPayload::from_json(&json!([82, 73, 70, 70])).unwrap();
        assert_eq!(
            payload,
            AudioPayload::RawBuffer {
                bytes: b"RIFF".to_vec(),
                mime: None
            }
        );
    }

    #[test]
    fn test_serialized_buffer_object_is_raw_buffer() {
        let payload =
            AudioPayload::from_json(&json!({"type": "Buffer", "data": [1, 2, 3]})).unwrap();
        assert_eq!(
            payload,
            AudioPayload::RawBuffer {
                bytes: vec![1, 2, 3],
                mime: None
            }
        );
    }

    #[test]
    fn test_byte_array_with_out_of_range_value_is_rejected() {
        let err = AudioPayload::from_json(&json!([1, 256])).unwrap_err();
        assert!(matches!(err, RehearseError::UnrecognizedPayload { .. }));
    }

    #[test]
    fn test_audio_url_object_is_remote() {
        let payload = AudioPayload::from_json(&json!({"audioUrl": "https://x/y.mp3"})).unwrap();
        assert_eq!(payload, AudioPayload::RemoteUrl("https://x/y.mp3".to_string()));
    }

    #[test]
    fn test_unknown_shapes_are_unrecognized() {
        for value in [json!(null), json!(42), json!(true), json!({"url": "x"})] {
            let err = AudioPayload::from_json(&value).unwrap_err();
            assert!(
                matches!(err, RehearseError::UnrecognizedPayload { .. }),
                "expected UnrecognizedPayload for {}",
                value
            );
        }
    }

    #[test]
    fn test_from_bytes_wraps_raw_buffer() {
        let payload = AudioPayload::from_bytes(vec![9, 9], Some("audio/ogg"));
        assert_eq!(payload.kind(), "raw_buffer");
    }
}
