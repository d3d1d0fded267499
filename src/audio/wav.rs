//! WAV encoding for captured audio.

use crate::error::{RehearseError, Result};
use std::io::Cursor;

/// MIME type of blobs produced by [`encode_wav`].
pub const WAV_MIME: &str = "audio/wav";

/// Encode 16-bit mono PCM into an in-memory WAV file.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)?;
    Ok(cursor.into_inner())
}

/// Decode a WAV file into mono 16-bit samples at its native rate.
///
/// Stereo input is downmixed by averaging the channels.
pub fn decode_wav(bytes: &[u8]) -> Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| RehearseError::Decode {
        message: format!("Failed to parse WAV data: {}", e),
    })?;
    let spec = reader.spec();

    let raw_samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| RehearseError::Decode {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    let channels = spec.channels.max(1) as usize;
    let mono = if channels == 1 {
        raw_samples
    } else {
        raw_samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Duration in milliseconds of `samples` mono samples at `sample_rate`.
pub fn duration_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples as u64 * 1000 / sample_rate as u64
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

fn wav_error(e: hound::Error) -> RehearseError {
    RehearseError::Encoder {
        encoder: "wav".to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn encode_wav_produces_riff_header() {
        let bytes = encode_wav(&[1, 2, 3], 16000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[test]
    fn encode_wav_of_empty_capture_is_header_only() {
        let bytes = encode_wav(&[], 16000).unwrap();
        assert_eq!(bytes.len(), 44);
    }

    #[test]
    fn encoded_wav_is_readable_by_hound() {
        let samples = vec![100i16, -200, 300, -400];
        let bytes = encode_wav(&samples, 22050).unwrap();

        let (decoded, rate) = decode_wav(&bytes).unwrap();
        assert_eq!(rate, 22050);
        assert_eq!(decoded, samples);
    }

    #[test]
    fn decode_wav_downmixes_stereo() {
        let wav = make_wav_data(16000, 2, &[100, 200, 300, 400]);
        let (mono, _) = decode_wav(&wav).unwrap();
        assert_eq!(mono, vec![150, 350]);
    }

    #[test]
    fn decode_wav_rejects_garbage() {
        let err = decode_wav(b"not a wav file").unwrap_err();
        assert!(matches!(err, RehearseError::Decode { .. }));
    }

    #[test]
    fn duration_ms_handles_zero_rate() {
        assert_eq!(duration_ms(16000, 16000), 1000);
        assert_eq!(duration_ms(8000, 16000), 500);
        assert_eq!(duration_ms(10, 0), 0);
    }

    #[test]
    fn resample_same_rate_returns_input() {
        let input = vec![1i16, 2, 3];
        assert_eq!(resample(&input, 16000, 16000), input);
    }

    #[test]
    fn resample_48k_to_16k_divides_length_by_three() {
        let input = vec![500i16; 4800];
        let output = resample(&input, 48000, 16000);
        assert_eq!(output.len(), 1600);
        assert!(output.iter().all(|&s| s == 500));
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 44100, 16000).is_empty());
    }
}
