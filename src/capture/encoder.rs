//! Encoders fed by the capture pump.
//!
//! The transcription encoder buffers voice-only PCM and produces one WAV
//! blob on finish. The archival encoder interleaves audio and video into
//! length-prefixed records and cuts them into chunks on a fixed cadence.
//!
//! Archival layout, little endian:
//!
//! ```text
//! header:  b"RHAV" | version u8 | sample_rate u32
//! record:  kind u8 (0 = pcm s16le, 1 = video) | timestamp_ms u32 | len u32 | payload
//! ```
//!
//! The header is written with the first record, so a recording cancelled
//! before any data arrives is empty.

use crate::audio::wav::{self, WAV_MIME};
use crate::capture::device::VideoFrame;
use crate::error::{RehearseError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// MIME type of archival blobs.
pub const ARCHIVAL_MIME: &str = "application/x-rehearse-av";

const ARCHIVAL_MAGIC: &[u8; 4] = b"RHAV";
const ARCHIVAL_VERSION: u8 = 1;
const HEADER_LEN: usize = 9;
const RECORD_OVERHEAD: usize = 9;

/// Finished voice-only recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
}

impl AudioBlob {
    pub fn is_silent(&self) -> bool {
        self.duration_ms == 0
    }
}

/// Buffers voice audio in memory for the transcription service.
#[derive(Debug)]
pub struct TranscriptionEncoder {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl TranscriptionEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn push(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Concatenate everything captured into one WAV blob.
    pub fn finish(self) -> Result<AudioBlob> {
        let duration_ms = wav::duration_ms(self.samples.len(), self.sample_rate);
        let bytes = wav::encode_wav(&self.samples, self.sample_rate).map_err(|e| {
            RehearseError::Encoder {
                encoder: "transcription".to_string(),
                message: e.to_string(),
            }
        })?;
        debug!(bytes = bytes.len(), duration_ms, "transcription blob finalized");
        Ok(AudioBlob {
            bytes,
            mime: WAV_MIME.to_string(),
            sample_rate: self.sample_rate,
            duration_ms,
        })
    }
}

/// Counters reported with a finished archival recording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchivalStats {
    pub audio_records: u64,
    pub video_frames: u64,
    pub video_frames_dropped: u64,
    pub chunks: u64,
}

/// Finished archival recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub stats: ArchivalStats,
}

impl ArchivalBlob {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Records audio and video into a chunked archival stream.
#[derive(Debug)]
pub struct ArchivalEncoder {
    sample_rate: u32,
    chunk_budget: usize,
    chunks: Vec<Vec<u8>>,
    current: Vec<u8>,
    header_written: bool,
    samples_seen: u64,
    stats: ArchivalStats,
    failure: Option<String>,
}

impl ArchivalEncoder {
    /// `bitrate_bps` and `chunk_interval` give the byte budget per chunk;
    /// video frames that would exceed it are dropped. Audio is never dropped.
    pub fn new(sample_rate: u32, bitrate_bps: u32, chunk_interval: Duration) -> Self {
        let budget = u128::from(bitrate_bps) / 8 * chunk_interval.as_millis() / 1000;
        let chunk_budget = usize::try_from(budget).unwrap_or(usize::MAX);
        Self {
            sample_rate,
            chunk_budget,
            chunks: Vec::new(),
            current: Vec::new(),
            header_written: false,
            samples_seen: 0,
            stats: ArchivalStats::default(),
            failure: None,
        }
    }

    /// Media time in milliseconds, derived from the audio clock.
    pub fn media_time_ms(&self) -> u64 {
        wav::duration_ms(self.samples_seen as usize, self.sample_rate)
    }

    pub fn stats(&self) -> ArchivalStats {
        self.stats
    }

    pub fn chunks_emitted(&self) -> usize {
        self.chunks.len()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn push_audio(&mut self, samples: &[i16]) -> Result<()> {
        self.check_healthy()?;
        if samples.is_empty() {
            return Ok(());
        }
        let timestamp = self.media_time_ms();
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        self.write_record(0, timestamp, &payload)?;
        self.samples_seen += samples.len() as u64;
        self.stats.audio_records += 1;
        Ok(())
    }

    pub fn push_video(&mut self, frame: &VideoFrame) -> Result<()> {
        self.check_healthy()?;
        let record_len = RECORD_OVERHEAD + frame.data.len();
        if self.current.len() + record_len > self.chunk_budget {
            self.stats.video_frames_dropped += 1;
            return Ok(());
        }
        self.write_record(1, self.media_time_ms(), &frame.data)?;
        self.stats.video_frames += 1;
        Ok(())
    }

    /// Close the current chunk. Called on the chunk cadence.
    pub fn flush_chunk(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.current);
        debug!(bytes = chunk.len(), index = self.chunks.len(), "archival chunk emitted");
        self.chunks.push(chunk);
        self.stats.chunks += 1;
    }

    /// Flush the last partial chunk and concatenate every chunk.
    pub fn finish(mut self) -> Result<ArchivalBlob> {
        if let Some(reason) = self.failure.take() {
            return Err(RehearseError::Encoder {
                encoder: "archival".to_string(),
                message: reason,
            });
        }
        self.flush_chunk();
        let bytes = self.chunks.concat();
        Ok(ArchivalBlob {
            bytes,
            mime: ARCHIVAL_MIME.to_string(),
            stats: self.stats,
        })
    }

    fn check_healthy(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => Err(RehearseError::Encoder {
                encoder: "archival".to_string(),
                message: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn write_record(&mut self, kind: u8, timestamp_ms: u64, payload: &[u8]) -> Result<()> {
        let (Ok(timestamp), Ok(len)) = (u32::try_from(timestamp_ms), u32::try_from(payload.len()))
        else {
            let reason = format!(
                "record out of range (timestamp {} ms, {} bytes)",
                timestamp_ms,
                payload.len()
            );
            warn!(%reason, "archival encoder failed");
            self.failure = Some(reason.clone());
            return Err(RehearseError::Encoder {
                encoder: "archival".to_string(),
                message: reason,
            });
        };

        if !self.header_written {
            self.current.extend_from_slice(ARCHIVAL_MAGIC);
            self.current.push(ARCHIVAL_VERSION);
            self.current
                .extend_from_slice(&self.sample_rate.to_le_bytes());
            self.header_written = true;
        }
        self.current.push(kind);
        self.current.extend_from_slice(&timestamp.to_le_bytes());
        self.current.extend_from_slice(&len.to_le_bytes());
        self.current.extend_from_slice(payload);
        Ok(())
    }
}

/// One record read back from an archival blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchivalRecord {
    Audio { timestamp_ms: u32, samples: Vec<i16> },
    Video { timestamp_ms: u32, data: Vec<u8> },
}

/// Parse an archival blob back into its sample rate and records.
pub fn parse_archival(bytes: &[u8]) -> Result<(u32, Vec<ArchivalRecord>)> {
    let malformed = |what: &str| RehearseError::Decode {
        message: format!("malformed archival recording: {}", what),
    };

    if bytes.len() < HEADER_LEN || &bytes[0..4] != ARCHIVAL_MAGIC {
        return Err(malformed("missing header"));
    }
    if bytes[4] != ARCHIVAL_VERSION {
        return Err(malformed("unsupported version"));
    }
    let sample_rate = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

    let mut records = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < bytes.len() {
        if pos + RECORD_OVERHEAD > bytes.len() {
            return Err(malformed("truncated record header"));
        }
        let kind = bytes[pos];
        let timestamp_ms =
            u32::from_le_bytes([bytes[pos + 1], bytes[pos + 2], bytes[pos + 3], bytes[pos + 4]]);
        let len =
            u32::from_le_bytes([bytes[pos + 5], bytes[pos + 6], bytes[pos + 7], bytes[pos + 8]])
                as usize;
        pos += RECORD_OVERHEAD;
        let payload = bytes
            .get(pos..pos + len)
            .ok_or_else(|| malformed("truncated record payload"))?;
        pos += len;

        match kind {
            0 => records.push(ArchivalRecord::Audio {
                timestamp_ms,
                samples: payload
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            }),
            1 => records.push(ArchivalRecord::Video {
                timestamp_ms,
                data: payload.to_vec(),
            }),
            _ => return Err(malformed("unknown record kind")),
        }
    }
    Ok((sample_rate, records))
}
