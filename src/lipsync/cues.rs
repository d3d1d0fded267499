//! Viseme cue timelines.

use crate::error::{RehearseError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Mouth shape category, using the Rhubarb Lip Sync symbols.
///
/// `A` through `H` are speaking shapes; `X` is the idle mouth during silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Viseme {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    X,
}

impl Viseme {
    pub const ALL: [Viseme; 9] = [
        Viseme::A,
        Viseme::B,
        Viseme::C,
        Viseme::D,
        Viseme::E,
        Viseme::F,
        Viseme::G,
        Viseme::H,
        Viseme::X,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Viseme::A => "A",
            Viseme::B => "B",
            Viseme::C => "C",
            Viseme::D => "D",
            Viseme::E => "E",
            Viseme::F => "F",
            Viseme::G => "G",
            Viseme::H => "H",
            Viseme::X => "X",
        }
    }

    pub fn is_silence(self) -> bool {
        self == Viseme::X
    }
}

impl FromStr for Viseme {
    type Err = RehearseError;

    fn from_str(s: &str) -> Result<Self> {
        Viseme::ALL
            .into_iter()
            .find(|v| v.symbol().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RehearseError::Decode {
                message: format!("unknown viseme symbol '{}'", s),
            })
    }
}

impl fmt::Display for Viseme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One viseme interval `[start, end)` in seconds of audio time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthCue {
    pub start: f64,
    pub end: f64,
    pub viseme: Viseme,
}

impl MouthCue {
    pub fn new(start: f64, end: f64, viseme: Viseme) -> Self {
        Self { start, end, viseme }
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }

    fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start < self.end
    }
}

/// Cues ordered by start time.
///
/// Upstream cue data may overlap. Lookups resolve overlaps by picking the
/// matching cue with the earliest start; equal starts keep input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueTimeline {
    cues: Vec<MouthCue>,
}

/// One entry of Rhubarb's `mouthCues` array, as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueRecord {
    pub start: f64,
    pub end: f64,
    pub value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RhubarbFile {
    mouth_cues: Vec<CueRecord>,
}

impl CueTimeline {
    /// Build a timeline, dropping cues that are empty, inverted or non-finite.
    pub fn new(cues: Vec<MouthCue>) -> Self {
        let total = cues.len();
        let mut cues: Vec<MouthCue> = cues.into_iter().filter(MouthCue::is_valid).collect();
        if cues.len() != total {
            warn!(dropped = total - cues.len(), "ignoring invalid mouth cues");
        }
        // Stable, so cues with equal starts keep their input order.
        cues.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { cues }
    }

    /// Parse Rhubarb Lip Sync JSON output (`{"mouthCues": [...]}`).
    pub fn from_rhubarb_json(json: &str) -> Result<Self> {
        let file: RhubarbFile = serde_json::from_str(json).map_err(|e| RehearseError::Decode {
            message: format!("invalid cue file: {}", e),
        })?;
        Self::from_records(&file.mouth_cues)
    }

    /// Build from wire records. Unknown viseme symbols are a `Decode` error.
    pub fn from_records(records: &[CueRecord]) -> Result<Self> {
        let cues = records
            .iter()
            .map(|cue| Ok(MouthCue::new(cue.start, cue.end, cue.value.parse()?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(cues))
    }

    pub fn cues(&self) -> &[MouthCue] {
        &self.cues
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// End of the last cue, in seconds.
    pub fn duration(&self) -> f64 {
        self.cues.iter().map(|c| c.end).fold(0.0, f64::max)
    }

    /// The earliest-starting cue whose interval contains `t`.
    pub fn cue_at(&self, t: f64) -> Option<&MouthCue> {
        let candidates = self.cues.partition_point(|c| c.start <= t);
        self.cues[..candidates].iter().find(|c| t < c.end)
    }

    pub fn viseme_at(&self, t: f64) -> Option<Viseme> {
        self.cue_at(t).map(|c| c.viseme)
    }
}
