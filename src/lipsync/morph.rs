//! Viseme to morph-target mapping and the frames it produces.

use crate::error::{RehearseError, Result};
use crate::lipsync::cues::Viseme;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn default_weight() -> f32 {
    1.0
}

/// Morph target driven by one viseme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphTarget {
    pub morph: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl MorphTarget {
    pub fn new(morph: &str, weight: f32) -> Self {
        Self {
            morph: morph.to_string(),
            weight,
        }
    }
}

/// Blend weights for one render tick.
///
/// Holds every morph the table knows about, so a frame always supersedes
/// the previous one completely.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisemeFrame {
    pub weights: BTreeMap<String, f32>,
}

impl VisemeFrame {
    pub fn weight(&self, morph: &str) -> f32 {
        self.weights.get(morph).copied().unwrap_or(0.0)
    }

    /// Whether every weight is zero.
    pub fn is_rest(&self) -> bool {
        self.weights.values().all(|&w| w == 0.0)
    }

    /// The strongest morph in this frame, if any weight is non-zero.
    pub fn dominant(&self) -> Option<(&str, f32)> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, w)| (name.as_str(), *w))
    }
}

/// Per-rig mapping from visemes to morph targets.
///
/// Visemes without an entry drive no morph.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTable {
    targets: BTreeMap<Viseme, MorphTarget>,
    names: BTreeSet<String>,
}

impl Default for MorphTable {
    /// Ready Player Me / Oculus viseme morphs for the Rhubarb shapes.
    fn default() -> Self {
        Self::new([
            (Viseme::A, MorphTarget::new("viseme_PP", 1.0)),
            (Viseme::B, MorphTarget::new("viseme_kk", 1.0)),
            (Viseme::C, MorphTarget::new("viseme_I", 1.0)),
            (Viseme::D, MorphTarget::new("viseme_AA", 1.0)),
            (Viseme::E, MorphTarget::new("viseme_O", 1.0)),
            (Viseme::F, MorphTarget::new("viseme_U", 1.0)),
            (Viseme::G, MorphTarget::new("viseme_FF", 1.0)),
            (Viseme::H, MorphTarget::new("viseme_TH", 1.0)),
            (Viseme::X, MorphTarget::new("viseme_sil", 1.0)),
        ])
    }
}

impl MorphTable {
    pub fn new(entries: impl IntoIterator<Item = (Viseme, MorphTarget)>) -> Self {
        let targets: BTreeMap<Viseme, MorphTarget> = entries.into_iter().collect();
        let names = targets.values().map(|t| t.morph.clone()).collect();
        Self { targets, names }
    }

    /// Build from the `[lipsync.morphs]` config table.
    ///
    /// # Errors
    /// `ConfigInvalidValue` for an unknown viseme symbol, an empty morph name,
    /// or a weight outside `0.0..=1.0`.
    pub fn from_config(morphs: &BTreeMap<String, MorphTarget>) -> Result<Self> {
        let mut entries = Vec::with_capacity(morphs.len());
        for (symbol, target) in morphs {
            let key = format!("lipsync.morphs.{}", symbol);
            let viseme: Viseme = symbol
                .parse()
                .map_err(|_| RehearseError::ConfigInvalidValue {
                    key: key.clone(),
                    message: "expected one of A-H or X".to_string(),
                })?;
            if target.morph.trim().is_empty() {
                return Err(RehearseError::ConfigInvalidValue {
                    key,
                    message: "morph name is empty".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&target.weight) {
                return Err(RehearseError::ConfigInvalidValue {
                    key,
                    message: format!("weight {} outside 0.0..=1.0", target.weight),
                });
            }
            entries.push((viseme, target.clone()));
        }
        Ok(Self::new(entries))
    }

    /// Inverse of [`MorphTable::from_config`].
    pub fn to_config(&self) -> BTreeMap<String, MorphTarget> {
        self.targets
            .iter()
            .map(|(v, t)| (v.symbol().to_string(), t.clone()))
            .collect()
    }

    pub fn target(&self, viseme: Viseme) -> Option<&MorphTarget> {
        self.targets.get(&viseme)
    }

    /// Every distinct morph name a frame from this table carries.
    pub fn morph_names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Frame with every morph at zero.
    pub fn rest_frame(&self) -> VisemeFrame {
        VisemeFrame {
            weights: self.names.iter().map(|n| (n.clone(), 0.0)).collect(),
        }
    }

    /// Absolute frame for `viseme`; `None` gives the rest frame.
    pub fn frame(&self, viseme: Option<Viseme>) -> VisemeFrame {
        let mut frame = self.rest_frame();
        if let Some(target) = viseme.and_then(|v| self.targets.get(&v)) {
            frame.weights.insert(target.morph.clone(), target.weight);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_maps_all_nine_visemes() {
        let table = MorphTable::default();
        for viseme in Viseme::ALL {
            assert!(table.target(viseme).is_some(), "{} unmapped", viseme);
        }
        assert_eq!(table.morph_names().len(), 9);
        assert_eq!(table.target(Viseme::X).unwrap().morph, "viseme_sil");
    }

    #[test]
    fn frame_sets_exactly_one_morph() {
        let table = MorphTable::default();
        let frame = table.frame(Some(Viseme::D));
        assert_eq!(frame.weights.len(), 9);
        assert_eq!(frame.weight("viseme_AA"), 1.0);
        assert_eq!(frame.dominant(), Some(("viseme_AA", 1.0)));
        assert_eq!(frame.weights.values().filter(|&&w| w > 0.0).count(), 1);
    }

    #[test]
    fn no_viseme_gives_rest_frame() {
        let table = MorphTable::default();
        let frame = table.frame(None);
        assert_eq!(frame.weights.len(), 9);
        assert!(frame.is_rest());
        assert_eq!(frame.dominant(), None);
    }

    #[test]
    fn config_round_trip_preserves_table() {
        let table = MorphTable::default();
        let rebuilt = MorphTable::from_config(&table.to_config()).unwrap();
        assert_eq!(rebuilt, table);
    }

    #[test]
    fn partial_rig_leaves_other_visemes_unmapped() {
        let mut morphs = BTreeMap::new();
        morphs.insert("A".to_string(), MorphTarget::new("mouthClose", 0.8));
        let table = MorphTable::from_config(&morphs).unwrap();

        assert!(table.frame(Some(Viseme::B)).is_rest());
        assert_eq!(table.frame(Some(Viseme::A)).weight("mouthClose"), 0.8);
    }

    #[test]
    fn shared_morph_names_are_counted_once() {
        let table = MorphTable::new([
            (Viseme::A, MorphTarget::new("jawOpen", 0.2)),
            (Viseme::D, MorphTarget::new("jawOpen", 0.9)),
        ]);
        assert_eq!(table.morph_names().len(), 1);
        assert_eq!(table.frame(Some(Viseme::D)).weight("jawOpen"), 0.9);
    }

    #[test]
    fn rejects_bad_config_entries() {
        let mut morphs = BTreeMap::new();
        morphs.insert("Q".to_string(), MorphTarget::new("viseme_Q", 1.0));
        assert!(MorphTable::from_config(&morphs).is_err());

        let mut morphs = BTreeMap::new();
        morphs.insert("A".to_string(), MorphTarget::new("viseme_PP", 1.5));
        let err = MorphTable::from_config(&morphs).unwrap_err();
        assert!(matches!(err, RehearseError::ConfigInvalidValue { key, .. } if key == "lipsync.morphs.A"));

        let mut morphs = BTreeMap::new();
        morphs.insert("B".to_string(), MorphTarget::new(" ", 1.0));
        assert!(MorphTable::from_config(&morphs).is_err());
    }

    #[test]
    fn weight_defaults_to_one_when_omitted() {
        let target: MorphTarget = toml::from_str(r#"morph = "viseme_O""#).unwrap();
        assert_eq!(target.weight, 1.0);
    }
}
