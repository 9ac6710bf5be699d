//! Semantic feature extraction
//!
//! Maps a tracked object's label plus scene context to a five-dimensional
//! feature vector (energy, warmth, complexity, brightness, tension), every
//! component in [0, 1].
//!
//! The base vector comes from a label table (built in, optionally extended
//! from a TOML file). Context then nudges it:
//! - lighting: brighter scenes raise brightness and cool warmth slightly
//! - relative size: objects filling more of the frame carry more energy
//! - dwell: the longer an object stays, the calmer the music settles
//!
//! Unknown labels map to [`SemanticFeatures::NEUTRAL`].

use crate::error::Result;
use crate::vision::tracker::TrackedObject;
use serde::{Deserialize, Serialize};
use sonoro_common::config::load_toml;
use sonoro_common::vision::TrackId;
use sonoro_common::Timestamp;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Maximum brightness shift from lighting
const LIGHTING_BRIGHTNESS_GAIN: f32 = 0.3;
/// Maximum warmth shift from lighting (dim scenes feel warmer)
const LIGHTING_WARMTH_GAIN: f32 = 0.1;
/// Relative size at which size has no influence
const NEUTRAL_RELATIVE_SIZE: f32 = 0.15;
const SIZE_ENERGY_GAIN: f32 = 0.2;
/// Time constant of the dwell calming effect
const DWELL_TIME_CONSTANT_SECS: f64 = 30.0;
const DWELL_TENSION_DROP: f32 = 0.1;
const DWELL_ENERGY_DROP: f32 = 0.05;

/// Continuous semantic description of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticFeatures {
    pub energy: f32,
    pub warmth: f32,
    pub complexity: f32,
    pub brightness: f32,
    pub tension: f32,
    pub source_track: Option<TrackId>,
    pub label: Option<String>,
}

fn unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

impl SemanticFeatures {
    /// Documented neutral vector for labels the table does not know
    pub const NEUTRAL: SemanticFeatures = SemanticFeatures {
        energy: 0.5,
        warmth: 0.5,
        complexity: 0.5,
        brightness: 0.5,
        tension: 0.5,
        source_track: None,
        label: None,
    };

    /// Build a vector, clamping every component into [0, 1] (NaN becomes 0.5)
    pub fn new(energy: f32, warmth: f32, complexity: f32, brightness: f32, tension: f32) -> Self {
        Self {
            energy: unit(energy),
            warmth: unit(warmth),
            complexity: unit(complexity),
            brightness: unit(brightness),
            tension: unit(tension),
            source_track: None,
            label: None,
        }
    }

    pub fn with_source(mut self, track: Option<TrackId>, label: Option<String>) -> Self {
        self.source_track = track;
        self.label = label;
        self
    }

    pub fn as_array(&self) -> [f32; 5] {
        [self.energy, self.warmth, self.complexity, self.brightness, self.tension]
    }

    /// Exponential smoothing step towards `target` (`alpha` = weight of target)
    ///
    /// The result takes the source of `target`.
    pub fn blend_towards(&self, target: &SemanticFeatures, alpha: f32) -> SemanticFeatures {
        let a = unit(alpha);
        let mix = |old: f32, new: f32| old + (new - old) * a;
        SemanticFeatures::new(
            mix(self.energy, target.energy),
            mix(self.warmth, target.warmth),
            mix(self.complexity, target.complexity),
            mix(self.brightness, target.brightness),
            mix(self.tension, target.tension),
        )
        .with_source(target.source_track, target.label.clone())
    }

    /// Largest per-component difference
    pub fn max_difference(&self, other: &SemanticFeatures) -> f32 {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

/// Scene context for one object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectContext {
    /// Mean scene luminance in [0, 1], if measured
    pub lighting: Option<f32>,
    /// Object box area over frame area
    pub relative_size: f32,
    /// Time the object has been in view
    pub dwell: Duration,
}

impl Default for ObjectContext {
    fn default() -> Self {
        Self {
            lighting: None,
            relative_size: NEUTRAL_RELATIVE_SIZE,
            dwell: Duration::ZERO,
        }
    }
}

impl ObjectContext {
    /// Derive the context of `track` inside a frame of `frame_area` pixels
    pub fn for_track(track: &TrackedObject, frame_area: f32, lighting: Option<f32>, now: Timestamp) -> Self {
        let relative_size = if frame_area > 0.0 {
            (track.bbox.area() / frame_area).clamp(0.0, 1.0)
        } else {
            NEUTRAL_RELATIVE_SIZE
        };
        Self {
            lighting,
            relative_size,
            dwell: track.dwell(now),
        }
    }
}

/// Base features for one label, as stored in a mappings file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelProfile {
    pub energy: f32,
    pub warmth: f32,
    pub complexity: f32,
    pub brightness: f32,
    pub tension: f32,
}

impl LabelProfile {
    const fn new(energy: f32, warmth: f32, complexity: f32, brightness: f32, tension: f32) -> Self {
        Self {
            energy,
            warmth,
            complexity,
            brightness,
            tension,
        }
    }

    fn features(&self) -> SemanticFeatures {
        SemanticFeatures::new(self.energy, self.warmth, self.complexity, self.brightness, self.tension)
    }
}

/// Custom mappings file layout
///
/// ```toml
/// [labels.fern]
/// energy = 0.2
/// warmth = 0.65
/// complexity = 0.25
/// brightness = 0.5
/// tension = 0.1
/// ```
#[derive(Debug, Deserialize)]
struct MappingsFile {
    #[serde(default)]
    labels: BTreeMap<String, LabelProfile>,
}

const BUILTIN_LABELS: &[(&str, LabelProfile)] = &[
    ("plant", LabelProfile::new(0.22, 0.6, 0.2, 0.5, 0.15)),
    ("book", LabelProfile::new(0.1, 0.6, 0.7, 0.45, 0.35)),
    ("cup", LabelProfile::new(0.5, 0.75, 0.7, 0.55, 0.4)),
    ("laptop", LabelProfile::new(0.95, 0.2, 0.6, 0.7, 0.5)),
    ("guitar", LabelProfile::new(0.42, 0.85, 0.4, 0.6, 0.2)),
    ("phone", LabelProfile::new(0.75, 0.25, 0.55, 0.7, 0.45)),
    ("bottle", LabelProfile::new(0.35, 0.4, 0.3, 0.65, 0.2)),
    ("clock", LabelProfile::new(0.5, 0.4, 0.6, 0.45, 0.6)),
    ("lamp", LabelProfile::new(0.25, 0.7, 0.2, 0.8, 0.1)),
    ("camera", LabelProfile::new(0.5, 0.35, 0.7, 0.6, 0.4)),
    ("person", LabelProfile::new(0.55, 0.7, 0.6, 0.6, 0.35)),
    ("cat", LabelProfile::new(0.3, 0.8, 0.3, 0.55, 0.2)),
    ("dog", LabelProfile::new(0.7, 0.8, 0.35, 0.65, 0.25)),
    ("chair", LabelProfile::new(0.2, 0.55, 0.2, 0.45, 0.15)),
    ("tv", LabelProfile::new(0.8, 0.3, 0.7, 0.75, 0.55)),
    ("car", LabelProfile::new(0.85, 0.45, 0.5, 0.55, 0.7)),
];

/// How a feature vector was derived
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureExplanation {
    pub label: String,
    /// False when the neutral vector was used
    pub known_label: bool,
    pub base: [f32; 5],
    pub lighting_adjustment: Option<f32>,
    pub size_adjustment: f32,
    pub dwell_adjustment: f32,
    pub result: [f32; 5],
}

/// Label + context → semantic features
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    table: BTreeMap<String, LabelProfile>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    /// Extractor with the built-in label table
    pub fn new() -> Self {
        let table = BUILTIN_LABELS
            .iter()
            .map(|(label, profile)| (label.to_string(), *profile))
            .collect();
        Self { table }
    }

    /// Merge label profiles from a TOML file over the current table
    ///
    /// Returns the number of labels added or replaced.
    pub fn load_custom_mappings(&mut self, path: &Path) -> Result<usize> {
        let file: MappingsFile = load_toml(path)?;
        let count = file.labels.len();
        for (label, profile) in file.labels {
            self.table.insert(label.to_lowercase(), profile);
        }
        info!("Loaded {} custom label mappings from {}", count, path.display());
        Ok(count)
    }

    pub fn insert(&mut self, label: &str, profile: LabelProfile) {
        self.table.insert(label.to_lowercase(), profile);
    }

    pub fn knows(&self, label: &str) -> bool {
        self.table.contains_key(&label.to_lowercase())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    /// Features of a tracked object in context
    pub fn extract(&self, track: &TrackedObject, context: &ObjectContext) -> SemanticFeatures {
        self.extract_label(&track.label, context)
            .with_source(Some(track.id), Some(track.label.clone()))
    }

    /// Features of a bare label in context
    pub fn extract_label(&self, label: &str, context: &ObjectContext) -> SemanticFeatures {
        self.explain(label, context).into_features(label)
    }

    /// Full derivation of the features of `label` in `context`
    pub fn explain(&self, label: &str, context: &ObjectContext) -> FeatureExplanation {
        let profile = self.table.get(&label.to_lowercase());
        let base = profile.map(LabelProfile::features).unwrap_or(SemanticFeatures::NEUTRAL);
        if profile.is_none() {
            debug!("Unknown label '{}', using neutral features", label);
        }

        let lighting_adjustment = context.lighting.map(|l| unit(l) - 0.5);
        let size_adjustment = SIZE_ENERGY_GAIN * (unit(context.relative_size) - NEUTRAL_RELATIVE_SIZE);
        let dwell_adjustment = (1.0 - (-context.dwell.as_secs_f64() / DWELL_TIME_CONSTANT_SECS).exp()) as f32;

        let light = lighting_adjustment.unwrap_or(0.0);
        let result = SemanticFeatures::new(
            base.energy + size_adjustment - DWELL_ENERGY_DROP * dwell_adjustment,
            base.warmth - LIGHTING_WARMTH_GAIN * light,
            base.complexity,
            base.brightness + LIGHTING_BRIGHTNESS_GAIN * light,
            base.tension - DWELL_TENSION_DROP * dwell_adjustment,
        );

        FeatureExplanation {
            label: label.to_string(),
            known_label: profile.is_some(),
            base: base.as_array(),
            lighting_adjustment,
            size_adjustment,
            dwell_adjustment,
            result: result.as_array(),
        }
    }
}

impl FeatureExplanation {
    fn into_features(self, label: &str) -> SemanticFeatures {
        let [energy, warmth, complexity, brightness, tension] = self.result;
        SemanticFeatures::new(energy, warmth, complexity, brightness, tension).with_source(None, Some(label.to_string()))
    }
}
