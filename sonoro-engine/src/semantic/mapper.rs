//! Musical parameter mapping
//!
//! [`ParameterMapper::map`] turns semantic features plus recent musical
//! history into a [`MappingDecision`]. It is a pure function: the same
//! (features, history, now) always gives the same decision. Applying the
//! decision to the history is a separate step ([`MusicalHistory::record`]) so
//! callers and tests control exactly when state moves.
//!
//! Flap prevention works in two layers:
//! 1. features of the same track are exponentially smoothed against the
//!    history's smoothed state
//! 2. a new parameter set is only emitted when its distance from the active
//!    set exceeds the hysteresis threshold
//!
//! Between smoothing and the strategy, [`MappingWeights`] scale how strongly
//! each feature pulls away from neutral. Listener feedback adjusts them.

use crate::config::MapperConfig;
use crate::semantic::features::SemanticFeatures;
use serde::{Deserialize, Serialize};
use sonoro_common::music::{
    InstrumentFamily, Key, Mode, MusicStyle, MusicalParameters, PitchClass, TimeSignature,
};
use sonoro_common::vision::TrackId;
use sonoro_common::Timestamp;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Slowest tempo produced by the default strategy (energy 0)
pub const MIN_TEMPO_BPM: f32 = 56.0;
/// Fastest tempo produced by the default strategy (energy 1)
pub const MAX_TEMPO_BPM: f32 = 128.0;

/// Feature → parameter function
///
/// Implementations must be deterministic. The mapper takes care of
/// smoothing, hysteresis and source bookkeeping.
pub trait MappingStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn map(&self, features: &SemanticFeatures) -> MusicalParameters;
}

// ========================================
// Default strategy
// ========================================

/// Style prototypes in feature space (energy, warmth, complexity, brightness, tension)
const STYLE_PROTOTYPES: &[(MusicStyle, [f32; 5])] = &[
    (MusicStyle::Ambient, [0.2, 0.6, 0.2, 0.5, 0.15]),
    (MusicStyle::Classical, [0.3, 0.6, 0.7, 0.45, 0.35]),
    (MusicStyle::Jazz, [0.55, 0.75, 0.75, 0.55, 0.45]),
    (MusicStyle::Electronic, [0.9, 0.2, 0.6, 0.7, 0.5]),
    (MusicStyle::Folk, [0.45, 0.85, 0.4, 0.6, 0.2]),
    (MusicStyle::Rock, [0.85, 0.5, 0.5, 0.6, 0.7]),
    (MusicStyle::World, [0.55, 0.7, 0.6, 0.65, 0.35]),
    (MusicStyle::Experimental, [0.5, 0.3, 0.9, 0.4, 0.8]),
];

/// Circle of fifths from F-flat side to sharp side, C in the middle
const CIRCLE_OF_FIFTHS: [PitchClass; 9] = [
    PitchClass::GSharp,
    PitchClass::DSharp,
    PitchClass::ASharp,
    PitchClass::F,
    PitchClass::C,
    PitchClass::G,
    PitchClass::D,
    PitchClass::A,
    PitchClass::E,
];

/// Built-in deterministic strategy
///
/// - tempo rises linearly with energy ([`MIN_TEMPO_BPM`]..=[`MAX_TEMPO_BPM`])
/// - tension picks the mode, from Lydian (relaxed and bright) to Phrygian
/// - brightness walks the circle of fifths for the tonic; minor-family modes
///   use the relative minor
/// - warmth moves weight from synthesizer towards acoustic families
/// - style is the nearest prototype in feature space
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMapping;

impl DefaultMapping {
    pub fn tempo_for(energy: f32) -> f32 {
        MIN_TEMPO_BPM + (MAX_TEMPO_BPM - MIN_TEMPO_BPM) * energy.clamp(0.0, 1.0)
    }

    pub fn mode_for(tension: f32, brightness: f32) -> Mode {
        if tension >= 0.7 {
            Mode::Phrygian
        } else if tension >= 0.55 {
            Mode::Minor
        } else if tension >= 0.45 {
            Mode::Dorian
        } else if tension < 0.25 && brightness >= 0.75 {
            Mode::Lydian
        } else if tension >= 0.35 {
            Mode::Mixolydian
        } else {
            Mode::Major
        }
    }

    pub fn key_for(tension: f32, brightness: f32) -> Key {
        let mode = Self::mode_for(tension, brightness);
        let centre = (CIRCLE_OF_FIFTHS.len() / 2) as f32;
        let index = (centre + ((brightness - 0.5) * 8.0).round()).clamp(0.0, (CIRCLE_OF_FIFTHS.len() - 1) as f32) as usize;
        let major_tonic = CIRCLE_OF_FIFTHS[index];
        let tonic = match mode {
            Mode::Minor | Mode::Phrygian | Mode::Dorian => PitchClass::from_semitone(major_tonic.semitone() + 9),
            _ => major_tonic,
        };
        Key::new(tonic, mode)
    }

    pub fn style_for(features: &SemanticFeatures) -> MusicStyle {
        let point = features.as_array();
        let mut best = (MusicStyle::Ambient, f32::INFINITY);
        for (style, prototype) in STYLE_PROTOTYPES {
            let distance: f32 = point.iter().zip(prototype.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
            if distance < best.1 {
                best = (*style, distance);
            }
        }
        best.0
    }

    pub fn instruments_for(features: &SemanticFeatures) -> BTreeMap<InstrumentFamily, f32> {
        let e = features.energy;
        let w = features.warmth;
        let c = features.complexity;
        let t = features.tension;

        let weights = [
            (InstrumentFamily::Piano, 0.4 + 0.3 * c - 0.2 * e),
            (InstrumentFamily::Strings, 0.2 + 0.6 * w * (1.0 - e)),
            (InstrumentFamily::Brass, 0.6 * e * w),
            (InstrumentFamily::Woodwinds, 0.5 * w * (1.0 - t)),
            (InstrumentFamily::Percussion, 0.1 + 0.8 * e),
            (InstrumentFamily::Synthesizer, 0.7 * (1.0 - w) * (0.3 + 0.7 * e)),
            (InstrumentFamily::Guitar, 0.6 * w * (0.5 + 0.5 * c)),
            (InstrumentFamily::Bass, 0.2 + 0.5 * e),
        ];
        weights.into_iter().map(|(family, weight)| (family, weight.clamp(0.0, 1.0))).collect()
    }
}

impl MappingStrategy for DefaultMapping {
    fn name(&self) -> &str {
        "default"
    }

    fn map(&self, features: &SemanticFeatures) -> MusicalParameters {
        let style = Self::style_for(features);
        let time_signature = match style {
            MusicStyle::Folk | MusicStyle::Classical if features.energy < 0.5 => TimeSignature::WALTZ,
            _ => TimeSignature::COMMON,
        };

        MusicalParameters {
            tempo_bpm: Self::tempo_for(features.energy),
            key: Self::key_for(features.tension, features.brightness),
            time_signature,
            style,
            instruments: Self::instruments_for(features),
            energy: features.energy,
            complexity: features.complexity,
            brightness: features.brightness,
            tension: features.tension,
            source_track: features.source_track,
            source_label: features.label.clone(),
        }
    }
}

// ========================================
// Feature weights
// ========================================

/// Upper bound on a single feature weight
pub const MAX_FEATURE_WEIGHT: f32 = 2.0;

/// Weight change per unit of feedback
const FEEDBACK_RATE: f32 = 0.25;

/// Per-feature response gains
///
/// A weight of 1.0 passes the feature through, 0.0 pins it to neutral (0.5)
/// and values above 1.0 exaggerate its distance from neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingWeights {
    pub energy: f32,
    pub warmth: f32,
    pub complexity: f32,
    pub brightness: f32,
    pub tension: f32,
}

impl Default for MappingWeights {
    fn default() -> Self {
        Self {
            energy: 1.0,
            warmth: 1.0,
            complexity: 1.0,
            brightness: 1.0,
            tension: 1.0,
        }
    }
}

impl MappingWeights {
    pub fn is_valid(&self) -> bool {
        self.as_array()
            .iter()
            .all(|w| w.is_finite() && (0.0..=MAX_FEATURE_WEIGHT).contains(w))
    }

    fn as_array(&self) -> [f32; 5] {
        [self.energy, self.warmth, self.complexity, self.brightness, self.tension]
    }

    fn slot_mut(&mut self, feature: &str) -> Option<&mut f32> {
        match feature {
            "energy" => Some(&mut self.energy),
            "warmth" => Some(&mut self.warmth),
            "complexity" => Some(&mut self.complexity),
            "brightness" => Some(&mut self.brightness),
            "tension" => Some(&mut self.tension),
            _ => None,
        }
    }

    /// Features with every component scaled around neutral
    pub fn apply(&self, features: &SemanticFeatures) -> SemanticFeatures {
        let scale = |value: f32, weight: f32| {
            if weight == 1.0 {
                value
            } else {
                (0.5 + (value - 0.5) * weight).clamp(0.0, 1.0)
            }
        };
        SemanticFeatures {
            energy: scale(features.energy, self.energy),
            warmth: scale(features.warmth, self.warmth),
            complexity: scale(features.complexity, self.complexity),
            brightness: scale(features.brightness, self.brightness),
            tension: scale(features.tension, self.tension),
            source_track: features.source_track,
            label: features.label.clone(),
        }
    }

    /// Nudge weights by listener feedback
    ///
    /// Keys are feature names, values in [-1, 1]: positive asks for a stronger
    /// response to that feature, negative for a weaker one. Returns the keys
    /// that name no feature.
    pub fn apply_feedback(&mut self, feedback: &BTreeMap<String, f32>) -> Vec<String> {
        let mut unknown = Vec::new();
        for (feature, score) in feedback {
            let Some(weight) = self.slot_mut(&feature.to_lowercase()) else {
                unknown.push(feature.clone());
                continue;
            };
            if !score.is_finite() {
                continue;
            }
            *weight = (*weight + score.clamp(-1.0, 1.0) * FEEDBACK_RATE).clamp(0.0, MAX_FEATURE_WEIGHT);
        }
        unknown
    }
}

// ========================================
// History and decisions
// ========================================

/// Smoothed feature state of the track currently driving the music
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedFeatures {
    pub track: Option<TrackId>,
    pub features: SemanticFeatures,
    pub updated_at: Timestamp,
}

/// One emitted parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub parameters: MusicalParameters,
    pub emitted_at: Timestamp,
}

/// Recent musical history, owned by the caller of the mapper
#[derive(Debug, Clone, PartialEq)]
pub struct MusicalHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    smoothed: Option<SmoothedFeatures>,
}

impl MusicalHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            smoothed: None,
        }
    }

    /// Currently active parameters (the most recently emitted set)
    pub fn active(&self) -> Option<&MusicalParameters> {
        self.entries.back().map(|entry| &entry.parameters)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn smoothed(&self) -> Option<&SmoothedFeatures> {
        self.smoothed.as_ref()
    }

    /// Apply a decision made by [`ParameterMapper::map`] at `now`
    pub fn record(&mut self, decision: &MappingDecision, now: Timestamp) {
        self.smoothed = Some(SmoothedFeatures {
            track: decision.smoothed().source_track,
            features: decision.smoothed().clone(),
            updated_at: now,
        });

        if let MappingDecision::Changed { parameters, .. } = decision {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(HistoryEntry {
                parameters: parameters.clone(),
                emitted_at: now,
            });
        }
    }
}

/// Result of one mapping step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MappingDecision {
    /// A new active parameter set
    Changed {
        parameters: MusicalParameters,
        /// Distance from the previously active set (None if there was none)
        distance: Option<f32>,
        smoothed: SemanticFeatures,
    },
    /// Candidate too close to the active set
    Unchanged {
        candidate: MusicalParameters,
        distance: f32,
        smoothed: SemanticFeatures,
    },
}

impl MappingDecision {
    pub fn is_changed(&self) -> bool {
        matches!(self, MappingDecision::Changed { .. })
    }

    pub fn smoothed(&self) -> &SemanticFeatures {
        match self {
            MappingDecision::Changed { smoothed, .. } | MappingDecision::Unchanged { smoothed, .. } => smoothed,
        }
    }

    /// The newly active parameters, if this decision changes them
    pub fn changed_parameters(&self) -> Option<&MusicalParameters> {
        match self {
            MappingDecision::Changed { parameters, .. } => Some(parameters),
            MappingDecision::Unchanged { .. } => None,
        }
    }
}

/// Smoothing + hysteresis around a [`MappingStrategy`]
#[derive(Clone)]
pub struct ParameterMapper {
    strategy: Arc<dyn MappingStrategy>,
    weights: MappingWeights,
    smoothing_alpha: f32,
    hysteresis: f32,
    smoothing_reset: Duration,
}

impl ParameterMapper {
    pub fn new(strategy: Arc<dyn MappingStrategy>, config: &MapperConfig) -> Self {
        Self {
            strategy,
            weights: config.weights,
            smoothing_alpha: config.smoothing_alpha.clamp(0.01, 1.0),
            hysteresis: config.hysteresis_threshold.max(0.0),
            smoothing_reset: config.smoothing_reset(),
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn hysteresis(&self) -> f32 {
        self.hysteresis
    }

    pub fn weights(&self) -> MappingWeights {
        self.weights
    }

    pub fn set_weights(&mut self, weights: MappingWeights) {
        if !weights.is_valid() {
            warn!("Ignoring out-of-range mapping weights {:?}", weights);
            return;
        }
        debug!("Mapping weights now {:?}", weights);
        self.weights = weights;
    }

    /// Decide whether `features` warrant a new active parameter set
    ///
    /// Smoothing only applies when the history's smoothed state belongs to the
    /// same track and is fresher than the reset interval; otherwise the raw
    /// features are used.
    pub fn map(&self, features: &SemanticFeatures, history: &MusicalHistory, now: Timestamp) -> MappingDecision {
        let smoothed = match history.smoothed() {
            Some(previous)
                if previous.track == features.source_track
                    && now.saturating_since(previous.updated_at) <= self.smoothing_reset =>
            {
                previous.features.blend_towards(features, self.smoothing_alpha)
            }
            _ => features.clone(),
        };

        let mut candidate = self.strategy.map(&self.weights.apply(&smoothed));
        candidate.source_track = features.source_track;
        candidate.source_label = features.label.clone();

        match history.active() {
            None => MappingDecision::Changed {
                parameters: candidate,
                distance: None,
                smoothed,
            },
            Some(active) => {
                let distance = candidate.distance(active);
                if distance > self.hysteresis {
                    MappingDecision::Changed {
                        parameters: candidate,
                        distance: Some(distance),
                        smoothed,
                    }
                } else {
                    MappingDecision::Unchanged {
                        candidate,
                        distance,
                        smoothed,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::features::{FeatureExtractor, ObjectContext};

    fn mapper() -> ParameterMapper {
        ParameterMapper::new(Arc::new(DefaultMapping), &MapperConfig::default())
    }

    fn features(label: &str, track: u64) -> SemanticFeatures {
        FeatureExtractor::new()
            .extract_label(label, &ObjectContext::default())
            .with_source(Some(TrackId(track)), Some(label.to_string()))
    }

    #[test]
    fn test_builtin_labels_reach_expected_styles() {
        let extractor = FeatureExtractor::new();
        let expected = [
            ("plant", MusicStyle::Ambient),
            ("book", MusicStyle::Classical),
            ("cup", MusicStyle::Jazz),
            ("laptop", MusicStyle::Electronic),
            ("guitar", MusicStyle::Folk),
            ("car", MusicStyle::Rock),
        ];
        for (label, style) in expected {
            let f = extractor.extract_label(label, &ObjectContext::default());
            assert_eq!(DefaultMapping.map(&f).style, style, "label {}", label);
        }
    }

    #[test]
    fn test_plant_parameters() {
        let params = DefaultMapping.map(&features("plant", 1));
        assert_eq!(params.style, MusicStyle::Ambient);
        assert_eq!(params.key, Key::new(PitchClass::C, Mode::Major));
        assert!((params.tempo_bpm - 71.84).abs() < 0.5);
        assert!(params.instrument_weight(InstrumentFamily::Strings) > params.instrument_weight(InstrumentFamily::Synthesizer));
    }

    #[test]
    fn test_tempo_monotonic_in_energy() {
        let mut previous = 0.0;
        for step in 0..=20 {
            let energy = step as f32 / 20.0;
            let tempo = DefaultMapping.map(&SemanticFeatures::new(energy, 0.5, 0.5, 0.5, 0.5)).tempo_bpm;
            assert!(tempo > previous);
            previous = tempo;
        }
        assert_eq!(previous, MAX_TEMPO_BPM);
    }

    #[test]
    fn test_tension_darkens_mode() {
        assert_eq!(DefaultMapping::mode_for(0.1, 0.9), Mode::Lydian);
        assert_eq!(DefaultMapping::mode_for(0.1, 0.5), Mode::Major);
        assert_eq!(DefaultMapping::mode_for(0.6, 0.5), Mode::Minor);
        assert_eq!(DefaultMapping::mode_for(0.9, 0.5), Mode::Phrygian);
        assert_eq!(DefaultMapping::key_for(0.6, 0.5), Key::new(PitchClass::A, Mode::Minor));
    }

    #[test]
    fn test_warmth_shifts_timbre() {
        let warm = DefaultMapping::instruments_for(&SemanticFeatures::new(0.5, 0.9, 0.5, 0.5, 0.5));
        let cold = DefaultMapping::instruments_for(&SemanticFeatures::new(0.5, 0.1, 0.5, 0.5, 0.5));
        assert!(warm[&InstrumentFamily::Guitar] > cold[&InstrumentFamily::Guitar]);
        assert!(warm[&InstrumentFamily::Synthesizer] < cold[&InstrumentFamily::Synthesizer]);
        assert!(warm.values().chain(cold.values()).all(|w| (0.0..=1.0).contains(w)));
    }

    #[test]
    fn test_first_mapping_always_changes() {
        let decision = mapper().map(&features("plant", 1), &MusicalHistory::new(4), Timestamp::ZERO);
        assert!(matches!(decision, MappingDecision::Changed { distance: None, .. }));
    }

    #[test]
    fn test_map_is_pure() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(4);
        let first = mapper.map(&features("cup", 1), &history, Timestamp::from_millis(100));
        history.record(&first, Timestamp::from_millis(100));

        let input = features("laptop", 2);
        let a = mapper.map(&input, &history, Timestamp::from_millis(500));
        let b = mapper.map(&input, &history.clone(), Timestamp::from_millis(500));
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_perturbations_do_not_flap() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(4);
        let base = features("cup", 1);
        let first = mapper.map(&base, &history, Timestamp::ZERO);
        history.record(&first, Timestamp::ZERO);

        for step in 1..200u64 {
            let wobble = if step % 2 == 0 { 0.04 } else { -0.04 };
            let noisy = SemanticFeatures::new(
                base.energy + wobble,
                base.warmth - wobble,
                base.complexity + wobble,
                base.brightness,
                base.tension + wobble,
            )
            .with_source(base.source_track, base.label.clone());
            let now = Timestamp::from_millis(step * 66);
            let decision = mapper.map(&noisy, &history, now);
            assert!(!decision.is_changed(), "flapped at step {}", step);
            history.record(&decision, now);
        }
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_new_object_changes_parameters() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(4);
        let first = mapper.map(&features("plant", 1), &history, Timestamp::ZERO);
        history.record(&first, Timestamp::ZERO);

        let decision = mapper.map(&features("laptop", 2), &history, Timestamp::from_millis(66));
        let parameters = decision.changed_parameters().unwrap();
        assert_eq!(parameters.style, MusicStyle::Electronic);
        assert_eq!(parameters.source_track, Some(TrackId(2)));
    }

    #[test]
    fn test_same_track_is_smoothed() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(4);
        let first = mapper.map(&features("plant", 1), &history, Timestamp::ZERO);
        history.record(&first, Timestamp::ZERO);

        // Same track suddenly reports laptop-like features: one step only moves 30% of the way
        let jump = features("laptop", 1);
        let decision = mapper.map(&jump, &history, Timestamp::from_millis(66));
        let smoothed = decision.smoothed();
        assert!(smoothed.energy < jump.energy);
        assert!(smoothed.energy > features("plant", 1).energy);
    }

    #[test]
    fn test_stale_smoothing_resets() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(4);
        let first = mapper.map(&features("plant", 1), &history, Timestamp::ZERO);
        history.record(&first, Timestamp::ZERO);

        let jump = features("laptop", 1);
        let decision = mapper.map(&jump, &history, Timestamp::from_millis(60_000));
        assert_eq!(decision.smoothed().energy, jump.energy);
    }

    #[test]
    fn test_feedback_adjusts_weights_and_mapping() {
        let mut weights = MappingWeights::default();
        let feedback: BTreeMap<String, f32> = [("energy".to_string(), -1.0), ("Tension".to_string(), 0.5), ("mood".to_string(), 1.0)]
            .into_iter()
            .collect();
        let unknown = weights.apply_feedback(&feedback);
        assert_eq!(unknown, vec!["mood".to_string()]);
        assert_eq!(weights.energy, 0.75);
        assert_eq!(weights.tension, 1.125);
        assert_eq!(weights.warmth, 1.0);

        // feedback saturates at the bounds
        for _ in 0..10 {
            weights.apply_feedback(&feedback);
        }
        assert_eq!(weights.energy, 0.0);
        assert_eq!(weights.tension, MAX_FEATURE_WEIGHT);
        assert!(weights.is_valid());

        // with energy pinned to neutral, a frantic object maps to mid tempo
        let mut mapper = mapper();
        mapper.set_weights(weights);
        let frantic = SemanticFeatures::new(0.95, 0.5, 0.5, 0.5, 0.5);
        let decision = mapper.map(&frantic, &MusicalHistory::new(4), Timestamp::ZERO);
        let tempo = decision.changed_parameters().unwrap().tempo_bpm;
        assert!((tempo - DefaultMapping::tempo_for(0.5)).abs() < 1e-3);
        // smoothing state keeps the unweighted features
        assert_eq!(decision.smoothed().energy, 0.95);
    }

    #[test]
    fn test_neutral_weights_change_nothing_and_invalid_rejected() {
        let f = features("cup", 1);
        assert_eq!(MappingWeights::default().apply(&f), f);

        let mut mapper = mapper();
        mapper.set_weights(MappingWeights {
            warmth: -1.0,
            ..MappingWeights::default()
        });
        assert_eq!(mapper.weights(), MappingWeights::default());
        assert_eq!(mapper.strategy_name(), "default");
    }

    #[test]
    fn test_history_is_bounded() {
        let mapper = mapper();
        let mut history = MusicalHistory::new(2);
        for (i, label) in ["plant", "laptop", "book", "car"].iter().enumerate() {
            let now = Timestamp::from_millis(i as u64 * 1000);
            let decision = mapper.map(&features(label, i as u64 + 1), &history, now);
            assert!(decision.is_changed());
            history.record(&decision, now);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.active().unwrap().source_label.as_deref(), Some("car"));
    }
}
