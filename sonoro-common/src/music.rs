//! Music data model: musical parameters, note events and sequences
//!
//! `MusicalParameters` is what the semantic mapper produces and the generator
//! consumes. `MusicSequence` is the immutable output of generation; it is
//! shared via `Arc` between the transition manager and the audio sink.

use crate::vision::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Tempo difference treated as "completely different" when measuring parameter distance
const TEMPO_REFERENCE_SPAN_BPM: f32 = 80.0;

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

/// The twelve pitch classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    /// Semitones above C
    pub fn semitone(&self) -> u8 {
        *self as u8
    }

    pub fn from_semitone(semitone: u8) -> Self {
        const ALL: [PitchClass; 12] = [
            PitchClass::C,
            PitchClass::CSharp,
            PitchClass::D,
            PitchClass::DSharp,
            PitchClass::E,
            PitchClass::F,
            PitchClass::FSharp,
            PitchClass::G,
            PitchClass::GSharp,
            PitchClass::A,
            PitchClass::ASharp,
            PitchClass::B,
        ];
        ALL[(semitone % 12) as usize]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

/// Scale modes available to the mapper, ordered roughly from relaxed to tense
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Lydian,
    Major,
    Mixolydian,
    Dorian,
    Minor,
    Phrygian,
}

impl Mode {
    /// Scale degrees as semitone offsets from the tonic
    pub fn intervals(&self) -> [u8; 7] {
        match self {
            Mode::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Mode::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
            Mode::Phrygian => [0, 1, 3, 5, 7, 8, 10],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Lydian => "Lydian",
            Mode::Major => "Major",
            Mode::Mixolydian => "Mixolydian",
            Mode::Dorian => "Dorian",
            Mode::Minor => "Minor",
            Mode::Phrygian => "Phrygian",
        }
    }
}

/// Musical key: tonic and mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    pub tonic: PitchClass,
    pub mode: Mode,
}

impl Key {
    pub fn new(tonic: PitchClass, mode: Mode) -> Self {
        Self { tonic, mode }
    }

    /// MIDI pitch of the given scale degree (may be negative or above 7) near `base_octave`
    ///
    /// `base_octave` follows MIDI convention (octave 4 starts at note 60).
    pub fn degree_pitch(&self, degree: i32, base_octave: i32) -> u8 {
        let intervals = self.mode.intervals();
        let octave_shift = degree.div_euclid(7);
        let index = degree.rem_euclid(7) as usize;
        let pitch = (base_octave + 1 + octave_shift) * 12 + self.tonic.semitone() as i32 + intervals[index] as i32;
        pitch.clamp(0, 127) as u8
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic.name(), self.mode.name())
    }
}

/// Time signature (beats per bar / beat note value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature { numerator: 4, denominator: 4 };
    pub const WALTZ: TimeSignature = TimeSignature { numerator: 3, denominator: 4 };
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Supported music style tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MusicStyle {
    Ambient,
    Classical,
    Jazz,
    Electronic,
    Folk,
    Rock,
    World,
    Experimental,
}

impl MusicStyle {
    pub fn all() -> &'static [MusicStyle] {
        &[
            MusicStyle::Ambient,
            MusicStyle::Classical,
            MusicStyle::Jazz,
            MusicStyle::Electronic,
            MusicStyle::Folk,
            MusicStyle::Rock,
            MusicStyle::World,
            MusicStyle::Experimental,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MusicStyle::Ambient => "ambient",
            MusicStyle::Classical => "classical",
            MusicStyle::Jazz => "jazz",
            MusicStyle::Electronic => "electronic",
            MusicStyle::Folk => "folk",
            MusicStyle::Rock => "rock",
            MusicStyle::World => "world",
            MusicStyle::Experimental => "experimental",
        }
    }
}

impl fmt::Display for MusicStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instrument families the generator can voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentFamily {
    Piano,
    Strings,
    Brass,
    Woodwinds,
    Percussion,
    Synthesizer,
    Guitar,
    Bass,
}

impl InstrumentFamily {
    pub fn all() -> &'static [InstrumentFamily] {
        &[
            InstrumentFamily::Piano,
            InstrumentFamily::Strings,
            InstrumentFamily::Brass,
            InstrumentFamily::Woodwinds,
            InstrumentFamily::Percussion,
            InstrumentFamily::Synthesizer,
            InstrumentFamily::Guitar,
            InstrumentFamily::Bass,
        ]
    }
}

/// Complete musical parameter set driving generation
///
/// Exactly one instance is active at a time; a new instance supersedes the
/// previous one and triggers a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalParameters {
    pub tempo_bpm: f32,
    pub key: Key,
    pub time_signature: TimeSignature,
    pub style: MusicStyle,

    /// Instrument family → weight in [0, 1]
    pub instruments: BTreeMap<InstrumentFamily, f32>,

    // Emotional properties carried through from the semantic features
    pub energy: f32,
    pub complexity: f32,
    pub brightness: f32,
    pub tension: f32,

    /// Track whose features produced these parameters
    pub source_track: Option<TrackId>,
    pub source_label: Option<String>,
}

impl MusicalParameters {
    /// Weight of an instrument family (0.0 if absent)
    pub fn instrument_weight(&self, family: InstrumentFamily) -> f32 {
        self.instruments.get(&family).copied().unwrap_or(0.0)
    }

    /// Instrument families sorted by descending weight (ties in enum order)
    pub fn leading_instruments(&self) -> Vec<InstrumentFamily> {
        let mut families: Vec<(InstrumentFamily, f32)> = self.instruments.iter().map(|(f, w)| (*f, *w)).collect();
        families.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        families.into_iter().map(|(f, _)| f).collect()
    }

    /// Seconds per beat at this tempo
    pub fn beat_seconds(&self) -> f64 {
        60.0 / self.tempo_bpm.max(1.0) as f64
    }

    /// Aggregate distance to another parameter set, roughly in [0, 1]
    ///
    /// Blends normalised tempo difference, mean instrument weight difference
    /// and mean emotional-property difference. Discrete fields (key, mode,
    /// style) are not part of the distance.
    pub fn distance(&self, other: &MusicalParameters) -> f32 {
        let tempo = ((self.tempo_bpm - other.tempo_bpm).abs() / TEMPO_REFERENCE_SPAN_BPM).min(1.0);

        let families = InstrumentFamily::all();
        let instruments = families
            .iter()
            .map(|family| (self.instrument_weight(*family) - other.instrument_weight(*family)).abs())
            .sum::<f32>()
            / families.len() as f32;

        let attributes = ((self.energy - other.energy).abs()
            + (self.complexity - other.complexity).abs()
            + (self.brightness - other.brightness).abs()
            + (self.tension - other.tension).abs())
            / 4.0;

        0.4 * tempo + 0.3 * instruments + 0.3 * attributes
    }
}

impl fmt::Display for MusicalParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} at {:.0} BPM ({})",
            self.style, self.key, self.tempo_bpm, self.time_signature
        )
    }
}

/// A single note event inside a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicEvent {
    /// MIDI note number
    pub pitch: u8,
    /// MIDI velocity, 1..=127
    pub velocity: u8,
    /// Onset relative to sequence start
    pub start_offset: Duration,
    pub duration: Duration,
}

impl MusicEvent {
    pub fn new(pitch: u8, velocity: u8, start_offset: Duration, duration: Duration) -> Self {
        Self {
            pitch: pitch.min(127),
            velocity: velocity.clamp(1, 127),
            start_offset,
            duration,
        }
    }

    pub fn start_secs(&self) -> f64 {
        self.start_offset.as_secs_f64()
    }

    pub fn end_secs(&self) -> f64 {
        (self.start_offset + self.duration).as_secs_f64()
    }

    /// Equal-tempered frequency (A4 = 440 Hz)
    pub fn frequency_hz(&self) -> f64 {
        440.0 * 2f64.powf((self.pitch as f64 - 69.0) / 12.0)
    }
}

/// Where a sequence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceSource {
    /// Produced by the generative model
    Model,
    /// Pre-stored generic sequence used when the model failed or timed out
    Fallback,
}

/// Immutable, loopable event sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSequence {
    /// Process-unique identifier
    pub id: u64,
    pub style: MusicStyle,
    pub tempo_bpm: f32,
    pub beats_per_bar: u8,
    /// Loop length (at least as long as the last event end)
    pub length: Duration,
    /// Timbre brightness in [0, 1] used by the synthesizer
    pub brightness: f32,
    pub source: SequenceSource,
    /// Events sorted by onset
    events: Vec<MusicEvent>,
}

impl MusicSequence {
    pub fn new(
        style: MusicStyle,
        tempo_bpm: f32,
        beats_per_bar: u8,
        length: Duration,
        brightness: f32,
        source: SequenceSource,
        mut events: Vec<MusicEvent>,
    ) -> Self {
        events.sort_by(|a, b| a.start_offset.cmp(&b.start_offset).then(a.pitch.cmp(&b.pitch)));
        let last_end = events
            .iter()
            .map(|e| e.start_offset + e.duration)
            .max()
            .unwrap_or(Duration::ZERO);

        Self {
            id: NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
            style,
            tempo_bpm: tempo_bpm.max(1.0),
            beats_per_bar: beats_per_bar.max(1),
            length: length.max(last_end).max(Duration::from_millis(1)),
            brightness: brightness.clamp(0.0, 1.0),
            source,
            events,
        }
    }

    pub fn events(&self) -> &[MusicEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn beat_seconds(&self) -> f64 {
        60.0 / self.tempo_bpm as f64
    }

    pub fn length_secs(&self) -> f64 {
        self.length.as_secs_f64()
    }

    /// Copy of this sequence stretched to another tempo (new id)
    pub fn retimed(&self, tempo_bpm: f32) -> MusicSequence {
        let tempo_bpm = tempo_bpm.max(1.0);
        let factor = self.tempo_bpm as f64 / tempo_bpm as f64;
        let scale = |d: Duration| Duration::from_secs_f64(d.as_secs_f64() * factor);

        let events = self
            .events
            .iter()
            .map(|e| MusicEvent::new(e.pitch, e.velocity, scale(e.start_offset), scale(e.duration)))
            .collect();

        MusicSequence::new(
            self.style,
            tempo_bpm,
            self.beats_per_bar,
            scale(self.length),
            self.brightness,
            self.source,
            events,
        )
    }
}
