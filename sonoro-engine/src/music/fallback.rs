//! Pre-stored fallback sequences
//!
//! One short pattern per style, stored as scale degrees on a beat grid. When
//! the generative model fails or misses its deadline the pattern for the
//! requested style is rendered in the requested key and tempo, so the music
//! degrades to something generic but never goes silent.

use sonoro_common::music::{MusicEvent, MusicSequence, MusicStyle, MusicalParameters, SequenceSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One note of a stored pattern
#[derive(Debug, Clone, Copy)]
struct Step {
    degree: i32,
    octave: i32,
    start_beat: f32,
    beats: f32,
    velocity: u8,
}

const fn step(degree: i32, octave: i32, start_beat: f32, beats: f32, velocity: u8) -> Step {
    Step {
        degree,
        octave,
        start_beat,
        beats,
        velocity,
    }
}

/// Stored pattern for one style
#[derive(Debug, Clone)]
pub struct FallbackPattern {
    pub style: MusicStyle,
    pub beats_per_bar: u8,
    pub bars: u32,
    steps: Vec<Step>,
}

impl FallbackPattern {
    fn total_beats(&self) -> f32 {
        self.bars as f32 * self.beats_per_bar as f32
    }

    /// Render in the key and tempo of `params`, bounded by `max_length`
    pub fn render(&self, params: &MusicalParameters, max_length: Duration) -> MusicSequence {
        let beat = params.beat_seconds();
        let max_secs = max_length.as_secs_f64();
        let events = self
            .steps
            .iter()
            .filter(|s| (s.start_beat + s.beats) as f64 * beat <= max_secs)
            .map(|s| {
                MusicEvent::new(
                    params.key.degree_pitch(s.degree, s.octave),
                    s.velocity,
                    Duration::from_secs_f64(s.start_beat as f64 * beat),
                    Duration::from_secs_f64(s.beats as f64 * beat),
                )
            })
            .collect();
        let length = Duration::from_secs_f64((self.total_beats() as f64 * beat).min(max_secs));

        MusicSequence::new(
            self.style,
            params.tempo_bpm,
            self.beats_per_bar,
            length,
            params.brightness,
            SequenceSource::Fallback,
            events,
        )
    }
}

fn pattern(style: MusicStyle) -> FallbackPattern {
    // Two bars of 4/4: a bass root, a sustained chord and a short motif.
    let (motif, velocity): (&[(i32, f32, f32)], u8) = match style {
        MusicStyle::Ambient => (&[(4, 0.0, 4.0), (2, 4.0, 4.0)], 55),
        MusicStyle::Classical => (&[(0, 0.0, 1.0), (2, 1.0, 1.0), (4, 2.0, 1.0), (7, 3.0, 1.0), (5, 4.0, 2.0), (4, 6.0, 2.0)], 70),
        MusicStyle::Jazz => (&[(2, 0.0, 1.5), (4, 1.5, 0.5), (6, 2.0, 1.0), (8, 3.0, 1.0), (7, 4.5, 1.5), (5, 6.0, 2.0)], 75),
        MusicStyle::Electronic => (&[(0, 0.0, 0.5), (4, 0.5, 0.5), (7, 1.0, 0.5), (4, 1.5, 0.5), (0, 2.0, 0.5), (4, 2.5, 0.5), (7, 3.0, 0.5), (9, 3.5, 0.5)], 90),
        MusicStyle::Folk => (&[(0, 0.0, 1.0), (1, 1.0, 1.0), (2, 2.0, 2.0), (4, 4.0, 1.0), (2, 5.0, 1.0), (0, 6.0, 2.0)], 70),
        MusicStyle::Rock => (&[(0, 0.0, 0.5), (0, 0.5, 0.5), (3, 1.0, 1.0), (4, 2.0, 1.0), (0, 4.0, 0.5), (0, 4.5, 0.5), (6, 5.0, 1.0), (4, 6.0, 2.0)], 100),
        MusicStyle::World => (&[(0, 0.0, 0.75), (2, 0.75, 0.75), (4, 1.5, 0.5), (5, 2.0, 1.0), (4, 3.0, 1.0), (2, 4.0, 2.0), (0, 6.0, 2.0)], 75),
        MusicStyle::Experimental => (&[(0, 0.0, 0.5), (6, 1.5, 0.5), (3, 2.5, 1.5), (10, 4.0, 0.5), (1, 5.0, 2.0)], 65),
    };

    let mut steps = vec![
        step(0, 2, 0.0, 4.0, velocity.saturating_sub(10)),
        step(3, 2, 4.0, 2.0, velocity.saturating_sub(10)),
        step(4, 2, 6.0, 2.0, velocity.saturating_sub(10)),
    ];
    for degree in [0, 2, 4] {
        steps.push(step(degree, 4, 0.0, 8.0, velocity.saturating_sub(25)));
    }
    steps.extend(motif.iter().map(|(degree, start, beats)| step(*degree, 5, *start, *beats, velocity)));

    FallbackPattern {
        style,
        beats_per_bar: 4,
        bars: 2,
        steps,
    }
}

/// Fallback patterns for every style
#[derive(Debug, Clone)]
pub struct FallbackLibrary {
    patterns: BTreeMap<MusicStyle, FallbackPattern>,
}

impl Default for FallbackLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackLibrary {
    pub fn new() -> Self {
        let patterns = MusicStyle::all().iter().map(|style| (*style, pattern(*style))).collect();
        Self { patterns }
    }

    pub fn pattern(&self, style: MusicStyle) -> Option<&FallbackPattern> {
        self.patterns.get(&style)
    }

    /// Fallback sequence for the style, key and tempo of `params`
    pub fn sequence_for(&self, params: &MusicalParameters, max_length: Duration) -> Arc<MusicSequence> {
        let pattern = self
            .patterns
            .get(&params.style)
            .cloned()
            .unwrap_or_else(|| pattern(params.style));
        Arc::new(pattern.render(params, max_length))
    }
}
