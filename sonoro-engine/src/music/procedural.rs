//! Built-in procedural sequence model
//!
//! Deterministic stand-in for an external generative model: the same request
//! (parameters + seed) always yields the same events. Each bar gets a bass
//! line, a sustained chord pad and a melodic random walk over the scale of the
//! requested key, with note density following energy and step size following
//! complexity.

use crate::music::generator::{GenerationRequest, SequenceModel};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sonoro_common::music::{Key, MusicEvent, MusicStyle};
use std::time::Duration;

const MELODY_OCTAVE: i32 = 5;
const PAD_OCTAVE: i32 = 4;
const BASS_OCTAVE: i32 = 2;

/// Chord roots (scale degrees) per style
fn progressions(style: MusicStyle) -> &'static [[i32; 4]] {
    match style {
        MusicStyle::Ambient => &[[0, 3, 0, 4], [0, 5, 3, 0]],
        MusicStyle::Classical => &[[0, 3, 4, 0], [0, 5, 1, 4]],
        MusicStyle::Jazz => &[[1, 4, 0, 0], [0, 5, 1, 4]],
        MusicStyle::Electronic => &[[0, 5, 3, 4], [5, 3, 0, 4]],
        MusicStyle::Folk => &[[0, 3, 4, 0], [0, 4, 5, 3]],
        MusicStyle::Rock => &[[0, 6, 3, 0], [0, 3, 4, 3]],
        MusicStyle::World => &[[0, 1, 0, 6], [0, 3, 1, 0]],
        MusicStyle::Experimental => &[[0, 1, 5, 2], [0, 6, 2, 5]],
    }
}

/// Deterministic procedural generator
#[derive(Debug, Clone, Default)]
pub struct ProceduralModel {
    latency: Option<Duration>,
}

impl ProceduralModel {
    pub fn new() -> Self {
        Self { latency: None }
    }

    /// Simulate inference time (demo runner)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Synchronous generation used by the async trait implementation
    pub fn compose(request: &GenerationRequest) -> Vec<MusicEvent> {
        let params = &request.parameters;
        let key = params.key;
        let mut rng = StdRng::seed_from_u64(request.seed);

        let beat = params.beat_seconds();
        let beats_per_bar = params.time_signature.numerator.max(1) as f64;
        let length = request.length.as_secs_f64();
        let bar = beat * beats_per_bar;
        let bars = (length / bar).floor().max(0.0) as usize;

        let energy = params.energy.clamp(0.0, 1.0) as f64;
        let complexity = params.complexity.clamp(0.0, 1.0);
        let brightness = params.brightness.clamp(0.0, 1.0);

        let subdivision = if energy > 0.65 {
            0.5
        } else if energy > 0.35 {
            1.0
        } else {
            2.0
        };
        let max_step = 1 + (complexity * 3.0).round() as i32;
        let rest_probability = 0.15 * (1.0 - energy);
        let melody_velocity = 60.0 + energy * 40.0;

        let table = progressions(params.style);
        let progression = table[rng.gen_range(0..table.len())];
        let mut degree = request
            .seed_context
            .last_pitch()
            .map(|pitch| nearest_degree(&key, pitch))
            .unwrap_or(if brightness > 0.6 { 4 } else { 2 });

        let mut events = Vec::new();
        let at = |secs: f64| Duration::from_secs_f64(secs.max(0.0));

        for bar_index in 0..bars {
            let bar_start = bar_index as f64 * bar;
            let root = progression[bar_index % progression.len()];

            // Bass: root for the first half of the bar, fifth for the second
            let half = bar / 2.0;
            events.push(MusicEvent::new(
                key.degree_pitch(root, BASS_OCTAVE),
                (55.0 + energy * 30.0) as u8,
                at(bar_start),
                at(half * 0.95),
            ));
            events.push(MusicEvent::new(
                key.degree_pitch(root + 4, BASS_OCTAVE),
                (50.0 + energy * 30.0) as u8,
                at(bar_start + half),
                at(half * 0.95),
            ));

            // Pad: triad over the whole bar
            let pad_velocity = (35.0 + brightness * 20.0) as u8;
            for offset in [0, 2, 4] {
                events.push(MusicEvent::new(
                    key.degree_pitch(root + offset, PAD_OCTAVE),
                    pad_velocity,
                    at(bar_start),
                    at(bar * 0.98),
                ));
            }

            // Melody: random walk on the scale
            let steps = (beats_per_bar / subdivision).round() as usize;
            for step in 0..steps {
                let start = bar_start + step as f64 * subdivision * beat;
                let duration = subdivision * beat * 0.9;
                if start + duration > length {
                    break;
                }
                if rng.gen_bool(rest_probability) {
                    continue;
                }
                degree = (degree + rng.gen_range(-max_step..=max_step)).clamp(-3, 10);
                let accent = if step == 0 { 8.0 } else { 0.0 };
                let jitter: f64 = rng.gen_range(-6.0..=6.0);
                events.push(MusicEvent::new(
                    key.degree_pitch(degree, MELODY_OCTAVE),
                    (melody_velocity + accent + jitter).clamp(1.0, 127.0) as u8,
                    at(start),
                    at(duration),
                ));
            }
        }

        // Very short requests still get one note
        if events.is_empty() && length > 0.0 {
            events.push(MusicEvent::new(
                key.degree_pitch(0, PAD_OCTAVE),
                60,
                Duration::ZERO,
                at(length * 0.9),
            ));
        }

        events
    }
}

/// Scale degree (around the melody octave) whose pitch is closest to `pitch`
fn nearest_degree(key: &Key, pitch: u8) -> i32 {
    (-3..=10)
        .min_by_key(|degree| (key.degree_pitch(*degree, MELODY_OCTAVE) as i32 - pitch as i32).abs())
        .unwrap_or(0)
}

#[async_trait]
impl SequenceModel for ProceduralModel {
    fn name(&self) -> &str {
        "procedural"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<MusicEvent>> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(Self::compose(request))
    }
}
