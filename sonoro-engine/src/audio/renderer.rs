//! Sequence renderer
//!
//! Turns a [`PlaybackSnapshot`] into stereo frames. Each note is a sine with an
//! optional second partial (scaled by sequence brightness) under a short
//! attack/release envelope. Blend weights are evaluated per frame, so gain
//! changes during a crossfade are sample-smooth.
//!
//! The renderer keeps its own timeline (frames rendered since pipeline start)
//! and runs ahead of the device by the ring buffer fill level.

use crate::audio::types::AudioFrame;
use crate::playback::state::{Layer, PlaybackSnapshot};
use sonoro_common::Timestamp;
use std::f64::consts::TAU;
use std::time::Duration;

const ATTACK_SECS: f64 = 0.010;
const RELEASE_SECS: f64 = 0.080;
/// Second partial level at full brightness
const HARMONIC_LEVEL: f64 = 0.35;
/// Per-voice level before master gain
const VOICE_LEVEL: f32 = 0.5;

/// Render fidelity controlled by adaptive quality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderQuality {
    /// Maximum simultaneous voices per layer
    pub max_voices: usize,
    /// Render the second partial
    pub harmonics: bool,
}

impl Default for RenderQuality {
    fn default() -> Self {
        Self {
            max_voices: 16,
            harmonics: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Weighting {
    /// Outgoing layer with its static gain
    Base(f32),
    Incoming,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    layer: usize,
    start: f64,
    duration: f64,
    frequency: f64,
    amplitude: f32,
    pan: f32,
    harmonic: f64,
}

/// Snapshot-to-audio renderer
#[derive(Clone)]
pub struct SequenceRenderer {
    sample_rate: u32,
    master_gain: f32,
    /// Gain reached by the end of the next block
    target_gain: f32,
    frames_rendered: u64,
    voices: Vec<Voice>,
    last_voice_count: usize,
}

impl SequenceRenderer {
    pub fn new(sample_rate: u32, master_gain: f32) -> Self {
        let master_gain = master_gain.clamp(0.0, 1.0);
        Self {
            sample_rate: sample_rate.max(1),
            master_gain,
            target_gain: master_gain,
            frames_rendered: 0,
            voices: Vec::with_capacity(64),
            last_voice_count: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Pipeline time of the next frame to render
    pub fn position(&self) -> Timestamp {
        Timestamp::from_duration(Duration::from_secs_f64(
            self.frames_rendered as f64 / self.sample_rate as f64,
        ))
    }

    pub fn master_gain(&self) -> f32 {
        self.target_gain
    }

    /// Change the output level; ramps linearly across the next block
    pub fn set_master_gain(&mut self, gain: f32) {
        self.target_gain = gain.clamp(0.0, 1.0);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Voices rendered in the last block
    pub fn last_voice_count(&self) -> usize {
        self.last_voice_count
    }

    /// Render `out.len()` frames of `snapshot` and advance the timeline
    pub fn render_block(&mut self, snapshot: &PlaybackSnapshot, quality: RenderQuality, out: &mut [AudioFrame]) {
        let rate = self.sample_rate as f64;
        let t0 = self.frames_rendered as f64 / rate;
        let window = out.len() as f64 / rate;
        let gain_step = (self.target_gain - self.master_gain) / out.len().max(1) as f32;

        let layers: Vec<(&Layer, Weighting)> = snapshot
            .base
            .iter()
            .map(|layer| (layer, Weighting::Base(layer.gain)))
            .chain(snapshot.blend.iter().map(|blend| (&blend.incoming, Weighting::Incoming)))
            .collect();

        self.collect_voices(&layers, t0, window, quality);
        self.last_voice_count = self.voices.len();

        for (i, frame) in out.iter_mut().enumerate() {
            let t = t0 + i as f64 / rate;
            let (outgoing, incoming) = snapshot.blend.as_ref().map_or((1.0, 0.0), |blend| blend.weights_at(t));

            let mut mixed = AudioFrame::zero();
            for voice in &self.voices {
                let (layer, weighting) = layers[voice.layer];
                let weight = match weighting {
                    Weighting::Base(gain) => gain * outgoing,
                    Weighting::Incoming => incoming,
                };
                if weight <= 0.0 {
                    continue;
                }

                let length = layer.sequence.length_secs().max(1e-3);
                let mut tau = layer.position_at(t) - voice.start;
                if tau < 0.0 {
                    tau += length;
                }
                let envelope = envelope(tau, voice.duration);
                if envelope <= 0.0 {
                    continue;
                }

                let phase = TAU * voice.frequency * tau;
                let wave = (phase.sin() + voice.harmonic * (2.0 * phase).sin()) / (1.0 + voice.harmonic);
                let sample = wave as f32 * voice.amplitude * envelope as f32 * weight * VOICE_LEVEL;
                mixed.add(&AudioFrame::from_stereo(sample * (1.0 - voice.pan), sample * (1.0 + voice.pan)));
            }

            mixed.apply_volume(self.master_gain + gain_step * (i + 1) as f32);
            mixed.clamp();
            *frame = mixed;
        }

        self.master_gain = self.target_gain;
        self.frames_rendered += out.len() as u64;
    }

    /// Voices sounding anywhere in [t0, t0 + window], limited per layer
    fn collect_voices(&mut self, layers: &[(&Layer, Weighting)], t0: f64, window: f64, quality: RenderQuality) {
        self.voices.clear();
        for (index, (layer, _)) in layers.iter().enumerate() {
            let sequence = &layer.sequence;
            let length = sequence.length_secs().max(1e-3);
            let p0 = layer.position_at(t0);
            let p1 = p0 + window;
            let harmonic = if quality.harmonics {
                HARMONIC_LEVEL * sequence.brightness as f64
            } else {
                0.0
            };

            let first = self.voices.len();
            for event in sequence.events() {
                let start = event.start_secs();
                let end = event.end_secs() + RELEASE_SECS;
                // previous loop tail, this loop, next loop head
                let sounding = [-length, 0.0, length]
                    .iter()
                    .any(|shift| start + shift < p1 && end + shift > p0);
                if !sounding {
                    continue;
                }
                self.voices.push(Voice {
                    layer: index,
                    start,
                    duration: event.duration.as_secs_f64(),
                    frequency: event.frequency_hz(),
                    amplitude: event.velocity as f32 / 127.0,
                    pan: ((event.pitch as f32 - 60.0) / 36.0).clamp(-1.0, 1.0) * 0.5,
                    harmonic,
                });
            }

            let layer_voices = &mut self.voices[first..];
            if layer_voices.len() > quality.max_voices {
                layer_voices.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
                self.voices.truncate(first + quality.max_voices);
            }
        }
    }
}

/// Attack/sustain/release envelope at `tau` seconds after onset
fn envelope(tau: f64, duration: f64) -> f64 {
    let attack = |t: f64| (t / ATTACK_SECS).min(1.0);
    if tau < 0.0 {
        0.0
    } else if tau < duration {
        attack(tau)
    } else {
        let release = 1.0 - (tau - duration) / RELEASE_SECS;
        if release <= 0.0 {
            0.0
        } else {
            attack(duration) * release
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::state::{Blend, PlaybackPhase};
    use sonoro_common::music::{MusicEvent, MusicSequence, MusicStyle, SequenceSource};
    use sonoro_common::FadeCurve;
    use std::sync::Arc;

    const RATE: u32 = 8_000;

    fn sequence(pitches: &[u8]) -> Arc<MusicSequence> {
        let events = pitches
            .iter()
            .map(|p| MusicEvent::new(*p, 100, Duration::ZERO, Duration::from_millis(900)))
            .collect();
        Arc::new(MusicSequence::new(
            MusicStyle::Ambient,
            60.0,
            4,
            Duration::from_secs(1),
            0.5,
            SequenceSource::Model,
            events,
        ))
    }

    fn idle(sequence: Arc<MusicSequence>) -> PlaybackSnapshot {
        PlaybackSnapshot {
            version: 1,
            phase: PlaybackPhase::Idle,
            base: vec![Layer::new(sequence, Timestamp::ZERO, 1.0)],
            blend: None,
        }
    }

    fn render(snapshot: &PlaybackSnapshot, frames: usize, quality: RenderQuality) -> Vec<AudioFrame> {
        let mut renderer = SequenceRenderer::new(RATE, 0.5);
        let mut out = vec![AudioFrame::zero(); frames];
        renderer.render_block(snapshot, quality, &mut out);
        out
    }

    #[test]
    fn test_silence_renders_zeros() {
        let out = render(&PlaybackSnapshot::silent(), 256, RenderQuality::default());
        assert!(out.iter().all(|f| *f == AudioFrame::zero()));
    }

    #[test]
    fn test_note_is_audible_and_bounded() {
        let out = render(&idle(sequence(&[69])), 4_000, RenderQuality::default());
        let peak = out.iter().map(AudioFrame::peak).fold(0.0, f32::max);
        assert!(peak > 0.05);
        assert!(peak <= 1.0);
        // attack starts from silence
        assert!(out[0].peak() < 1e-3);
    }

    #[test]
    fn test_note_released_before_loop_end() {
        let out = render(&idle(sequence(&[69])), RATE as usize, RenderQuality::default());
        // note lasts 0.9s plus 80ms release; the last 20ms of the loop are silent
        assert!(out[(RATE as usize * 99 / 100)..].iter().all(|f| f.peak() < 1e-6));
    }

    #[test]
    fn test_rendering_is_deterministic_and_advances() {
        let snapshot = idle(sequence(&[60, 64, 67]));
        let mut renderer = SequenceRenderer::new(RATE, 0.5);
        let mut first = vec![AudioFrame::zero(); 400];
        renderer.render_block(&snapshot, RenderQuality::default(), &mut first);
        assert_eq!(renderer.frames_rendered(), 400);
        assert_eq!(renderer.position(), Timestamp::from_millis(50));
        assert_eq!(first, render(&snapshot, 400, RenderQuality::default()));
    }

    #[test]
    fn test_master_gain_ramps_without_steps() {
        let snapshot = idle(sequence(&[69]));
        let mut renderer = SequenceRenderer::new(RATE, 0.5);
        let mut warmup = vec![AudioFrame::zero(); 2_000];
        renderer.render_block(&snapshot, RenderQuality::default(), &mut warmup);

        let mut reference = renderer.clone();
        renderer.set_master_gain(0.0);
        assert_eq!(renderer.master_gain(), 0.0);

        let mut full = vec![AudioFrame::zero(); 400];
        let mut ramp = vec![AudioFrame::zero(); 400];
        reference.render_block(&snapshot, RenderQuality::default(), &mut full);
        renderer.render_block(&snapshot, RenderQuality::default(), &mut ramp);
        // each frame is scaled by its position in the ramp
        for (i, (a, b)) in full.iter().zip(&ramp).enumerate() {
            let scale = 1.0 - (i + 1) as f32 / 400.0;
            assert!((a.left * scale - b.left).abs() < 1e-5, "frame {}", i);
        }

        let mut after = vec![AudioFrame::zero(); 400];
        renderer.render_block(&snapshot, RenderQuality::default(), &mut after);
        assert!(after.iter().all(|f| *f == AudioFrame::zero()));
    }

    #[test]
    fn test_voice_limit() {
        let snapshot = idle(sequence(&[48, 52, 55, 60, 64, 67, 72, 76]));
        let mut renderer = SequenceRenderer::new(RATE, 0.5);
        let mut out = vec![AudioFrame::zero(); 64];
        renderer.render_block(&snapshot, RenderQuality { max_voices: 3, harmonics: false }, &mut out);
        assert_eq!(renderer.last_voice_count(), 3);
        renderer.render_block(&snapshot, RenderQuality::default(), &mut out);
        assert_eq!(renderer.last_voice_count(), 8);
    }

    #[test]
    fn test_blend_moves_energy_to_incoming() {
        let outgoing = sequence(&[57]);
        let snapshot = PlaybackSnapshot {
            version: 2,
            phase: PlaybackPhase::Crossfading,
            base: vec![Layer::new(Arc::clone(&outgoing), Timestamp::ZERO, 1.0)],
            blend: Some(Blend {
                incoming: Layer::new(sequence(&[81]), Timestamp::ZERO, 1.0),
                start: Timestamp::ZERO,
                duration: Duration::from_millis(500),
                curve: FadeCurve::Linear,
            }),
        };
        let blended = render(&snapshot, 6_000, RenderQuality::default());
        let outgoing_only = render(&idle(outgoing), 6_000, RenderQuality::default());

        // after the blend window only the incoming note remains
        let tail = 5_000..5_100;
        let differs = tail.clone().any(|i| (blended[i].left - outgoing_only[i].left).abs() > 1e-3);
        assert!(differs);
        // during the first frames the outgoing note dominates
        assert!((blended[40].left - outgoing_only[40].left).abs() < 0.05);
    }

    #[test]
    fn test_envelope_shape() {
        assert_eq!(envelope(-0.1, 1.0), 0.0);
        assert!((envelope(0.005, 1.0) - 0.5).abs() < 1e-9);
        assert_eq!(envelope(0.5, 1.0), 1.0);
        assert!((envelope(1.04, 1.0) - 0.5).abs() < 1e-9);
        assert_eq!(envelope(1.2, 1.0), 0.0);
    }
}
