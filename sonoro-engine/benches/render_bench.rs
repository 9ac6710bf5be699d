//! Render and perception hot-path benchmarks
//!
//! The render loop must stay far ahead of real time: one 512-frame block at
//! 44.1kHz is 11.6ms of audio.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sonoro_common::fade_curves::FadeCurve;
use sonoro_common::vision::{BoundingBox, Detection};
use sonoro_common::Timestamp;
use sonoro_engine::audio::{AudioFrame, RenderQuality, SequenceRenderer};
use sonoro_engine::config::{MapperConfig, TrackerConfig};
use sonoro_engine::music::fallback::FallbackLibrary;
use sonoro_engine::playback::{playback_channel, Blend, Layer, PlaybackPhase};
use sonoro_engine::semantic::{DefaultMapping, MappingStrategy, MusicalHistory, ParameterMapper, SemanticFeatures};
use sonoro_engine::vision::ObjectTracker;
use std::sync::Arc;
use std::time::Duration;

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    let library = FallbackLibrary::new();
    let calm = library.sequence_for(
        &DefaultMapping.map(&SemanticFeatures::new(0.3, 0.7, 0.4, 0.5, 0.2)),
        Duration::from_secs(16),
    );
    let busy = library.sequence_for(
        &DefaultMapping.map(&SemanticFeatures::new(0.9, 0.3, 0.8, 0.7, 0.6)),
        Duration::from_secs(16),
    );

    let (mut publisher, reader) = playback_channel();
    publisher.publish(
        PlaybackPhase::Crossfading,
        vec![Layer::new(Arc::clone(&calm), Timestamp::ZERO, 1.0)],
        Some(Blend {
            incoming: Layer::new(busy, Timestamp::ZERO, 1.0),
            start: Timestamp::ZERO,
            duration: Duration::from_secs(3_600),
            curve: FadeCurve::SCurve,
        }),
    );
    let crossfade = reader.snapshot();

    let (mut publisher, reader) = playback_channel();
    publisher.publish(
        PlaybackPhase::Idle,
        vec![Layer::new(calm, Timestamp::ZERO, 1.0)],
        None,
    );
    let idle = reader.snapshot();

    for (name, snapshot) in [("idle_512", idle), ("crossfade_512", crossfade)] {
        group.bench_function(name, |b| {
            let mut renderer = SequenceRenderer::new(44_100, 0.25);
            let mut block = vec![AudioFrame::zero(); 512];
            b.iter(|| {
                renderer.render_block(black_box(&snapshot), RenderQuality::default(), &mut block);
                black_box(&block);
            });
        });
    }

    group.finish();
}

fn bench_perception(c: &mut Criterion) {
    let mut group = c.benchmark_group("perception");

    group.bench_function("tracker_update_8_objects", |b| {
        let mut tracker = ObjectTracker::new(TrackerConfig::default());
        let mut frame = 0u64;
        b.iter(|| {
            let now = Timestamp::from_millis(frame * 66);
            let detections: Vec<Detection> = (0..8)
                .map(|i| {
                    let x = 70.0 * i as f32 + (frame % 5) as f32;
                    Detection::new("cup", 0.8, BoundingBox::new(x, 100.0, 60.0, 60.0), now)
                })
                .collect();
            black_box(tracker.update(&detections, now));
            frame += 1;
        });
    });

    group.bench_function("mapper_map", |b| {
        let mapper = ParameterMapper::new(Arc::new(DefaultMapping), &MapperConfig::default());
        let history = MusicalHistory::new(8);
        let features = SemanticFeatures::new(0.5, 0.5, 0.5, 0.5, 0.5);
        b.iter(|| black_box(mapper.map(black_box(&features), &history, Timestamp::ZERO)));
    });

    group.finish();
}

criterion_group!(benches, bench_render, bench_perception);
criterion_main!(benches);
