//! End-to-end pipeline runs on the paused tokio clock

mod helpers;

use helpers::{plant_scene, procedural, rig, test_config, EventLog, SlowModel};
use sonoro_common::events::EventBus;
use sonoro_common::music::SequenceSource;
use sonoro_engine::playback::PlaybackPhase;
use sonoro_engine::Pipeline;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_static_plant_produces_one_stable_transition() {
    let config = test_config();
    let rig = rig(&config, plant_scene(), procedural());
    let events = EventBus::new(1_024);
    let log = EventLog::attach(&events);
    let pipeline = Pipeline::start(config, rig.components, events).unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;

    let status = pipeline.transition_status();
    assert_eq!(status.phase, PlaybackPhase::Idle);
    assert_eq!(status.active.and_then(|p| p.source_label).as_deref(), Some("plant"));
    assert!(rig.audio.peak() > 0.0, "no audio reached the output");

    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.parameter_changes, 1);
    assert_eq!(stats.generator.invocations, 1);
    assert_eq!(stats.generator.fallbacks, 0);
    assert_eq!(stats.transitions.completed, 1);
    assert_eq!(stats.audio_underruns, 0);
    assert_eq!(stats.quality_level, 0);

    assert_eq!(log.count("TrackConfirmed"), 1);
    assert_eq!(log.count("ParametersChanged"), 1);
    assert_eq!(log.count("TransitionStarted"), 1);
    assert_eq!(log.count("TransitionCompleted"), 1);
    assert_eq!(log.count("TrackLost"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generator_deadline_falls_back_without_silence_gap() {
    let mut config = test_config();
    config.generator.deadline_ms = 500;
    let rig = rig(&config, plant_scene(), Arc::new(SlowModel(Duration::from_secs(5))));
    let events = EventBus::new(1_024);
    let log = EventLog::attach(&events);
    let pipeline = Pipeline::start(config, rig.components, events).unwrap();

    tokio::time::sleep(Duration::from_secs(8)).await;

    let snapshot = pipeline.playback().snapshot();
    let target = snapshot.target_sequence().expect("fallback sequence playing");
    assert_eq!(target.source, SequenceSource::Fallback);
    assert!(!target.is_empty());
    assert_eq!(pipeline.transition_status().phase, PlaybackPhase::Idle);

    let generator = pipeline.generator_stats();
    assert_eq!(generator.invocations, 1);
    assert_eq!(generator.fallbacks, 1);
    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.transitions.completed, 1);
    assert_eq!(stats.audio_underruns, 0);
    assert_eq!(log.count("GeneratorFallback"), 1);
    assert!(rig.audio.peak() > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_detector_degrades_then_recovers_without_oscillation() {
    let config = test_config();
    let rig = rig(&config, plant_scene(), procedural());
    rig.detector.set_latency(Duration::from_millis(400));
    let events = EventBus::new(4_096);
    let log = EventLog::attach(&events);
    let monitor_interval = config.scheduler.monitor_interval();
    let pipeline = Pipeline::start(config, rig.components, events).unwrap();
    let mut quality = pipeline.subscribe_quality();
    let started = tokio::time::Instant::now();

    // first step down lands within one monitoring interval of the first slow frame
    quality.changed().await.unwrap();
    let first_change = started.elapsed();
    assert!(
        first_change <= monitor_interval + Duration::from_millis(400),
        "first quality change after {:?}",
        first_change
    );
    let first = *quality.borrow();
    assert_eq!(first.level, 1);
    assert!(first.frame_stride > 1, "sampling rate reduced first");

    tokio::time::sleep_until(started + Duration::from_secs(12)).await;
    let loaded_level = pipeline.quality().level;
    assert!((3..=4).contains(&loaded_level), "settled at level {}", loaded_level);
    let under_load = log.quality_changes();
    assert!(under_load.iter().all(|(from, to)| to > from), "{:?}", under_load);
    assert_eq!(under_load.len(), loaded_level as usize);

    // load goes away: climb back one level at a time
    rig.detector.set_latency(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(pipeline.quality().level, 0);

    let changes = log.quality_changes();
    let recoveries = &changes[under_load.len()..];
    assert_eq!(recoveries.len(), loaded_level as usize);
    assert!(recoveries.iter().all(|(from, to)| *from == to + 1), "{:?}", recoveries);

    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.quality_level, 0);
    assert!(stats.frames_skipped > 0);
}

#[tokio::test(start_paused = true)]
async fn test_detector_failures_do_not_stop_the_music() {
    let config = test_config();
    let rig = rig(&config, plant_scene(), procedural());
    let events = EventBus::new(1_024);
    let log = EventLog::attach(&events);
    let pipeline = Pipeline::start(config, rig.components, events).unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(pipeline.transition_status().phase, PlaybackPhase::Idle);

    rig.detector.fail_next(20);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(!pipeline.playback().snapshot().is_silent());
    let stats = pipeline.shutdown().await.unwrap();
    assert_eq!(stats.detector_failures, 20);
    assert_eq!(stats.parameter_changes, 1);
    assert_eq!(log.count("DetectorHealthChanged"), 2);
}
