//! Shared fixtures for the sonoro-engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sonoro_common::events::{EventBus, SonoroEvent};
use sonoro_common::music::MusicEvent;
use sonoro_common::vision::BoundingBox;
use sonoro_engine::audio::{CaptureHandle, CaptureOutput};
use sonoro_engine::music::generator::GenerationRequest;
use sonoro_engine::music::{ProceduralModel, SequenceModel};
use sonoro_engine::source::SyntheticFrameSource;
use sonoro_engine::vision::detector::{SceneObject, ScriptedDetector, ScriptedDetectorControl};
use sonoro_engine::{PipelineComponents, PipelineConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub const SAMPLE_RATE: u32 = 8_000;

/// Low sample rate and a tiny frame keep paused-time runs cheap
pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.audio.sample_rate = SAMPLE_RATE;
    config.audio.block_frames = 128;
    config.audio.ring_capacity_frames = 2_048;
    config.capture.width = 64;
    config.capture.height = 48;
    config
}

/// A potted plant filling the middle of the test frame
pub fn plant_scene() -> Vec<SceneObject> {
    vec![SceneObject::new("plant", 0.88, BoundingBox::new(20.0, 10.0, 24.0, 28.0)).with_jitter(0.5)]
}

pub struct TestRig {
    pub components: PipelineComponents,
    pub detector: ScriptedDetectorControl,
    pub audio: CaptureHandle,
}

/// Components with a scripted detector, a capturing audio output and `model`
pub fn rig(config: &PipelineConfig, objects: Vec<SceneObject>, model: Arc<dyn SequenceModel>) -> TestRig {
    let detector = ScriptedDetector::new(objects, config.capture.width, config.capture.height);
    let control = detector.control();
    let output = CaptureOutput::new(config.audio.sample_rate, config.audio.block_frames as u32);
    let audio = output.handle();
    let components = PipelineComponents::new(
        Box::new(SyntheticFrameSource::new(config.capture.width, config.capture.height, [96, 112, 92])),
        Arc::new(detector),
        model,
        Box::new(output),
    );
    TestRig {
        components,
        detector: control,
        audio,
    }
}

pub fn procedural() -> Arc<dyn SequenceModel> {
    Arc::new(ProceduralModel::new())
}

/// Model that takes a fixed time per generation
pub struct SlowModel(pub Duration);

#[async_trait]
impl SequenceModel for SlowModel {
    fn name(&self) -> &str {
        "slow"
    }

    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<MusicEvent>> {
        tokio::time::sleep(self.0).await;
        Ok(ProceduralModel::compose(request))
    }
}

/// Records every event published on a bus
pub struct EventLog {
    events: Arc<Mutex<Vec<SonoroEvent>>>,
    task: JoinHandle<()>,
}

impl EventLog {
    /// Subscribe before the pipeline starts so nothing is missed
    pub fn attach(bus: &EventBus) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut rx = bus.subscribe();
        let sink = Arc::clone(&events);
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => sink.lock().unwrap().push(event),
                    Err(RecvError::Lagged(skipped)) => panic!("event log lagged by {} events", skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { events, task }
    }

    pub fn all(&self) -> Vec<SonoroEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// (old, new) level of every quality change, in order
    pub fn quality_changes(&self) -> Vec<(u8, u8)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SonoroEvent::QualityChanged {
                    old_level, new_level, ..
                } => Some((*old_level, *new_level)),
                _ => None,
            })
            .collect()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.task.abort();
    }
}
