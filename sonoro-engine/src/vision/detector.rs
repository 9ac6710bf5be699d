//! Detector adapter
//!
//! Wraps an external object-detection model behind [`ObjectDetector`]. The
//! adapter owns the boundary policy:
//!
//! - input is downscaled to the current adaptive-quality resolution and the
//!   model's boxes are mapped back to full-frame coordinates
//! - output is sorted by descending confidence
//! - a failed call yields an empty list (the frame is simply lost)
//! - repeated failures flip a health signal that the scheduler observes

use async_trait::async_trait;
use sonoro_common::vision::{BoundingBox, Detection, Frame};
use sonoro_common::Timestamp;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// External object-detection model
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in `frame`; boxes are in the coordinates of `frame`
    async fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Detection>>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// Health transition reported by the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthChange {
    pub healthy: bool,
    pub consecutive_failures: u32,
}

/// Boundary adapter around an [`ObjectDetector`]
pub struct DetectorAdapter {
    detector: Arc<dyn ObjectDetector>,
    unhealthy_after: u32,
    consecutive_failures: u32,
    healthy: bool,
    pending_health_change: Option<HealthChange>,
    total_failures: u64,
}

impl DetectorAdapter {
    /// # Arguments
    /// * `detector` - Model to wrap
    /// * `unhealthy_after` - Consecutive failures before reporting unhealthy
    pub fn new(detector: Arc<dyn ObjectDetector>, unhealthy_after: u32) -> Self {
        Self {
            detector,
            unhealthy_after: unhealthy_after.max(1),
            consecutive_failures: 0,
            healthy: true,
            pending_health_change: None,
            total_failures: 0,
        }
    }

    /// Run detection on `frame` at `input_scale` of its resolution
    ///
    /// Never fails: a model error is logged, counted and turned into an empty
    /// detection list. Detections carry the frame timestamp and full-frame
    /// coordinates.
    pub async fn detect(&mut self, frame: &Frame, input_scale: f32) -> Vec<Detection> {
        let scale = if input_scale.is_finite() { input_scale.clamp(0.05, 1.0) } else { 1.0 };
        let result = if scale < 1.0 {
            let input = frame.downscale(scale);
            let back = frame.width as f32 / input.width as f32;
            self.detector
                .detect(&input)
                .await
                .map(|detections| detections.into_iter().map(|d| rescale(d, back)).collect::<Vec<_>>())
        } else {
            self.detector.detect(frame).await
        };

        match result {
            Ok(mut detections) => {
                self.record_success();
                for detection in &mut detections {
                    detection.timestamp = frame.timestamp;
                }
                detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
                detections
            }
            Err(e) => {
                self.record_failure();
                warn!(
                    "Detector '{}' failed on frame {} ({} consecutive): {:#}",
                    self.detector.name(),
                    frame.index,
                    self.consecutive_failures,
                    e
                );
                Vec::new()
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    /// Take the most recent health flip, if any happened since the last call
    pub fn take_health_change(&mut self) -> Option<HealthChange> {
        self.pending_health_change.take()
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if !self.healthy {
            self.healthy = true;
            info!("Detector '{}' recovered", self.detector.name());
            self.pending_health_change = Some(HealthChange {
                healthy: true,
                consecutive_failures: 0,
            });
        }
    }

    fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        if self.healthy && self.consecutive_failures >= self.unhealthy_after {
            self.healthy = false;
            warn!(
                "Detector '{}' unhealthy after {} consecutive failures",
                self.detector.name(),
                self.consecutive_failures
            );
            self.pending_health_change = Some(HealthChange {
                healthy: false,
                consecutive_failures: self.consecutive_failures,
            });
        }
    }
}

fn rescale(detection: Detection, factor: f32) -> Detection {
    Detection {
        bbox: detection.bbox.scaled(factor),
        ..detection
    }
}

// ========================================
// Scripted detector
// ========================================

/// One object in a scripted scene
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub label: String,
    pub confidence: f32,
    /// Box in full-resolution frame coordinates
    pub bbox: BoundingBox,
    pub visible_from: Timestamp,
    pub visible_until: Option<Timestamp>,
    /// Deterministic per-frame positional jitter amplitude in pixels
    pub jitter_px: f32,
}

impl SceneObject {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            visible_from: Timestamp::ZERO,
            visible_until: None,
            jitter_px: 0.0,
        }
    }

    pub fn visible_between(mut self, from: Timestamp, until: Option<Timestamp>) -> Self {
        self.visible_from = from;
        self.visible_until = until;
        self
    }

    pub fn with_jitter(mut self, jitter_px: f32) -> Self {
        self.jitter_px = jitter_px.max(0.0);
        self
    }

    fn visible_at(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.visible_from && self.visible_until.map_or(true, |until| timestamp < until)
    }
}

/// Runtime controls shared with a [`ScriptedDetector`]
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetectorControl {
    latency_us: Arc<AtomicU64>,
    fail_next: Arc<AtomicU32>,
    calls: Arc<AtomicU64>,
}

impl ScriptedDetectorControl {
    /// Inference latency at full resolution (scales with input pixel count)
    pub fn set_latency(&self, latency: Duration) {
        self.latency_us.store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us.load(Ordering::Relaxed))
    }

    /// Make the next `count` calls fail
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

/// Detector replaying a scripted scene
///
/// Stands in for a real model in the demo runner and in tests. Inference time
/// is simulated with `tokio::time::sleep`, proportional to the number of input
/// pixels relative to the full capture resolution.
pub struct ScriptedDetector {
    objects: Vec<SceneObject>,
    reference_width: u32,
    reference_height: u32,
    control: ScriptedDetectorControl,
}

impl ScriptedDetector {
    pub fn new(objects: Vec<SceneObject>, reference_width: u32, reference_height: u32) -> Self {
        Self {
            objects,
            reference_width: reference_width.max(1),
            reference_height: reference_height.max(1),
            control: ScriptedDetectorControl::default(),
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.control.set_latency(latency);
        self
    }

    pub fn control(&self) -> ScriptedDetectorControl {
        self.control.clone()
    }
}

#[async_trait]
impl ObjectDetector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Detection>> {
        self.control.calls.fetch_add(1, Ordering::Relaxed);

        let scale = frame.width as f32 / self.reference_width as f32;
        let pixel_ratio = frame.area() / (self.reference_width as f32 * self.reference_height as f32);
        let latency = self.control.latency().mul_f32(pixel_ratio.clamp(0.0, 1.0));
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let remaining = self.control.fail_next.load(Ordering::Relaxed);
        if remaining > 0 {
            self.control.fail_next.store(remaining - 1, Ordering::Relaxed);
            anyhow::bail!("scripted inference failure");
        }

        let detections = self
            .objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.visible_at(frame.timestamp))
            .map(|(i, object)| {
                let phase = frame.index as f32 * 0.7 + i as f32 * 1.3;
                let bbox = object
                    .bbox
                    .translated(object.jitter_px * phase.sin(), object.jitter_px * phase.cos())
                    .scaled(scale);
                Detection::new(object.label.clone(), object.confidence, bbox, frame.timestamp)
            })
            .collect::<Vec<_>>();

        debug!("Scripted detector: {} objects at {}", detections.len(), frame.timestamp);
        Ok(detections)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
