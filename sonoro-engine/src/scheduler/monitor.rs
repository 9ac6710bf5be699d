//! Performance monitor
//!
//! Stages report [`StageMetric`]s over a bounded mpsc channel. The monitor
//! task drains the channel into a [`MetricsWindow`] and closes the window once
//! per monitoring interval, producing a [`PerformanceReport`] for the
//! adaptive-quality controller.
//!
//! Reporting never blocks a stage: when the channel is full the metric is
//! discarded and counted.

use serde::Serialize;
use sonoro_common::Timestamp;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Measured pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capture,
    Detect,
    Track,
    Map,
    Render,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capture => "capture",
            Stage::Detect => "detect",
            Stage::Track => "track",
            Stage::Map => "map",
            Stage::Render => "render",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One measurement sent by a stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageMetric {
    FrameCaptured,
    /// Frames discarded by a queue or skipped by the source
    FramesDropped { count: u64 },
    StageLatency { stage: Stage, latency: Duration },
    /// A frame made it through perception and mapping
    FrameProcessed { captured_at: Timestamp, completed_at: Timestamp },
    QueueDepth { queue: &'static str, depth: usize },
    DetectorHealth { healthy: bool },
    Underruns { count: u64 },
}

/// Non-blocking sending half of the metrics channel
#[derive(Debug, Clone)]
pub struct MetricsSink {
    tx: mpsc::Sender<StageMetric>,
    discarded: Arc<AtomicU64>,
}

impl MetricsSink {
    pub fn record(&self, metric: StageMetric) {
        if self.tx.try_send(metric).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Metrics lost because the channel was full or closed
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

pub fn metrics_channel(capacity: usize) -> (MetricsSink, mpsc::Receiver<StageMetric>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        MetricsSink {
            tx,
            discarded: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Aggregated view of one monitoring interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    /// Mean capture-to-parameters latency; None when nothing was processed
    pub mean_latency_ms: Option<f64>,
    pub max_latency_ms: f64,
    pub stage_mean_ms: BTreeMap<Stage, f64>,
    /// Deepest observed depth per queue
    pub queue_depths: BTreeMap<&'static str, usize>,
    pub underruns: u64,
    pub detector_healthy: bool,
}

impl PerformanceReport {
    /// Frames arrived but none came out
    pub fn is_stalled(&self) -> bool {
        self.frames_captured > 0 && self.frames_processed == 0
    }

    pub fn over_budget(&self, budget: Duration) -> bool {
        let budget_ms = budget.as_secs_f64() * 1_000.0;
        match self.mean_latency_ms {
            Some(mean) => mean > budget_ms,
            None => self.is_stalled(),
        }
    }
}

/// Accumulator for the current monitoring interval
#[derive(Debug)]
pub struct MetricsWindow {
    started: Timestamp,
    frames_captured: u64,
    frames_processed: u64,
    frames_dropped: u64,
    latency_sum: Duration,
    latency_max: Duration,
    stage_sums: BTreeMap<Stage, (Duration, u32)>,
    queue_depths: BTreeMap<&'static str, usize>,
    underruns: u64,
    detector_healthy: bool,
}

impl MetricsWindow {
    pub fn new(now: Timestamp) -> Self {
        Self {
            started: now,
            frames_captured: 0,
            frames_processed: 0,
            frames_dropped: 0,
            latency_sum: Duration::ZERO,
            latency_max: Duration::ZERO,
            stage_sums: BTreeMap::new(),
            queue_depths: BTreeMap::new(),
            underruns: 0,
            detector_healthy: true,
        }
    }

    pub fn ingest(&mut self, metric: StageMetric) {
        match metric {
            StageMetric::FrameCaptured => self.frames_captured += 1,
            StageMetric::FramesDropped { count } => self.frames_dropped += count,
            StageMetric::StageLatency { stage, latency } => {
                let entry = self.stage_sums.entry(stage).or_insert((Duration::ZERO, 0));
                entry.0 += latency;
                entry.1 += 1;
            }
            StageMetric::FrameProcessed {
                captured_at,
                completed_at,
            } => {
                let latency = completed_at.saturating_since(captured_at);
                self.frames_processed += 1;
                self.latency_sum += latency;
                self.latency_max = self.latency_max.max(latency);
            }
            StageMetric::QueueDepth { queue, depth } => {
                let deepest = self.queue_depths.entry(queue).or_insert(0);
                *deepest = (*deepest).max(depth);
            }
            StageMetric::DetectorHealth { healthy } => self.detector_healthy = healthy,
            StageMetric::Underruns { count } => self.underruns += count,
        }
    }

    /// Close the window at `now` and start the next one
    ///
    /// Detector health carries over; everything else resets.
    pub fn report(&mut self, now: Timestamp) -> PerformanceReport {
        let mean_latency_ms = (self.frames_processed > 0)
            .then(|| millis(self.latency_sum) / self.frames_processed as f64);
        let stage_mean_ms = self
            .stage_sums
            .iter()
            .map(|(stage, (sum, count))| (*stage, millis(*sum) / (*count).max(1) as f64))
            .collect();

        let report = PerformanceReport {
            window_start: self.started,
            window_end: now,
            frames_captured: self.frames_captured,
            frames_processed: self.frames_processed,
            frames_dropped: self.frames_dropped,
            mean_latency_ms,
            max_latency_ms: millis(self.latency_max),
            stage_mean_ms,
            queue_depths: std::mem::take(&mut self.queue_depths),
            underruns: self.underruns,
            detector_healthy: self.detector_healthy,
        };

        let healthy = self.detector_healthy;
        *self = MetricsWindow::new(now);
        self.detector_healthy = healthy;
        report
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}
