//! Adaptive quality control
//!
//! Quality is a ladder of discrete levels. Each step down gives up one thing,
//! in a fixed order: frame sampling stride first, then detector input
//! resolution, then generated sequence length, and audio render fidelity last.
//!
//! Degrading needs `degrade_after` consecutive over-budget reports; an audio
//! underrun degrades immediately. Recovering needs `recover_after` consecutive
//! reports in which the latency predicted for the next higher level stays
//! under `recover_ratio` of the budget, with no dropped frames and a healthy
//! detector. Both counters reset after every level change.

use crate::audio::renderer::RenderQuality;
use crate::config::SchedulerConfig;
use crate::scheduler::monitor::PerformanceReport;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Settings applied by the pipeline stages at one quality level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualitySettings {
    pub level: u8,
    /// Take every n-th captured frame
    pub frame_stride: u32,
    /// Detector input resolution factor
    pub detector_scale: f32,
    /// Generated sequence length factor
    pub sequence_scale: f32,
    pub render_voices: usize,
    pub render_harmonics: bool,
}

/// (stride, detector scale, sequence scale, voices, harmonics)
const LADDER: [(u32, f32, f32, usize, bool); 7] = [
    (1, 1.0, 1.0, 16, true),
    (2, 1.0, 1.0, 16, true),
    (3, 1.0, 1.0, 16, true),
    (3, 0.75, 1.0, 16, true),
    (3, 0.5, 1.0, 16, true),
    (3, 0.5, 0.5, 16, true),
    (3, 0.5, 0.5, 6, false),
];

impl QualitySettings {
    /// Settings at `level`, clamped to the lowest available level
    pub fn at_level(level: u8) -> Self {
        let level = level.min(Self::max_level());
        let (frame_stride, detector_scale, sequence_scale, render_voices, render_harmonics) = LADDER[level as usize];
        Self {
            level,
            frame_stride,
            detector_scale,
            sequence_scale,
            render_voices,
            render_harmonics,
        }
    }

    pub fn max_level() -> u8 {
        (LADDER.len() - 1) as u8
    }

    /// Relative per-second detector work (pixels per frame over stride)
    pub fn detection_load(&self) -> f64 {
        let scale = self.detector_scale as f64;
        scale * scale / self.frame_stride.max(1) as f64
    }

    pub fn render_quality(&self) -> RenderQuality {
        RenderQuality {
            max_voices: self.render_voices,
            harmonics: self.render_harmonics,
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self::at_level(0)
    }
}

/// A level change decided by the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityCommand {
    pub from: u8,
    pub to: u8,
    pub settings: QualitySettings,
    pub reason: String,
}

impl QualityCommand {
    pub fn is_degradation(&self) -> bool {
        self.to > self.from
    }
}

/// Feedback controller turning performance reports into quality commands
#[derive(Debug)]
pub struct AdaptiveQualityController {
    budget: Duration,
    degrade_after: u32,
    recover_after: u32,
    recover_ratio: f64,
    level: u8,
    over_budget_streak: u32,
    comfortable_streak: u32,
}

impl AdaptiveQualityController {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            budget: config.latency_budget(),
            degrade_after: config.degrade_after.max(1),
            recover_after: config.recover_after.max(1),
            recover_ratio: config.recover_ratio as f64,
            level: 0,
            over_budget_streak: 0,
            comfortable_streak: 0,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn settings(&self) -> QualitySettings {
        QualitySettings::at_level(self.level)
    }

    /// Feed one report; returns a command when the level changes
    pub fn observe(&mut self, report: &PerformanceReport) -> Option<QualityCommand> {
        if report.underruns > 0 {
            self.comfortable_streak = 0;
            return self.step_down(format!("{} audio underruns", report.underruns));
        }

        if report.over_budget(self.budget) {
            self.comfortable_streak = 0;
            self.over_budget_streak += 1;
            debug!(
                "Report over budget ({}/{}): mean latency {:?}ms",
                self.over_budget_streak, self.degrade_after, report.mean_latency_ms
            );
            if self.over_budget_streak >= self.degrade_after {
                let reason = match report.mean_latency_ms {
                    Some(mean) => format!("mean latency {:.0}ms over {}ms budget", mean, self.budget.as_millis()),
                    None => "no frames processed".to_string(),
                };
                return self.step_down(reason);
            }
            return None;
        }
        self.over_budget_streak = 0;

        if self.level == 0 {
            return None;
        }
        match self.predicted_latency_one_level_up(report) {
            Some(predicted) if report.detector_healthy && report.frames_dropped == 0 => {
                let limit = self.recover_ratio * self.budget.as_secs_f64() * 1_000.0;
                if predicted < limit {
                    self.comfortable_streak += 1;
                    if self.comfortable_streak >= self.recover_after {
                        return self.step_up(format!(
                            "predicted latency {:.0}ms under {:.0}ms",
                            predicted, limit
                        ));
                    }
                } else {
                    self.comfortable_streak = 0;
                }
            }
            _ => self.comfortable_streak = 0,
        }
        None
    }

    /// Mean latency scaled by the detector work of the next higher level
    fn predicted_latency_one_level_up(&self, report: &PerformanceReport) -> Option<f64> {
        let mean = report.mean_latency_ms?;
        let current = QualitySettings::at_level(self.level);
        let higher = QualitySettings::at_level(self.level.saturating_sub(1));
        Some(mean * higher.detection_load() / current.detection_load().max(f64::EPSILON))
    }

    fn step_down(&mut self, reason: String) -> Option<QualityCommand> {
        self.over_budget_streak = 0;
        if self.level >= QualitySettings::max_level() {
            return None;
        }
        self.change_level(self.level + 1, reason)
    }

    fn step_up(&mut self, reason: String) -> Option<QualityCommand> {
        self.comfortable_streak = 0;
        self.change_level(self.level - 1, reason)
    }

    fn change_level(&mut self, to: u8, reason: String) -> Option<QualityCommand> {
        let from = self.level;
        self.level = to;
        self.over_budget_streak = 0;
        self.comfortable_streak = 0;
        let settings = QualitySettings::at_level(to);
        info!("Quality level {} -> {}: {}", from, to, reason);
        Some(QualityCommand {
            from,
            to,
            settings,
            reason,
        })
    }
}
