//! Pipeline scheduling: stage queues, performance monitoring and adaptive quality

pub mod monitor;
pub mod pipeline;
pub mod quality;
pub mod queue;

pub use monitor::{PerformanceReport, Stage, StageMetric};
pub use pipeline::{Pipeline, PipelineComponents, ProcessingStats, TransitionStatus};
pub use quality::{AdaptiveQualityController, QualityCommand, QualitySettings};
pub use queue::{PushOutcome, QueuePolicy, StageQueue};
