//! Audio sink: renderer, lock-free ring buffer and device outputs

pub mod callback_monitor;
pub mod output;
pub mod renderer;
pub mod ring_buffer;
pub mod types;

pub use callback_monitor::CallbackMonitor;
pub use output::{AudioOutput, CaptureHandle, CaptureOutput, NullOutput};
pub use renderer::{RenderQuality, SequenceRenderer};
pub use ring_buffer::{AudioConsumer, AudioProducer, AudioRingBuffer};
pub use types::AudioFrame;
