//! Audio outputs
//!
//! An [`AudioOutput`] drains the consumer half of the ring buffer at the
//! device rate. The device side only ever reads the ring buffer and bumps
//! counters; rendering happens elsewhere.
//!
//! - [`NullOutput`]: paced drain without a device (headless runs, tests)
//! - [`CaptureOutput`]: paced drain that records every frame
//! - `CpalOutput`: a real device through cpal (`cpal-output` feature)

use crate::audio::callback_monitor::CallbackMonitor;
use crate::audio::ring_buffer::AudioConsumer;
use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Consumer of rendered audio
///
/// Not `Send`: device streams are usually pinned to the thread that built them.
pub trait AudioOutput {
    fn name(&self) -> &str;

    /// Start consuming `consumer`, reporting callbacks to `monitor`
    fn start(&mut self, consumer: AudioConsumer, monitor: Arc<CallbackMonitor>) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Recorded frames shared with the test or caller
#[derive(Debug, Clone, Default)]
pub struct CaptureHandle {
    frames: Arc<Mutex<Vec<AudioFrame>>>,
}

impl CaptureHandle {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every frame recorded so far
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.lock().clone()
    }

    /// Largest absolute sample recorded so far
    pub fn peak(&self) -> f32 {
        self.lock().iter().map(AudioFrame::peak).fold(0.0, f32::max)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AudioFrame>> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drains the ring buffer one block per block period on a tokio task
struct PacedDrain {
    block_frames: usize,
    block_period: Duration,
    capture: Option<CaptureHandle>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PacedDrain {
    fn new(sample_rate: u32, block_frames: u32, capture: Option<CaptureHandle>) -> Self {
        Self {
            block_frames: block_frames.max(1) as usize,
            block_period: Duration::from_secs_f64(block_frames.max(1) as f64 / sample_rate.max(1) as f64),
            capture,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    fn start(&mut self, mut consumer: AudioConsumer, monitor: Arc<CallbackMonitor>) -> Result<()> {
        if self.task.is_some() {
            return Err(Error::AudioOutput("output already started".to_string()));
        }
        let block_frames = self.block_frames;
        let period = self.block_period;
        let capture = self.capture.clone();
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            let mut block = vec![AudioFrame::zero(); block_frames];
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        monitor.record_callback();
                        let read = consumer.pop_into(&mut block);
                        if read < block.len() && consumer.audio_expected() {
                            monitor.record_underrun();
                        }
                        if let Some(capture) = &capture {
                            capture.lock().extend_from_slice(&block);
                        }
                    }
                }
            }
            debug!("Paced audio drain stopped");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.task.take();
    }
}

/// Paced drain without a device
pub struct NullOutput {
    drain: PacedDrain,
}

impl NullOutput {
    pub fn new(sample_rate: u32, block_frames: u32) -> Self {
        Self {
            drain: PacedDrain::new(sample_rate, block_frames, None),
        }
    }
}

impl AudioOutput for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn start(&mut self, consumer: AudioConsumer, monitor: Arc<CallbackMonitor>) -> Result<()> {
        info!("Starting null audio output ({} frames per block)", self.drain.block_frames);
        self.drain.start(consumer, monitor)
    }

    fn stop(&mut self) -> Result<()> {
        self.drain.stop();
        Ok(())
    }
}

/// Paced drain that records everything it consumes
pub struct CaptureOutput {
    drain: PacedDrain,
    handle: CaptureHandle,
}

impl CaptureOutput {
    pub fn new(sample_rate: u32, block_frames: u32) -> Self {
        let handle = CaptureHandle::default();
        Self {
            drain: PacedDrain::new(sample_rate, block_frames, Some(handle.clone())),
            handle,
        }
    }

    pub fn handle(&self) -> CaptureHandle {
        self.handle.clone()
    }
}

impl AudioOutput for CaptureOutput {
    fn name(&self) -> &str {
        "capture"
    }

    fn start(&mut self, consumer: AudioConsumer, monitor: Arc<CallbackMonitor>) -> Result<()> {
        self.drain.start(consumer, monitor)
    }

    fn stop(&mut self) -> Result<()> {
        self.drain.stop();
        Ok(())
    }
}

#[cfg(feature = "cpal-output")]
pub use device::CpalOutput;

#[cfg(feature = "cpal-output")]
mod device {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, SampleFormat, Stream, StreamConfig};
    use tracing::{error, warn};

    /// Audio device output using cpal
    pub struct CpalOutput {
        device: Device,
        device_name: String,
        config: StreamConfig,
        sample_format: SampleFormat,
        stream: Option<Stream>,
    }

    impl CpalOutput {
        /// Open `device_name` (or the default device), falling back to the default
        pub fn new(device_name: Option<&str>, sample_rate: u32, block_frames: u32) -> Result<Self> {
            let host = cpal::default_host();

            let requested = match device_name {
                Some(name) => {
                    let mut devices = host
                        .output_devices()
                        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
                    let found = devices.find(|d| d.name().ok().as_deref() == Some(name));
                    if found.is_none() {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                    }
                    found
                }
                None => None,
            };
            let device = match requested {
                Some(device) => device,
                None => host
                    .default_output_device()
                    .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
            };
            let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            info!("Using audio device: {}", device_name);

            let (mut config, sample_format) = Self::get_best_config(&device, sample_rate)?;
            config.buffer_size = cpal::BufferSize::Fixed(block_frames);
            debug!(
                "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
                config.sample_rate.0, config.channels, sample_format, config.buffer_size
            );

            Ok(Self {
                device,
                device_name,
                config,
                sample_format,
                stream: None,
            })
        }

        fn get_best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
            let mut supported_configs = device
                .supported_output_configs()
                .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

            let preferred = supported_configs.find(|config| {
                config.channels() == 2
                    && config.min_sample_rate().0 <= sample_rate
                    && config.max_sample_rate().0 >= sample_rate
                    && config.sample_format() == SampleFormat::F32
            });

            match preferred {
                Some(supported) => {
                    let sample_format = supported.sample_format();
                    Ok((supported.with_sample_rate(cpal::SampleRate(sample_rate)).config(), sample_format))
                }
                None => Err(Error::AudioOutput(format!(
                    "Device offers no stereo f32 configuration at {} Hz",
                    sample_rate
                ))),
            }
        }
    }

    impl AudioOutput for CpalOutput {
        fn name(&self) -> &str {
            &self.device_name
        }

        fn start(&mut self, mut consumer: AudioConsumer, monitor: Arc<CallbackMonitor>) -> Result<()> {
            if self.sample_format != SampleFormat::F32 {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    self.sample_format
                )));
            }
            let channels = self.config.channels as usize;
            let mut scratch = vec![AudioFrame::zero(); 4_096];

            let stream = self
                .device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        monitor.record_callback();
                        let frames = data.len() / channels.max(1);
                        if scratch.len() < frames {
                            scratch.resize(frames, AudioFrame::zero());
                        }
                        let block = &mut scratch[..frames];
                        let read = consumer.pop_into(block);
                        if read < frames && consumer.audio_expected() {
                            monitor.record_underrun();
                        }
                        for (out, frame) in data.chunks_mut(channels).zip(block.iter()) {
                            out[0] = frame.left.clamp(-1.0, 1.0);
                            if channels > 1 {
                                out[1] = frame.right.clamp(-1.0, 1.0);
                            }
                        }
                    },
                    move |err| {
                        error!("Audio stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

            stream
                .play()
                .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
            self.stream = Some(stream);
            info!("Audio stream started on {}", self.device_name);
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            if let Some(stream) = self.stream.take() {
                stream
                    .pause()
                    .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
            }
            Ok(())
        }
    }

    impl Drop for CpalOutput {
        fn drop(&mut self) {
            let _ = self.stop();
        }
    }
}
