//! Sonoro demo runner (sonoro)
//!
//! Drives the pipeline with a synthetic camera and a scripted scene, prints
//! every pipeline event as a JSON line on stdout and the final processing
//! statistics when the run ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sonoro_common::events::EventBus;
use sonoro_common::vision::BoundingBox;
use sonoro_common::Timestamp;
use sonoro_engine::audio::{AudioOutput, NullOutput};
use sonoro_engine::config::{PipelineConfig, TransitionMode};
use sonoro_engine::music::ProceduralModel;
use sonoro_engine::source::SyntheticFrameSource;
use sonoro_engine::vision::detector::{SceneObject, ScriptedDetector};
use sonoro_engine::{Pipeline, PipelineComponents};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sonoro
#[derive(Parser, Debug)]
#[command(name = "sonoro")]
#[command(about = "Real-time perception-to-music pipeline (scripted scene demo)")]
#[command(version)]
struct Args {
    /// Configuration file (overrides SONORO_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long, default_value = "20")]
    duration_secs: u64,

    /// Scripted scene: plant, desk or empty
    #[arg(short, long, default_value = "plant")]
    scene: String,

    /// Simulated generation latency of the built-in model
    #[arg(long, default_value = "0")]
    generator_latency_ms: u64,

    /// Simulated full-resolution detector latency
    #[arg(long, default_value = "30")]
    detector_latency_ms: u64,

    /// Transition mode: instant, smooth, fade or crossfade (overrides config)
    #[arg(long)]
    transition_mode: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(mode) = &args.transition_mode {
        match TransitionMode::parse(mode) {
            Some(mode) => config.transition.mode = mode,
            None => bail!("Unknown transition mode '{}' (expected instant, smooth, fade or crossfade)", mode),
        }
    }

    let default_filter = format!(
        "sonoro_engine={level},sonoro_common={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting sonoro with scene '{}' for {}s", args.scene, args.duration_secs);

    let (width, height) = (config.capture.width, config.capture.height);
    let detector = ScriptedDetector::new(scene(&args.scene, width as f32, height as f32)?, width, height)
        .with_latency(Duration::from_millis(args.detector_latency_ms));
    let mut model = ProceduralModel::new();
    if args.generator_latency_ms > 0 {
        model = model.with_latency(Duration::from_millis(args.generator_latency_ms));
    }

    let components = PipelineComponents::new(
        Box::new(SyntheticFrameSource::new(width, height, [110, 120, 100]).with_lighting_drift(30.0)),
        Arc::new(detector),
        Arc::new(model),
        audio_output(&config)?,
    );

    let events = EventBus::new(1_024);
    let printer = tokio::spawn(print_events(events.clone()));
    let pipeline = Pipeline::start(config, components, events).context("Failed to start pipeline")?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {
            info!("Run finished after {}s", args.duration_secs);
        }
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down");
        }
    }

    let stats = pipeline.shutdown().await.context("Pipeline shutdown failed")?;
    printer.abort();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Scripted scene in capture coordinates
fn scene(name: &str, width: f32, height: f32) -> Result<Vec<SceneObject>> {
    let centred = |w: f32, h: f32| BoundingBox::new((width - w) / 2.0, (height - h) / 2.0, w, h);
    let objects = match name {
        "plant" => vec![SceneObject::new("plant", 0.88, centred(width * 0.3, height * 0.5)).with_jitter(1.5)],
        "desk" => vec![
            SceneObject::new("cup", 0.82, BoundingBox::new(width * 0.1, height * 0.5, width * 0.15, height * 0.2))
                .visible_between(Timestamp::ZERO, Some(Timestamp::from_millis(14_000)))
                .with_jitter(1.0),
            SceneObject::new("laptop", 0.91, centred(width * 0.45, height * 0.4))
                .visible_between(Timestamp::from_millis(8_000), None)
                .with_jitter(1.0),
        ],
        "empty" => Vec::new(),
        other => bail!("Unknown scene '{}' (expected plant, desk or empty)", other),
    };
    Ok(objects)
}

fn audio_output(config: &PipelineConfig) -> Result<Box<dyn AudioOutput>> {
    let audio = &config.audio;
    if audio.device_output {
        #[cfg(feature = "cpal-output")]
        {
            let output = sonoro_engine::audio::output::CpalOutput::new(
                audio.device_name.as_deref(),
                audio.sample_rate,
                audio.block_frames as u32,
            )?;
            return Ok(Box::new(output));
        }
        #[cfg(not(feature = "cpal-output"))]
        warn!("Device output requested but sonoro was built without the cpal-output feature; using null output");
    }
    Ok(Box::new(NullOutput::new(audio.sample_rate, audio.block_frames as u32)))
}

/// Write every event as one JSON line on stdout
async fn print_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize {} event: {}", event.event_type(), e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, {} events skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
