//! Frame source abstraction
//!
//! The capture task calls [`FrameSource::capture`] once per nominal frame
//! period. Sampling-rate reduction (frame stride) is applied by the capture
//! task, so sources only ever see the frames that are actually taken.

use sonoro_common::vision::Frame;
use sonoro_common::Timestamp;

/// Camera abstraction
///
/// Returning `None` means the frame could not be produced (transient failure);
/// the capture task simply skips it.
pub trait FrameSource: Send {
    fn capture(&mut self, index: u64, timestamp: Timestamp) -> Option<Frame>;

    /// Human-readable source name for logs
    fn name(&self) -> &str {
        "frame-source"
    }
}

/// Synthetic camera producing uniformly lit frames
///
/// Brightness can follow a slow sinusoidal drift to exercise the lighting
/// context of the feature extractor.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    colour: [u8; 3],
    drift_period_secs: Option<f64>,
    captured: u64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, colour: [u8; 3]) -> Self {
        Self {
            width,
            height,
            colour,
            drift_period_secs: None,
            captured: 0,
        }
    }

    /// Modulate brightness with the given period
    pub fn with_lighting_drift(mut self, period_secs: f64) -> Self {
        self.drift_period_secs = Some(period_secs.max(0.1));
        self
    }

    /// Frames produced so far
    pub fn captured(&self) -> u64 {
        self.captured
    }

    fn colour_at(&self, timestamp: Timestamp) -> [u8; 3] {
        match self.drift_period_secs {
            None => self.colour,
            Some(period) => {
                let phase = timestamp.as_secs_f64() / period * std::f64::consts::TAU;
                let factor = 0.75 + 0.25 * phase.sin();
                self.colour.map(|c| (c as f64 * factor).round().clamp(0.0, 255.0) as u8)
            }
        }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn capture(&mut self, index: u64, timestamp: Timestamp) -> Option<Frame> {
        self.captured += 1;
        Some(Frame::uniform(index, timestamp, self.width, self.height, self.colour_at(timestamp)))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frames_carry_index_and_time() {
        let mut source = SyntheticFrameSource::new(64, 48, [120, 120, 120]);
        let frame = source.capture(7, Timestamp::from_millis(466)).unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(frame.timestamp, Timestamp::from_millis(466));
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(source.captured(), 1);
    }

    #[test]
    fn test_lighting_drift_changes_luminance() {
        let mut source = SyntheticFrameSource::new(16, 16, [200, 200, 200]).with_lighting_drift(4.0);
        let bright = source.capture(0, Timestamp::from_millis(1_000)).unwrap().mean_luminance();
        let dark = source.capture(1, Timestamp::from_millis(3_000)).unwrap().mean_luminance();
        assert!(bright > dark);
    }
}
