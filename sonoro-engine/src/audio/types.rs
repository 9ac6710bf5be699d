//! Core audio data types

/// A single stereo sample (one frame of audio)
///
/// Passed from the renderer to the output device through the ring buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    /// Silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Same sample on both channels
    pub fn from_mono(sample: f32) -> Self {
        AudioFrame { left: sample, right: sample }
    }

    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Apply volume scaling to both channels
    pub fn apply_volume(&mut self, volume: f32) {
        self.left *= volume;
        self.right *= volume;
    }

    /// Add another frame to this frame (mixing)
    pub fn add(&mut self, other: &AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp samples to [-1.0, 1.0]
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }

    /// Larger absolute channel value
    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_zero() {
        let frame = AudioFrame::zero();
        assert_eq!(frame.left, 0.0);
        assert_eq!(frame.right, 0.0);
    }

    #[test]
    fn test_audio_frame_mixing() {
        let mut frame = AudioFrame::from_stereo(0.3, 0.4);
        frame.add(&AudioFrame::from_mono(0.2));
        frame.apply_volume(0.5);
        assert!((frame.left - 0.25).abs() < 1e-6);
        assert!((frame.right - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_audio_frame_clamp() {
        let mut frame = AudioFrame::from_stereo(1.5, -1.5);
        frame.clamp();
        assert_eq!(frame, AudioFrame::from_stereo(1.0, -1.0));
        assert_eq!(frame.peak(), 1.0);
    }
}
