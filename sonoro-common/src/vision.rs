//! Vision data model shared by the capture, detection and tracking stages

use crate::time::Timestamp;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per pixel of the frame buffer (packed RGB8)
pub const BYTES_PER_PIXEL: usize = 3;

/// Upper bound on pixels visited when estimating luminance
const LUMINANCE_SAMPLE_BUDGET: usize = 4096;

/// A captured camera frame
///
/// Immutable once produced. Frames are moved from stage to stage, so exactly
/// one stage owns a frame at any time and it is released when consumed.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture sequence number (monotonic, gaps mean frames were sampled out)
    pub index: u64,

    /// Capture time on the pipeline clock
    pub timestamp: Timestamp,

    pub width: u32,
    pub height: u32,

    /// Packed RGB8 pixels, row-major
    pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame, validating the buffer length against the dimensions
    pub fn new(index: u64, timestamp: Timestamp, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!("frame has zero dimension {}x{}", width, height)));
        }
        if pixels.len() != expected {
            return Err(Error::InvalidInput(format!(
                "frame buffer has {} bytes, expected {} for {}x{} RGB8",
                pixels.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { index, timestamp, width, height, pixels })
    }

    /// Create a frame filled with a single colour
    pub fn uniform(index: u64, timestamp: Timestamp, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixel_count = width.max(1) as usize * height.max(1) as usize;
        let mut pixels = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);
        for _ in 0..pixel_count {
            pixels.extend_from_slice(&rgb);
        }
        Self {
            index,
            timestamp,
            width: width.max(1),
            height: height.max(1),
            pixels,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Frame area in pixels
    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }

    /// Nearest-neighbour downscale by `scale` (0, 1]
    ///
    /// A scale of 1.0 (or above) returns a plain copy.
    pub fn downscale(&self, scale: f32) -> Frame {
        if scale >= 1.0 || !scale.is_finite() {
            return self.clone();
        }
        let scale = scale.max(0.05);
        let width = ((self.width as f32 * scale).round() as u32).max(1);
        let height = ((self.height as f32 * scale).round() as u32).max(1);

        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            let src_y = ((y as f32 + 0.5) / scale) as u32;
            let src_y = src_y.min(self.height - 1);
            for x in 0..width {
                let src_x = (((x as f32 + 0.5) / scale) as u32).min(self.width - 1);
                let offset = (src_y as usize * self.width as usize + src_x as usize) * BYTES_PER_PIXEL;
                pixels.extend_from_slice(&self.pixels[offset..offset + BYTES_PER_PIXEL]);
            }
        }

        Frame {
            index: self.index,
            timestamp: self.timestamp,
            width,
            height,
            pixels,
        }
    }

    /// Estimated scene lighting, mean relative luminance in [0, 1]
    ///
    /// Samples at most a few thousand evenly spaced pixels (Rec. 709 weights).
    pub fn mean_luminance(&self) -> f32 {
        let pixel_count = self.pixels.len() / BYTES_PER_PIXEL;
        if pixel_count == 0 {
            return 0.0;
        }
        let stride = (pixel_count / LUMINANCE_SAMPLE_BUDGET).max(1);

        let mut total = 0.0f64;
        let mut samples = 0usize;
        let mut pixel = 0usize;
        while pixel < pixel_count {
            let offset = pixel * BYTES_PER_PIXEL;
            let r = self.pixels[offset] as f64;
            let g = self.pixels[offset + 1] as f64;
            let b = self.pixels[offset + 2] as f64;
            total += 0.2126 * r + 0.7152 * g + 0.0722 * b;
            samples += 1;
            pixel += stride;
        }

        ((total / samples as f64) / 255.0).clamp(0.0, 1.0) as f32
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("timestamp", &self.timestamp)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Axis-aligned bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Intersection over Union with another box, in [0, 1]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        (intersection / union).clamp(0.0, 1.0)
    }

    /// Scale coordinates and size by `factor` (resolution change)
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox::new(self.x * factor, self.y * factor, self.width * factor, self.height * factor)
    }

    /// Translate by a displacement
    pub fn translated(&self, dx: f32, dy: f32) -> BoundingBox {
        BoundingBox::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Linear interpolation towards `target` (alpha = 1.0 jumps to target)
    pub fn lerp(&self, target: &BoundingBox, alpha: f32) -> BoundingBox {
        let a = alpha.clamp(0.0, 1.0);
        BoundingBox::new(
            self.x + (target.x - self.x) * a,
            self.y + (target.y - self.y) * a,
            self.width + (target.width - self.width) * a,
            self.height + (target.height - self.height) * a,
        )
    }
}

/// Coarse confidence band of a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Band boundaries at 0.5, 0.75 and 0.9
    pub fn from_score(confidence: f32) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::VeryHigh
        } else if confidence >= 0.75 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceLevel::Low => write!(f, "low"),
            ConfidenceLevel::Medium => write!(f, "medium"),
            ConfidenceLevel::High => write!(f, "high"),
            ConfidenceLevel::VeryHigh => write!(f, "very high"),
        }
    }
}

/// One detector output for one frame
///
/// Ephemeral: discarded once the tracker has associated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub timestamp: Timestamp,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox, timestamp: Timestamp) -> Self {
        Self {
            label: label.into(),
            confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
            bbox,
            timestamp,
        }
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_score(self.confidence)
    }

    /// Confident enough to drive the music
    pub fn is_reliable(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// Persistent track identity (unique, monotonically assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Track lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    /// Newly created, not yet matched often enough to be trusted
    Tentative,
    /// Matched for enough consecutive frames
    Confirmed,
    /// Missed for the loss timeout; awaiting garbage collection
    Lost,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackState::Tentative => write!(f, "tentative"),
            TrackState::Confirmed => write!(f, "confirmed"),
            TrackState::Lost => write!(f, "lost"),
        }
    }
}
