//! Fade curve implementations for crossfading
//!
//! Every curve here is *complementary*: the outgoing weight is always
//! `1 - fade_in(t)`, so the two blend weights sum to exactly 1.0 at every
//! instant of a transition. Curves differ only in how the incoming weight
//! travels from 0.0 to 1.0; all of them are monotonically non-decreasing.

use serde::{Deserialize, Serialize};

/// Fade curve types for crossfading
///
/// - Linear: Constant rate of change (precise, predictable)
/// - Exponential: Slow start, fast finish for the incoming sequence
/// - Logarithmic: Fast start, slow finish for the incoming sequence
/// - SCurve: Smooth acceleration and deceleration (gentle, musical)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// Linear: v(t) = t
    Linear,

    /// Exponential: v(t) = t²
    Exponential,

    /// Logarithmic: v(t) = √t
    Logarithmic,

    /// S-Curve: v(t) = 0.5 × (1 - cos(π × t))
    #[serde(alias = "cosine")]
    SCurve,
}

impl FadeCurve {
    /// Calculate fade-in multiplier at given position
    ///
    /// # Arguments
    /// * `position` - Normalized position through fade (0.0 to 1.0), clamped
    ///
    /// # Returns
    /// Weight of the incoming source (0.0 = silent, 1.0 = full)
    pub fn calculate_fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::SCurve => 0.5 * (1.0 - (std::f32::consts::PI * t).cos()),
        }
    }

    /// Both blend weights `(outgoing, incoming)` at the given position
    pub fn weights(&self, position: f32) -> (f32, f32) {
        let incoming = self.calculate_fade_in(position);
        (1.0 - incoming, incoming)
    }

    /// Parse curve from a configuration string
    ///
    /// Accepts 'linear', 'exponential', 'logarithmic', and 'cosine' /
    /// 's_curve' / 'scurve' / 's-curve' for the S-curve.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "exponential" => Some(FadeCurve::Exponential),
            "logarithmic" => Some(FadeCurve::Logarithmic),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Some(FadeCurve::SCurve),
            _ => None,
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Exponential => "Exponential",
            FadeCurve::Logarithmic => "Logarithmic",
            FadeCurve::SCurve => "S-Curve",
        }
    }

    /// Get all available fade curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
        ]
    }
}

impl Default for FadeCurve {
    fn default() -> Self {
        FadeCurve::SCurve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_bounds() {
        for curve in FadeCurve::all_variants() {
            assert!(curve.calculate_fade_in(0.0).abs() < 1e-6, "{:?} should start at 0", curve);
            assert!((curve.calculate_fade_in(1.0) - 1.0).abs() < 1e-6, "{:?} should end at 1", curve);
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        for curve in FadeCurve::all_variants() {
            for step in 0..=100 {
                let (out, inc) = curve.weights(step as f32 / 100.0);
                assert!((out + inc - 1.0).abs() < 1e-6, "{:?} at step {}", curve, step);
            }
        }
    }

    #[test]
    fn test_fade_in_monotonic() {
        for curve in FadeCurve::all_variants() {
            let mut previous = 0.0f32;
            for step in 0..=1000 {
                let value = curve.calculate_fade_in(step as f32 / 1000.0);
                assert!(value + 1e-6 >= previous, "{:?} decreased at step {}", curve, step);
                previous = value;
            }
        }
    }

    #[test]
    fn test_out_of_range_positions_are_clamped() {
        assert_eq!(FadeCurve::Linear.calculate_fade_in(-0.5), 0.0);
        assert_eq!(FadeCurve::Linear.calculate_fade_in(7.0), 1.0);
    }

    #[test]
    fn test_midpoints() {
        assert!((FadeCurve::Linear.calculate_fade_in(0.5) - 0.5).abs() < 1e-6);
        assert!((FadeCurve::Exponential.calculate_fade_in(0.5) - 0.25).abs() < 1e-6);
        assert!((FadeCurve::Logarithmic.calculate_fade_in(0.25) - 0.5).abs() < 1e-6);
        assert!((FadeCurve::SCurve.calculate_fade_in(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(FadeCurve::parse("cosine"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::parse("s-curve"), Some(FadeCurve::SCurve));
        assert_eq!(FadeCurve::parse("LINEAR"), Some(FadeCurve::Linear));
        assert_eq!(FadeCurve::parse("equal_power"), None);
        for curve in FadeCurve::all_variants() {
            assert_eq!(FadeCurve::parse(curve.display_name()), Some(*curve));
        }
    }

    #[test]
    fn test_default() {
        assert_eq!(FadeCurve::default(), FadeCurve::SCurve);
    }
}
