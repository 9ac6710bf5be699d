//! Pipeline timestamps
//!
//! All pipeline stages share one monotonic clock whose origin is the moment the
//! pipeline started. Timestamps are microsecond counts from that origin so that
//! scripted scenarios (tests, offline runs) are fully deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Get current UTC wall-clock time (used for event stamps only)
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Monotonic pipeline timestamp, microseconds since pipeline start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Pipeline origin
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs.max(0.0) * 1_000_000.0).round() as u64)
    }

    pub fn from_duration(elapsed: Duration) -> Self {
        Self(elapsed.as_micros() as u64)
    }

    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Signed difference in seconds (`self - other`)
    pub fn secs_since(&self, other: Timestamp) -> f64 {
        (self.0 as f64 - other.0 as f64) / 1_000_000.0
    }

    /// Timestamp shifted back by `duration`, clamped at the origin
    pub fn saturating_sub(&self, duration: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration.as_micros() as u64))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_micros() as u64)
    }
}

impl AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.as_micros() as u64;
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_unit_conversions() {
        let ts = Timestamp::from_millis(1_500);
        assert_eq!(ts.as_micros(), 1_500_000);
        assert_eq!(ts.as_millis(), 1_500);
        assert!((ts.as_secs_f64() - 1.5).abs() < 1e-9);
        assert_eq!(Timestamp::from_secs_f64(1.5), ts);
    }

    #[test]
    fn test_saturating_since_never_negative() {
        let early = Timestamp::from_millis(100);
        let late = Timestamp::from_millis(350);
        assert_eq!(late.saturating_since(early), Duration::from_millis(250));
        assert_eq!(early.saturating_since(late), Duration::ZERO);
        assert!((early.secs_since(late) + 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_add_duration() {
        let mut ts = Timestamp::ZERO + Duration::from_millis(40);
        ts += Duration::from_millis(60);
        assert_eq!(ts, Timestamp::from_millis(100));
        assert_eq!(ts.saturating_sub(Duration::from_secs(1)), Timestamp::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::from_millis(2_250).to_string(), "2.250s");
    }
}
