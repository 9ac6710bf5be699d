//! Pipeline clock
//!
//! Built on `tokio::time::Instant` so paused-time tests drive every stage
//! deterministically.

use sonoro_common::Timestamp;
use tokio::time::Instant;

/// Monotonic clock shared by all pipeline stages
#[derive(Debug, Clone, Copy)]
pub struct PipelineClock {
    origin: Instant,
}

impl PipelineClock {
    /// Clock whose origin is now
    pub fn start() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.origin.elapsed())
    }

    /// Tokio instant of a pipeline timestamp
    pub fn instant_at(&self, timestamp: Timestamp) -> Instant {
        self.origin + std::time::Duration::from_micros(timestamp.as_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = PipelineClock::start();
        assert_eq!(clock.now(), Timestamp::ZERO);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now(), Timestamp::from_millis(1_500));
        assert_eq!(clock.instant_at(clock.now()), Instant::now());
    }
}
