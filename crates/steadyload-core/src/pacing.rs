use std::time::Duration;
use tokio::time::sleep;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Fixed-interval issuance pacer.
///
/// Waits `1 / rate` seconds per call, computed with integer nanoseconds. No
/// attempt is made to compensate for drift: the cadence is best-effort.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    rate: u32,
    interval: Duration,
}

impl Pacer {
    pub fn new(rate: u32) -> Self {
        let interval = if rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(NANOS_PER_SECOND / rate as u64)
        };
        Self { rate, interval }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait one interval. Rates above one per nanosecond round to no wait.
    pub async fn wait(&self) {
        if !self.interval.is_zero() {
            sleep(self.interval).await;
        }
    }
}
