//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Runtime helpers supporting the simulation engine."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

/// Fixed-period async ticker. The first tick fires one full period after
/// construction, never immediately.
#[derive(Debug)]
pub struct RateLimiter {
    interval: tokio::time::Interval,
    period: Duration,
    ticks: u64,
}

impl RateLimiter {
    /// Panics when `period` is zero, as `tokio::time::interval` does.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            period,
            ticks: 0,
        }
    }

    pub async fn tick(&mut self) -> Instant {
        let at = self.interval.tick().await;
        self.ticks += 1;
        at
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Ticks observed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_period() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        let first = limiter.tick().await;
        assert_eq!(first - start, Duration::from_secs(5));
        let second = limiter.tick().await;
        assert_eq!(second - start, Duration::from_secs(10));
        assert_eq!(limiter.ticks(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumers_delay_rather_than_burst() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.tick().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        limiter.tick().await;
        let next = limiter.tick().await;
        assert_eq!(next - start, Duration::from_millis(4500));
    }
}
