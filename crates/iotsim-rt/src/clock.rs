//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Runtime helpers supporting the simulation engine."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Wall-clock sources injected into runners and generators.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Projects tokio's monotonic clock onto a UTC anchor.
///
/// Under a paused tokio runtime the reported time only advances with
/// `tokio::time::advance` or auto-advance, which keeps tick loops
/// reproducible in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.origin);
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.anchor + delta,
            Err(_) => DateTime::<Utc>::MAX_UTC,
        }
    }
}
