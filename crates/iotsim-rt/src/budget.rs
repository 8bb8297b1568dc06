//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Runtime helpers supporting the simulation engine."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Query for the execution time left in the current invocation.
pub trait RemainingTime: Send + Sync {
    fn remaining(&self) -> Duration;
}

pub type SharedRemainingTime = Arc<dyn RemainingTime>;

impl<F> RemainingTime for F
where
    F: Fn() -> Duration + Send + Sync,
{
    fn remaining(&self) -> Duration {
        self()
    }
}

/// Fixed point in (tokio) time at which the invocation is cut off.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        debug!(budget_ms = budget.as_millis() as u64, "invocation deadline armed");
        Self {
            at: Instant::now() + budget,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }
}

impl RemainingTime for Deadline {
    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}
