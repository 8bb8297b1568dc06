//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Runtime helpers supporting the simulation engine."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Scheduling, clock and budget helpers for the simulator runtime.

pub mod budget;
pub mod clock;
pub mod scheduling;

pub use budget::{Deadline, RemainingTime, SharedRemainingTime};
pub use clock::{Clock, SharedClock, SystemClock, TokioClock};
pub use scheduling::RateLimiter;
