//! ---
//! iotsim_section: "03-logging"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Structured logging adapters and context macros."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Context-enriched logging helpers shared by the engine crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Simulation identifier associated with the log event.
    pub simulation: Option<&'a str>,
    /// Device type identifier.
    pub device_type: Option<&'a str>,
    /// Device instance identifier.
    pub device: Option<&'a str>,
    /// Tick counter within the current invocation.
    pub tick: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a simulation identifier.
    pub fn with_simulation(mut self, simulation: &'a str) -> Self {
        self.simulation = Some(simulation);
        self
    }

    /// Attach a device type identifier.
    pub fn with_device_type(mut self, device_type: &'a str) -> Self {
        self.device_type = Some(device_type);
        self
    }

    /// Attach a device instance identifier.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a tick value.
    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            simulation = ctx.simulation.unwrap_or(""),
            device_type = ctx.device_type.unwrap_or(""),
            device = ctx.device.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            simulation = ctx.simulation.unwrap_or(""),
            device_type = ctx.device_type.unwrap_or(""),
            device = ctx.device.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %message
        ),
    }
}
