//! ---
//! iotsim_section: "03-logging"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Structured logging adapters and context macros."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
/// Emit an event at the given level enriched with a [`LogContext`](crate::LogContext).
#[macro_export]
macro_rules! sim_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            simulation = ctx.simulation.unwrap_or(""),
            device_type = ctx.device_type.unwrap_or(""),
            device = ctx.device.unwrap_or(""),
            tick = ctx.tick.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::sim_event!($level, context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an informational log enriched with simulator context.
#[macro_export]
macro_rules! sim_info {
    ($($arg:tt)+) => { $crate::sim_event!(tracing::Level::INFO, $($arg)+) };
}

/// Emit a debug log enriched with simulator context.
#[macro_export]
macro_rules! sim_debug {
    ($($arg:tt)+) => { $crate::sim_event!(tracing::Level::DEBUG, $($arg)+) };
}

/// Emit a warning enriched with simulator context.
#[macro_export]
macro_rules! sim_warn {
    ($($arg:tt)+) => { $crate::sim_event!(tracing::Level::WARN, $($arg)+) };
}

/// Emit an error log enriched with simulator context.
#[macro_export]
macro_rules! sim_error {
    ($($arg:tt)+) => { $crate::sim_event!(tracing::Level::ERROR, $($arg)+) };
}
