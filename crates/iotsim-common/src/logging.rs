//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Tracing subscriber setup for the invocation binary."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Tracing setup for `iotsimd`.
//!
//! The binary owns stdout: the invocation result and, with `--publish-out -`,
//! the JSON-lines telemetry stream are written there. Diagnostics therefore
//! never touch stdout. They go to stderr in the configured [`LogFormat`] and
//! to a daily rolling JSON file under `logging.directory`, so a caller piping
//! stdout into another tool always receives clean JSON.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "IOTSIM_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Writer guards for the stderr and file sinks; dropping them loses buffered lines.
static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Format of the stderr sink. The file sink is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global subscriber once per process.
///
/// The filter comes from `IOTSIM_LOG`, then `RUST_LOG`, then `info`.
/// A second call keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = GUARDS.set((stderr_guard, file_guard));

    let filter = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer(config.format, stderr_writer))
        .with(
            fmt::layer()
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer),
        )
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised; stdout reserved for results"
    );
    Ok(())
}

fn stderr_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer
            .with_target(false)
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => layer.with_writer(writer).boxed(),
    }
}

/// The custom variable wins over `RUST_LOG`. Unparseable directives fall
/// back to the default with a note on stderr.
fn resolve_filter(custom: Option<String>, standard: Option<String>) -> EnvFilter {
    let Some((source, directive)) = custom
        .map(|directive| (LOG_ENV, directive))
        .or_else(|| standard.map(|directive| (EnvFilter::DEFAULT_ENV, directive)))
    else {
        return EnvFilter::new(DEFAULT_DIRECTIVE);
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid {source} directive `{directive}` ({err}); logging at {DEFAULT_DIRECTIVE}");
        EnvFilter::new(DEFAULT_DIRECTIVE)
    })
}
