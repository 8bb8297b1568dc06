//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "binary"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Binary entrypoint running one simulation invocation."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};
use iotsim_common::config::AppConfig;
use iotsim_common::logging::init_tracing;
use iotsim_common::version::VersionInfo;
use iotsim_common::{PublisherConfig, PublisherKind, StageStoreConfig, StageStoreKind};
use iotsim_core::{
    run_invocation, EngineSettings, HttpStageStore, InMemoryStageStore, InvocationEnv,
    JsonFileStageStore, RunnerServices, StageStore,
};
use iotsim_metrics::{new_registry, render_text, EngineMetrics};
use iotsim_msg::{HttpPublisher, InMemoryPublisher, JsonLinesPublisher, Publisher};
use iotsim_rt::{Deadline, TokioClock};
use iotsim_schema::{InvocationRequest, InvocationResult, Simulation};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/iotsimd.toml";
const STDIO: &str = "-";

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("iotsim ", env!("CARGO_PKG_VERSION")),
    about = "IoT simulation engine",
    long_about = None
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run one invocation and write its resumable result")]
    Run(RunArgs),
    #[command(about = "Print extended version information")]
    Version,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[arg(long, value_name = "FILE", help = "Invocation request JSON")]
    input: PathBuf,

    #[arg(long, value_name = "FILE", help = "Where the result JSON is written; `-` for stdout")]
    output: Option<PathBuf>,

    #[arg(long, value_name = "SECS", help = "Override invocation.time_budget")]
    time_budget: Option<u64>,

    #[arg(long, value_name = "FILE", help = "Poll simulation stages from a JSON file")]
    stage_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Append telemetry as JSON lines; `-` for stdout")]
    publish_out: Option<PathBuf>,
}

impl RunArgs {
    /// Fold command line overrides into the loaded configuration.
    fn apply(&self, config: &mut AppConfig) -> Result<()> {
        if let Some(secs) = self.time_budget {
            config.invocation.time_budget = Duration::from_secs(secs);
        }
        if let Some(path) = &self.stage_file {
            config.stage_store = StageStoreConfig {
                kind: StageStoreKind::File,
                path: Some(path.clone()),
                endpoint: None,
                ..config.stage_store.clone()
            };
        }
        if let Some(target) = &self.publish_out {
            config.publisher = if is_stdio(target) {
                PublisherConfig {
                    kind: PublisherKind::Stdout,
                    path: None,
                    endpoint: None,
                    ..config.publisher.clone()
                }
            } else {
                PublisherConfig {
                    kind: PublisherKind::File,
                    path: Some(target.clone()),
                    endpoint: None,
                    ..config.publisher.clone()
                }
            };
        }
        config
            .validate()
            .context("configuration invalid after command line overrides")
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let version = VersionInfo::current();
    let args = match cli.command {
        Commands::Version => {
            println!("{}", version.extended());
            return Ok(());
        }
        Commands::Run(args) => args,
    };

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        ensure!(path.exists(), "config file {} not found", path.display());
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    args.apply(&mut config)?;
    init_tracing("iotsimd", &config.logging)?;
    info!(
        version = %version.cli_string(),
        config = ?loaded.source,
        "iotsimd starting"
    );

    run(config, &args).await
}

async fn run(config: AppConfig, args: &RunArgs) -> Result<()> {
    // The budget covers the whole invocation, including request parsing.
    let deadline = Deadline::after(config.invocation.effective_budget());
    let request = read_request(&args.input).await?;
    info!(
        sim_id = %request.simulation.sim_id,
        device_types = request.devices.len(),
        restart = request.options.restart,
        budget_secs = config.invocation.effective_budget().as_secs(),
        "invocation request loaded"
    );

    let metrics = if config.metrics.enabled {
        Some(Arc::new(EngineMetrics::new(new_registry())?))
    } else {
        None
    };
    let publisher = build_publisher(&config.publisher).await?;
    let store = build_store(&config.stage_store, &request.simulation)?;
    let env = InvocationEnv {
        settings: EngineSettings::from(&config.engine),
        services: RunnerServices {
            publisher: Arc::clone(&publisher),
            clock: Arc::new(TokioClock::new()),
            remaining: Arc::new(deadline),
            metrics: metrics.clone(),
        },
        store,
    };

    let result = tokio::select! {
        result = run_invocation(request, env) => result.context("simulation invocation failed")?,
        interrupted = signal::ctrl_c() => {
            interrupted.context("failed to listen for ctrl-c")?;
            bail!("interrupted before the invocation finished; no result written");
        }
    };
    info!(
        sim_id = %result.simulation.sim_id,
        restart = result.options.restart,
        publisher = publisher.name(),
        "invocation finished"
    );

    write_result(&result, args.output.as_deref()).await?;
    if let Some(metrics) = metrics {
        write_metrics(&metrics, config.metrics.output.as_deref()).await?;
    }
    Ok(())
}

async fn read_request(path: &Path) -> Result<InvocationRequest> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("unable to read invocation request {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid invocation request {}", path.display()))
}

async fn build_publisher(config: &PublisherConfig) -> Result<Arc<dyn Publisher>> {
    let publisher: Arc<dyn Publisher> = match config.kind {
        PublisherKind::Memory => {
            warn!("memory publisher selected; telemetry is discarded when the process exits");
            Arc::new(InMemoryPublisher::new())
        }
        PublisherKind::Stdout => Arc::new(JsonLinesPublisher::stdout()),
        PublisherKind::File => {
            let path = config
                .path
                .as_ref()
                .context("publisher.path is required for the file publisher")?;
            Arc::new(
                JsonLinesPublisher::append_to(path)
                    .await
                    .with_context(|| format!("unable to open telemetry file {}", path.display()))?,
            )
        }
        PublisherKind::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .context("publisher.endpoint is required for the http publisher")?;
            Arc::new(HttpPublisher::with_timeout(endpoint, config.request_timeout)?)
        }
    };
    Ok(publisher)
}

fn build_store(config: &StageStoreConfig, simulation: &Simulation) -> Result<Arc<dyn StageStore>> {
    let store: Arc<dyn StageStore> = match config.kind {
        StageStoreKind::Memory => Arc::new(InMemoryStageStore::with(simulation.clone())),
        StageStoreKind::File => {
            let path = config
                .path
                .clone()
                .context("stage_store.path is required for the file store")?;
            Arc::new(JsonFileStageStore::new(path))
        }
        StageStoreKind::Http => {
            let endpoint = config
                .endpoint
                .clone()
                .context("stage_store.endpoint is required for the http store")?;
            Arc::new(HttpStageStore::with_timeout(endpoint, config.request_timeout)?)
        }
    };
    Ok(store)
}

async fn write_result(result: &InvocationResult, output: Option<&Path>) -> Result<()> {
    let mut encoded = serde_json::to_string_pretty(result)?;
    encoded.push('\n');
    match output {
        Some(path) if !is_stdio(path) => {
            tokio::fs::write(path, encoded)
                .await
                .with_context(|| format!("unable to write result {}", path.display()))?;
            info!(output = %path.display(), "result written");
        }
        _ => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn write_metrics(metrics: &EngineMetrics, output: Option<&Path>) -> Result<()> {
    let text = render_text(&metrics.registry())?;
    match output {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("unable to write metrics {}", path.display()))?,
        None => {
            let mut stderr = tokio::io::stderr();
            stderr.write_all(text.as_bytes()).await?;
            stderr.flush().await?;
        }
    }
    Ok(())
}
