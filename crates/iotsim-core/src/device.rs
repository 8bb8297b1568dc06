//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Per-device lifecycle and tick loop."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use iotsim_common::time::elapsed_between;
use iotsim_logging::{sim_debug, LogContext};
use iotsim_metrics::{DeviceOutcomeLabel, EngineMetrics};
use iotsim_msg::{Publisher, QoS};
use iotsim_rt::{RateLimiter, SharedClock, SharedRemainingTime};
use iotsim_schema::{
    DeviceCheckpoint, DeviceStage, DeviceTypeSpec, GeneratorState, InstanceOutcome, Outcome,
};
use iotsim_sim::TelemetryGenerator;
use tokio::sync::watch;

use crate::error::EngineResult;

/// Collaborators shared by every runner of an invocation.
#[derive(Clone)]
pub struct RunnerServices {
    pub publisher: Arc<dyn Publisher>,
    pub clock: SharedClock,
    pub remaining: SharedRemainingTime,
    pub metrics: Option<Arc<EngineMetrics>>,
}

/// Deterministic identity: first three characters of the simulation id and of
/// the device type id, followed by the instance index.
pub fn device_id(sim_id: &str, type_id: &str, index: usize) -> String {
    let mut id: String = sim_id.chars().take(3).collect();
    id.extend(type_id.chars().take(3));
    id.push_str(&index.to_string());
    id
}

/// Runtime view of one simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInstance {
    pub id: String,
    pub stage: DeviceStage,
    pub started: DateTime<Utc>,
    pub generator: GeneratorState,
}

impl DeviceInstance {
    pub fn fresh(id: String, started: DateTime<Utc>) -> Self {
        Self {
            id,
            stage: DeviceStage::Idle,
            started,
            generator: GeneratorState::default(),
        }
    }

    /// Resume under `id`, keeping the original start time and generator state.
    pub fn resume(id: String, checkpoint: DeviceCheckpoint) -> Self {
        Self {
            id,
            stage: DeviceStage::Idle,
            started: checkpoint.started,
            generator: checkpoint.generator,
        }
    }
}

/// Timing and addressing a runner needs beyond the instance itself.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub sim_id: String,
    pub type_id: String,
    pub interval: Duration,
    pub duration: Duration,
    pub qos: QoS,
}

/// Requests a cooperative stop of one runner.
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    device: String,
    stop: Arc<watch::Sender<bool>>,
}

impl RunnerHandle {
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Idempotent and non-blocking.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// Owns one device's tick loop.
///
/// Stage machine: `idle -> running -> {sleeping, checkpointed}`. A stop
/// request is honoured while waiting for the next tick and never interrupts
/// an in-flight publish.
pub struct DeviceRunner {
    instance: DeviceInstance,
    settings: RunnerSettings,
    spec: Arc<DeviceTypeSpec>,
    generator: Box<dyn TelemetryGenerator>,
    services: RunnerServices,
    stop: watch::Receiver<bool>,
}

enum Resolution {
    Stopped,
    Complete,
    BudgetExhausted,
}

impl DeviceRunner {
    pub fn new(
        instance: DeviceInstance,
        settings: RunnerSettings,
        spec: Arc<DeviceTypeSpec>,
        generator: Box<dyn TelemetryGenerator>,
        services: RunnerServices,
    ) -> (Self, RunnerHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = RunnerHandle {
            device: instance.id.clone(),
            stop: Arc::new(stop_tx),
        };
        let runner = Self {
            instance,
            settings,
            spec,
            generator,
            services,
            stop: stop_rx,
        };
        (runner, handle)
    }

    /// Tick until the device completes, is stopped, or runs out of budget.
    pub async fn run(mut self) -> EngineResult<InstanceOutcome> {
        let device_type = self.settings.type_id.clone();
        if let Some(metrics) = &self.services.metrics {
            metrics.device_started(&device_type);
        }
        let result = self.tick_loop().await;
        if let Some(metrics) = &self.services.metrics {
            match &result {
                Ok(Resolution::Complete) => {
                    metrics.device_finished(&device_type, DeviceOutcomeLabel::Complete)
                }
                Ok(Resolution::Stopped) => {
                    metrics.device_finished(&device_type, DeviceOutcomeLabel::Stopped)
                }
                Ok(Resolution::BudgetExhausted) => {
                    metrics.device_finished(&device_type, DeviceOutcomeLabel::Checkpoint)
                }
                Err(_) => metrics.device_aborted(&device_type),
            }
        }
        match result? {
            Resolution::Complete => Ok(Outcome::Complete),
            Resolution::Stopped | Resolution::BudgetExhausted => {
                Ok(Outcome::Checkpoint(self.checkpoint()))
            }
        }
    }

    async fn tick_loop(&mut self) -> EngineResult<Resolution> {
        self.instance.stage = DeviceStage::Running;
        self.generator.start();
        let mut limiter = RateLimiter::new(self.settings.interval);
        let mut listening = true;

        loop {
            tokio::select! {
                biased;
                changed = self.stop.changed(), if listening => {
                    if changed.is_err() {
                        listening = false;
                        continue;
                    }
                }
                _ = limiter.tick() => {}
            }
            let tick = limiter.ticks();
            let now = self.services.clock.now();

            if *self.stop.borrow_and_update() {
                self.instance.stage = DeviceStage::Sleeping;
                self.generator.stop();
                sim_debug!(context = self.log_context(tick), "stop requested; checkpointing");
                return Ok(Resolution::Stopped);
            }
            if elapsed_between(self.instance.started, now) > self.settings.duration
                || !self.generator.is_running()
            {
                self.generator.stop();
                sim_debug!(context = self.log_context(tick), "device complete");
                return Ok(Resolution::Complete);
            }
            if self.services.remaining.remaining() < self.settings.interval {
                self.generator.stop();
                sim_debug!(
                    context = self.log_context(tick),
                    "invocation budget below one interval; checkpointing"
                );
                return Ok(Resolution::BudgetExhausted);
            }

            self.generator.generate(&self.spec, &self.instance.id, now);
            let published = self.publish_buffered().await;
            self.generator.clear_messages();
            match published {
                Ok(count) => {
                    if let Some(metrics) = &self.services.metrics {
                        metrics.record_published(&self.settings.type_id, count);
                    }
                    sim_debug!(context = self.log_context(tick), "published {} messages", count);
                }
                Err(err) => {
                    if let Some(metrics) = &self.services.metrics {
                        metrics.record_publish_failure(&self.settings.type_id);
                    }
                    self.generator.stop();
                    return Err(err.into());
                }
            }
        }
    }

    async fn publish_buffered(&self) -> Result<usize, iotsim_msg::PublishError> {
        let publisher = &self.services.publisher;
        let qos = self.settings.qos;
        let messages = self.generator.messages();
        try_join_all(messages.iter().map(|message| async move {
            let payload = message.encode_payload()?;
            publisher.publish(&message.topic, payload, qos).await
        }))
        .await?;
        Ok(messages.len())
    }

    fn checkpoint(&self) -> DeviceCheckpoint {
        DeviceCheckpoint {
            stage: self.instance.stage,
            started: self.instance.started,
            id: self.instance.id.clone(),
            generator: self.generator.state(),
        }
    }

    fn log_context(&self, tick: u64) -> LogContext<'_> {
        LogContext::new()
            .with_simulation(&self.settings.sim_id)
            .with_device_type(&self.settings.type_id)
            .with_device(&self.instance.id)
            .with_tick(tick)
    }
}
