//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Primary orchestration and lifecycle management."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use iotsim_common::EngineConfig;
use iotsim_logging::{log_system_event, LogContext, SystemEventOutcome};
use iotsim_metrics::DeviceOutcomeLabel;
use iotsim_msg::QoS;
use iotsim_rt::RateLimiter;
use iotsim_schema::{
    DeviceTypeCheckpoint, DeviceTypeOutcome, DeviceTypeRequest, InstanceOutcome, Outcome,
    Simulation, Stage,
};
use iotsim_sim::{build_generator, GeneratorOptions};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::device::{device_id, DeviceInstance, DeviceRunner, RunnerHandle, RunnerServices, RunnerSettings};
use crate::error::{EngineError, EngineResult};
use crate::store::StageStore;

/// Engine tuning derived from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub stage_poll_interval: Duration,
    pub physics_step: Duration,
    pub random_seed: Option<u64>,
    pub qos: QoS,
    pub vehicle_trip_km: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            stage_poll_interval: config.stage_poll_interval,
            physics_step: config.physics_step,
            random_seed: config.random_seed,
            qos: QoS::try_from(config.qos).unwrap_or_default(),
            vehicle_trip_km: config.vehicle_trip_km,
        }
    }
}

/// Runs every instance of one device type for one invocation.
pub struct SimulationEngine {
    simulation: Arc<Simulation>,
    request: DeviceTypeRequest,
    settings: EngineSettings,
    services: RunnerServices,
    store: Arc<dyn StageStore>,
}

impl SimulationEngine {
    pub fn new(
        simulation: Arc<Simulation>,
        request: DeviceTypeRequest,
        settings: EngineSettings,
        services: RunnerServices,
        store: Arc<dyn StageStore>,
    ) -> Self {
        Self {
            simulation,
            request,
            settings,
            services,
            store,
        }
    }

    /// Run all instances and aggregate their outcomes in index order.
    ///
    /// Returns `"complete"` only when every instance finished. A publish
    /// failure, runner panic, or failed stage poll aborts the remaining
    /// runners and is returned as the error.
    pub async fn start(self) -> EngineResult<DeviceTypeOutcome> {
        self.simulation.validate()?;
        self.request.validate()?;

        let sim_id = self.simulation.sim_id.clone();
        let type_id = self.request.type_id.clone();
        let amount = self.request.amount as usize;
        let kind = self.simulation.generator_kind();
        let spec = Arc::new(self.request.info.clone());
        let runner_settings = RunnerSettings {
            sim_id: sim_id.clone(),
            type_id: type_id.clone(),
            interval: self.simulation.interval(),
            duration: self.simulation.duration(),
            qos: self.settings.qos,
        };

        let mut outcomes: Vec<Option<InstanceOutcome>> = vec![None; amount];
        let mut handles: Vec<RunnerHandle> = Vec::with_capacity(amount);
        let mut runners = JoinSet::new();
        let now = self.services.clock.now();

        for (index, slot) in outcomes.iter_mut().enumerate() {
            let id = device_id(&sim_id, &type_id, index);
            let instance = match self.request.prior_state(index) {
                Some(Outcome::Complete) => {
                    debug!(sim_id = %sim_id, device = %id, "instance already complete; not restarting");
                    if let Some(metrics) = &self.services.metrics {
                        metrics.record_outcome(&type_id, DeviceOutcomeLabel::Skipped);
                    }
                    *slot = Some(Outcome::Complete);
                    continue;
                }
                Some(Outcome::Checkpoint(checkpoint)) => {
                    if checkpoint.id != id {
                        warn!(expected = %id, found = %checkpoint.id, "checkpoint id differs from derived id");
                    }
                    DeviceInstance::resume(id, checkpoint.clone())
                }
                None => DeviceInstance::fresh(id, now),
            };

            let options = GeneratorOptions {
                seed: self
                    .settings
                    .random_seed
                    .map(|seed| seed.wrapping_add(index as u64)),
                physics_step: self.settings.physics_step,
                trip_distance_km: self.settings.vehicle_trip_km,
            };
            let generator = build_generator(kind, instance.generator.clone(), &options);
            let (runner, handle) = DeviceRunner::new(
                instance,
                runner_settings.clone(),
                Arc::clone(&spec),
                generator,
                self.services.clone(),
            );
            handles.push(handle);
            runners.spawn(async move { (index, runner.run().await) });
        }

        let context = LogContext::new()
            .with_simulation(&sim_id)
            .with_device_type(&type_id);
        info!(
            sim_id = %sim_id,
            type_id = %type_id,
            generator = %kind,
            active = runners.len(),
            amount,
            "device type started"
        );

        self.supervise(&mut runners, &mut outcomes, &handles, &context)
            .await?;

        let states = outcomes
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| outcome.ok_or(EngineError::RunnerLost { index }))
            .collect::<EngineResult<Vec<_>>>()?;

        if states.iter().all(Outcome::is_complete) {
            info!(sim_id = %sim_id, type_id = %type_id, "device type complete");
            return Ok(Outcome::Complete);
        }
        Ok(Outcome::Checkpoint(DeviceTypeCheckpoint {
            type_id,
            amount: self.request.amount,
            info: self.request.info,
            states,
        }))
    }

    /// Collect runner outcomes while polling the external stage.
    async fn supervise(
        &self,
        runners: &mut JoinSet<(usize, EngineResult<InstanceOutcome>)>,
        outcomes: &mut [Option<InstanceOutcome>],
        handles: &[RunnerHandle],
        context: &LogContext<'_>,
    ) -> EngineResult<()> {
        let mut poll = RateLimiter::new(self.settings.stage_poll_interval);

        while !runners.is_empty() {
            tokio::select! {
                joined = runners.join_next() => {
                    let Some(joined) = joined else { break };
                    let (index, outcome) = joined?;
                    match outcome {
                        Ok(outcome) => outcomes[index] = Some(outcome),
                        Err(err) => {
                            log_system_event(Some(context), "engine.runner", &err.to_string(), SystemEventOutcome::Fault);
                            runners.abort_all();
                            return Err(err);
                        }
                    }
                }
                _ = poll.tick() => {
                    let record = self.poll_stage().await.inspect_err(|err| {
                        log_system_event(Some(context), "engine.stage_poll", &err.to_string(), SystemEventOutcome::Fault);
                        runners.abort_all();
                    })?;
                    if record.stage == Stage::Stopping {
                        let pending: Vec<&RunnerHandle> =
                            handles.iter().filter(|handle| !handle.is_stopped()).collect();
                        if !pending.is_empty() {
                            info!(sim_id = %record.sim_id, runners = pending.len(), "stop requested; stopping active runners");
                        }
                        for handle in pending {
                            debug!(device = handle.device(), "stop sent");
                            handle.stop();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn poll_stage(&self) -> EngineResult<Simulation> {
        let sim_id = &self.simulation.sim_id;
        let result = self.store.get(sim_id).await;
        let label = match &result {
            Ok(Some(record)) => record.stage.as_ref().to_owned(),
            Ok(None) => "missing".to_owned(),
            Err(_) => "error".to_owned(),
        };
        if let Some(metrics) = &self.services.metrics {
            metrics.record_stage_poll(&label);
        }
        debug!(sim_id = %sim_id, result = %label, "stage polled");
        match result {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(EngineError::SimulationMissing {
                sim_id: sim_id.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}
