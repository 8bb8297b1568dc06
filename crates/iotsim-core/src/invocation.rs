//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Invocation entrypoint aggregating device type engines."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;

use futures::future::try_join_all;
use iotsim_logging::{log_system_event, LogContext, SystemEventOutcome};
use iotsim_schema::{InvocationRequest, InvocationResult};
use tracing::info;

use crate::device::RunnerServices;
use crate::engine::{EngineSettings, SimulationEngine};
use crate::error::EngineResult;
use crate::store::StageStore;

/// Everything an invocation needs besides its request payload.
#[derive(Clone)]
pub struct InvocationEnv {
    pub settings: EngineSettings,
    pub services: RunnerServices,
    pub store: Arc<dyn StageStore>,
}

/// Run one invocation: one engine per device type, all concurrently.
///
/// The result echoes the simulation record and sets `options.restart` when any
/// device type still has work left.
pub async fn run_invocation(
    request: InvocationRequest,
    env: InvocationEnv,
) -> EngineResult<InvocationResult> {
    let InvocationRequest {
        simulation,
        devices,
        options,
    } = request;
    simulation.validate()?;
    for device in &devices {
        device.validate()?;
    }

    info!(
        sim_id = %simulation.sim_id,
        device_types = devices.len(),
        resumed = options.restart,
        "invocation started"
    );

    let shared = Arc::new(simulation.clone());
    let engines = devices.into_iter().map(|request| {
        SimulationEngine::new(
            Arc::clone(&shared),
            request,
            env.settings.clone(),
            env.services.clone(),
            Arc::clone(&env.store),
        )
        .start()
    });
    let context = LogContext::new().with_simulation(&simulation.sim_id);
    let outcomes = match try_join_all(engines).await {
        Ok(outcomes) => outcomes,
        Err(err) => {
            log_system_event(
                Some(&context),
                "invocation.finish",
                &err.to_string(),
                SystemEventOutcome::Fault,
            );
            return Err(err);
        }
    };

    let result = InvocationResult::new(simulation.clone(), outcomes);
    log_system_event(
        Some(&context),
        "invocation.finish",
        if result.options.restart {
            "invocation checkpointed"
        } else {
            "simulation complete"
        },
        SystemEventOutcome::Success,
    );
    Ok(result)
}
