//! ---
//! iotsim_section: "01-core-functionality"
//! iotsim_subsection: "tests"
//! iotsim_type: "source"
//! iotsim_scope: "test"
//! iotsim_description: "Engine lifecycle, checkpoint and stage poll integration tests."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use iotsim_core::{
    run_invocation, EngineError, EngineSettings, InMemoryStageStore, InvocationEnv, RunnerServices,
    SimulationEngine,
};
use iotsim_metrics::{new_registry, render_text, EngineMetrics};
use iotsim_msg::InMemoryPublisher;
use iotsim_rt::{Deadline, SharedRemainingTime, TokioClock};
use iotsim_schema::{
    DeviceStage, DeviceTypeRequest, DeviceTypeSpec, GeneratorKind, InstanceOutcome,
    InvocationOptions, InvocationRequest, Outcome, Simulation, Stage,
};
use serde_json::json;
use tokio::time::Instant;

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn plenty_of_time() -> SharedRemainingTime {
    Arc::new(|| Duration::from_secs(24 * 3600))
}

fn services(publisher: &InMemoryPublisher, remaining: SharedRemainingTime) -> RunnerServices {
    RunnerServices {
        publisher: Arc::new(publisher.clone()),
        clock: Arc::new(TokioClock::anchored_at(anchor())),
        remaining,
        metrics: None,
    }
}

fn settings(poll_secs: u64) -> EngineSettings {
    EngineSettings {
        stage_poll_interval: Duration::from_secs(poll_secs),
        random_seed: Some(42),
        ..EngineSettings::default()
    }
}

fn sensor_spec() -> DeviceTypeSpec {
    DeviceTypeSpec::new(
        "plant/line1",
        vec![
            json!({"name": "pressure", "type": "float", "min": 1, "max": 5}),
            json!({"name": "running", "type": "bool"}),
        ],
    )
}

fn engine(
    simulation: Simulation,
    request: DeviceTypeRequest,
    publisher: &InMemoryPublisher,
    remaining: SharedRemainingTime,
    store: InMemoryStageStore,
    poll_secs: u64,
) -> SimulationEngine {
    SimulationEngine::new(
        Arc::new(simulation),
        request,
        settings(poll_secs),
        services(publisher, remaining),
        Arc::new(store),
    )
}

fn checkpoints(outcome: &Outcome<iotsim_schema::DeviceTypeCheckpoint>) -> &[InstanceOutcome] {
    &outcome.checkpoint().expect("device type checkpoint").states
}

#[tokio::test(start_paused = true)]
async fn tick_count_is_bounded_by_duration_over_interval() {
    let simulation = Simulation::new("abc123", Stage::Running, 2, 9);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("xyz987", 1, sensor_spec());

    let outcome = engine(simulation, request, &publisher, plenty_of_time(), store, 30)
        .start()
        .await
        .unwrap();

    assert!(outcome.is_complete());
    let ticks = publisher.len();
    assert!(ticks <= 5, "expected at most ceil(9/2) ticks, got {ticks}");
    assert_eq!(ticks, 4);
    let payload = publisher.messages()[0].json().unwrap();
    assert_eq!(payload["_id_"], "abcxyz0");
    assert_eq!(publisher.messages()[0].topic, "plant/line1");
}

#[tokio::test(start_paused = true)]
async fn devices_get_deterministic_ids() {
    let simulation = Simulation::new("abc123", Stage::Running, 1, 3);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("xyz987", 3, sensor_spec());

    engine(simulation, request, &publisher, plenty_of_time(), store, 30)
        .start()
        .await
        .unwrap();

    for id in ["abcxyz0", "abcxyz1", "abcxyz2"] {
        assert_eq!(publisher.messages_for_device(id).len(), 3, "device {id}");
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_checkpoints_every_instance_in_order() {
    let simulation = Simulation::new("sim-budget", Stage::Running, 2, 100);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("meter", 3, sensor_spec());
    let deadline: SharedRemainingTime = Arc::new(Deadline::after(Duration::from_secs(7)));

    let outcome = engine(simulation, request.clone(), &publisher, deadline, store, 30)
        .start()
        .await
        .unwrap();

    assert_eq!(publisher.len(), 6);
    let checkpoint = outcome.checkpoint().expect("checkpoint");
    assert_eq!(checkpoint.type_id, "meter");
    assert_eq!(checkpoint.amount, 3);
    assert_eq!(checkpoint.info, request.info);
    let states = checkpoints(&outcome);
    assert_eq!(states.len(), 3);
    for (index, state) in states.iter().enumerate() {
        let device = state.checkpoint().expect("instance checkpoint");
        assert_eq!(device.id, format!("simmet{index}"));
        assert_eq!(device.stage, DeviceStage::Running);
        assert_eq!(device.started, anchor());
    }
}

#[tokio::test(start_paused = true)]
async fn stopping_stage_checkpoints_runners_within_one_poll() {
    let simulation = Simulation::new("sim-stop", Stage::Running, 1, 3600);
    let store = InMemoryStageStore::with(simulation.clone().tap_stage(Stage::Stopping));
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("pump", 4, sensor_spec());
    let started = Instant::now();

    let outcome = engine(simulation, request, &publisher, plenty_of_time(), store, 5)
        .start()
        .await
        .unwrap();

    assert!(started.elapsed() <= Duration::from_secs(5));
    let states = checkpoints(&outcome);
    assert_eq!(states.len(), 4);
    for state in states {
        let device = state.checkpoint().expect("stopped runner checkpoints");
        assert_eq!(device.stage, DeviceStage::Sleeping);
    }
    assert!(publisher.len() <= 4 * 5);
}

#[tokio::test(start_paused = true)]
async fn stage_flipped_mid_run_stops_publishing_runners() {
    let simulation = Simulation::new("sim-flip", Stage::Running, 1, 3600);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("valve", 2, sensor_spec());
    let started = Instant::now();

    let run = engine(simulation, request, &publisher, plenty_of_time(), store.clone(), 5).start();
    let flip = async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        let published = publisher.len();
        assert!(published > 0, "runners should publish before the stop");
        assert!(store.set_stage("sim-flip", Stage::Stopping));
        published
    };
    let (outcome, published_before_stop) = tokio::join!(run, flip);
    let outcome = outcome.unwrap();

    assert!(started.elapsed() <= Duration::from_secs(3 + 5));
    let states = checkpoints(&outcome);
    assert_eq!(states.len(), 2);
    for state in states {
        let device = state.checkpoint().expect("stopped runner checkpoints");
        assert_eq!(device.stage, DeviceStage::Sleeping);
    }
    assert!(publisher.len() >= published_before_stop);
    assert!(publisher.len() <= 2 * 8);
}

#[tokio::test(start_paused = true)]
async fn complete_instances_are_never_restarted() {
    let simulation = Simulation::new("abc123", Stage::Running, 1, 5);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let deadline: SharedRemainingTime = Arc::new(Deadline::after(Duration::from_secs(3)));
    let first = engine(
        simulation.clone(),
        DeviceTypeRequest::new("xyz987", 2, sensor_spec()),
        &publisher,
        deadline,
        store.clone(),
        30,
    )
    .start()
    .await
    .unwrap();
    let mut states = checkpoints(&first).to_vec();
    states[0] = Outcome::Complete;

    let resumed_publisher = InMemoryPublisher::new();
    let resumed = engine(
        simulation,
        DeviceTypeRequest::new("xyz987", 2, sensor_spec()).with_states(states),
        &resumed_publisher,
        plenty_of_time(),
        store,
        30,
    )
    .start()
    .await
    .unwrap();

    assert!(resumed.is_complete());
    assert!(resumed_publisher.messages_for_device("abcxyz0").is_empty());
    assert!(!resumed_publisher.messages_for_device("abcxyz1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn resumed_instances_keep_their_start_time() {
    let simulation = Simulation::new("abc123", Stage::Running, 1, 5);
    let store = Arc::new(InMemoryStageStore::with(simulation.clone()));
    let clock = Arc::new(TokioClock::anchored_at(anchor()));
    let publisher = InMemoryPublisher::new();
    let first_services = RunnerServices {
        publisher: Arc::new(publisher.clone()),
        clock: clock.clone(),
        remaining: Arc::new(Deadline::after(Duration::from_secs(3))),
        metrics: None,
    };
    let first = SimulationEngine::new(
        Arc::new(simulation.clone()),
        DeviceTypeRequest::new("xyz987", 1, sensor_spec()),
        settings(30),
        first_services,
        store.clone(),
    )
    .start()
    .await
    .unwrap();
    assert_eq!(publisher.len(), 2);

    let resumed_publisher = InMemoryPublisher::new();
    let resumed_services = RunnerServices {
        publisher: Arc::new(resumed_publisher.clone()),
        clock,
        remaining: plenty_of_time(),
        metrics: None,
    };
    let resumed = SimulationEngine::new(
        Arc::new(simulation),
        DeviceTypeRequest::new("xyz987", 1, sensor_spec()).with_states(checkpoints(&first).to_vec()),
        settings(30),
        resumed_services,
        store,
    )
    .start()
    .await
    .unwrap();

    // Elapsed time is measured from the original start, so only ticks four
    // and five of the five second window remain.
    assert!(resumed.is_complete());
    assert_eq!(resumed_publisher.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn publish_failure_is_fatal() {
    let simulation = Simulation::new("sim-fail", Stage::Running, 1, 60);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::fail_after(3);
    let request = DeviceTypeRequest::new("valve", 2, sensor_spec());

    let err = engine(simulation, request, &publisher, plenty_of_time(), store, 30)
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Publish(_)), "unexpected error {err}");
}

#[tokio::test(start_paused = true)]
async fn missing_simulation_record_is_fatal() {
    let simulation = Simulation::new("sim-gone", Stage::Running, 1, 600);
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("valve", 1, sensor_spec());

    let err = engine(
        simulation,
        request,
        &publisher,
        plenty_of_time(),
        InMemoryStageStore::new(),
        3,
    )
    .start()
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::SimulationMissing { ref sim_id } if sim_id == "sim-gone"));
}

#[tokio::test(start_paused = true)]
async fn stage_store_failure_is_fatal() {
    let simulation = Simulation::new("sim-throttled", Stage::Running, 1, 600);
    let store = InMemoryStageStore::with(simulation.clone());
    store.fail_with("read capacity exceeded");
    let publisher = InMemoryPublisher::new();
    let request = DeviceTypeRequest::new("valve", 1, sensor_spec());

    let err = engine(simulation, request, &publisher, plenty_of_time(), store, 3)
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StageStore(_)));
}

#[tokio::test(start_paused = true)]
async fn invalid_requests_are_rejected() {
    let simulation = Simulation::new("sim-bad", Stage::Running, 1, 10);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();

    let too_many = DeviceTypeRequest::new("valve", 101, sensor_spec());
    let err = engine(simulation.clone(), too_many, &publisher, plenty_of_time(), store.clone(), 3)
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let short_states =
        DeviceTypeRequest::new("valve", 2, sensor_spec()).with_states(vec![Outcome::Complete]);
    let err = engine(simulation, short_states, &publisher, plenty_of_time(), store, 3)
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let zero_interval = Simulation::new("sim-bad", Stage::Running, 0, 10);
    let err = engine(
        zero_interval,
        DeviceTypeRequest::new("valve", 1, sensor_spec()),
        &publisher,
        plenty_of_time(),
        InMemoryStageStore::new(),
        3,
    )
    .start()
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test(start_paused = true)]
async fn invocation_aggregates_device_types_and_sets_restart() {
    let mut simulation = Simulation::new("sim-inv", Stage::Running, 2, 4);
    simulation
        .extra
        .insert("owner".into(), json!("plant-ops"));
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let registry = new_registry();
    let metrics = Arc::new(EngineMetrics::new(registry.clone()).unwrap());
    let mut services = services(&publisher, plenty_of_time());
    services.metrics = Some(metrics);
    let env = InvocationEnv {
        settings: settings(30),
        services,
        store: Arc::new(store),
    };

    let request = InvocationRequest {
        simulation: simulation.clone(),
        devices: vec![
            DeviceTypeRequest::new("pump", 2, sensor_spec()),
            DeviceTypeRequest::new("fan", 1, sensor_spec()),
        ],
        options: InvocationOptions::default(),
    };
    let result = run_invocation(request, env.clone()).await.unwrap();
    assert!(!result.options.restart);
    assert_eq!(result.devices.len(), 2);
    assert!(result.devices.iter().all(Outcome::is_complete));
    assert_eq!(result.simulation, simulation);
    assert_eq!(publisher.len(), 3 * 2);

    let text = render_text(&registry).unwrap();
    assert!(text.contains("iotsim_messages_published_total{device_type=\"pump\"} 4"));
    assert!(text.contains("iotsim_devices_active{device_type=\"pump\"} 0"));

    let mut budgeted = env;
    let short_budget: SharedRemainingTime = Arc::new(Deadline::after(Duration::from_secs(1)));
    budgeted.services.remaining = short_budget;
    let request = InvocationRequest {
        simulation: simulation.clone(),
        devices: vec![DeviceTypeRequest::new("pump", 1, sensor_spec())],
        options: InvocationOptions { restart: false },
    };
    let result = run_invocation(request, budgeted).await.unwrap();
    assert!(result.options.restart);
    let encoded = serde_json::to_value(&result).unwrap();
    assert_eq!(encoded["options"]["restart"], json!(true));
    assert_eq!(encoded["simulation"]["owner"], json!("plant-ops"));
    assert_eq!(encoded["devices"][0]["typeId"], json!("pump"));
}

#[tokio::test(start_paused = true)]
async fn vehicle_identity_survives_resume() {
    let simulation =
        Simulation::new("sim-car", Stage::Running, 1, 600).with_generator(GeneratorKind::Vehicle);
    let store = InMemoryStageStore::with(simulation.clone());
    let spec = DeviceTypeSpec::new(
        "connectedcar/trip",
        vec![
            json!({"name": "vehicle_speed", "precision": 0.1}),
            json!({"name": "odometer", "precision": 0.001}),
            json!({"name": "location"}),
        ],
    );

    let publisher = InMemoryPublisher::new();
    let deadline: SharedRemainingTime = Arc::new(Deadline::after(Duration::from_secs(4)));
    let first = engine(
        simulation.clone(),
        DeviceTypeRequest::new("car", 1, spec.clone()),
        &publisher,
        deadline,
        store.clone(),
        30,
    )
    .start()
    .await
    .unwrap();
    let states = checkpoints(&first).to_vec();
    let before = publisher.messages()[0].json().unwrap();

    let resumed_publisher = InMemoryPublisher::new();
    let deadline: SharedRemainingTime = Arc::new(Deadline::after(Duration::from_secs(4)));
    engine(
        simulation,
        DeviceTypeRequest::new("car", 1, spec).with_states(states),
        &resumed_publisher,
        deadline,
        store,
        30,
    )
    .start()
    .await
    .unwrap();
    let after = resumed_publisher.messages()[0].json().unwrap();

    assert_eq!(before["VIN"], after["VIN"]);
    assert_eq!(before["trip_id"], after["trip_id"]);
    assert_eq!(after["_id_"], "simcar0");
    assert!(after["odometer"].as_f64().unwrap() >= before["odometer"].as_f64().unwrap());
}

#[tokio::test(start_paused = true)]
async fn vehicle_completes_when_trip_distance_is_covered() {
    let simulation =
        Simulation::new("sim-trip", Stage::Running, 1, 3600).with_generator(GeneratorKind::Vehicle);
    let store = InMemoryStageStore::with(simulation.clone());
    let publisher = InMemoryPublisher::new();
    let spec = DeviceTypeSpec::new(
        "connectedcar/trip",
        vec![json!({"name": "vehicle_speed"}), json!({"name": "odometer"})],
    );
    let started = Instant::now();

    let outcome = SimulationEngine::new(
        Arc::new(simulation),
        DeviceTypeRequest::new("car", 1, spec),
        EngineSettings {
            vehicle_trip_km: Some(0.05),
            ..settings(30)
        },
        services(&publisher, plenty_of_time()),
        Arc::new(store),
    )
    .start()
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert!(started.elapsed() < Duration::from_secs(3600));
    assert!(!publisher.is_empty());
    let last = publisher.messages().last().unwrap().json().unwrap();
    assert!(last["odometer"].as_f64().unwrap() > 0.0);
}

trait TapStage {
    fn tap_stage(self, stage: Stage) -> Self;
}

impl TapStage for Simulation {
    fn tap_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}
