//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Longitudinal vehicle dynamics and randomized driver."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
//! Vehicle dynamics integrated on a background tokio task.
//!
//! The model is a point mass with rolling and aerodynamic resistance, a
//! six-speed gearbox for engine speed and torque, and a linear fuel burn.
//! A randomized driver works the pedals in accelerate, cruise and brake
//! phases. [`step`] itself is deterministic; all randomness lives in the driver.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use iotsim_rt::RateLimiter;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::StandardNormal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::state::{DriverPhase, GearLever, IgnitionStatus, TransmissionGear, VehicleState};

const MAX_DRIVE_ACCEL: f64 = 3.5;
const MAX_BRAKE_DECEL: f64 = 8.0;
const ROLLING_RESISTANCE: f64 = 0.12;
const AERO_DRAG: f64 = 0.0004;
const FINAL_DRIVE: f64 = 3.7;
const WHEEL_RADIUS_M: f64 = 0.33;
const IDLE_RPM: f64 = 800.0;
const MAX_RPM: f64 = 6500.0;
const IDLE_TORQUE_NM: f64 = 30.0;
const MAX_ENGINE_TORQUE_NM: f64 = 320.0;
const IDLE_BURN_LPS: f64 = 0.0002;
const FULL_BURN_LPS: f64 = 0.004;
const TANK_LITRES: f64 = 55.0;
const AMBIENT_C: f64 = 20.0;
const OIL_TIME_CONSTANT_S: f64 = 240.0;
const METRES_PER_DEGREE: f64 = 111_320.0;
const MEAN_CRUISE_KMH: f64 = 60.0;
const CRUISE_SPREAD_KMH: f64 = 20.0;

/// Advance the vehicle by `dt` seconds given the current pedal inputs.
pub fn step(state: &VehicleState, dt: f64) -> VehicleState {
    let mut next = state.clone();
    if dt <= 0.0 {
        return next;
    }
    let powered = state.engine_running && state.ignition_status == IgnitionStatus::Run;
    let speed = state.vehicle_speed / 3.6;

    let drive = if powered && state.gear_lever_position == GearLever::Drive {
        state.accelerator_pedal_position.clamp(0.0, 100.0) / 100.0 * MAX_DRIVE_ACCEL
    } else {
        0.0
    };
    let mut braking = state.brake_pedal_position.clamp(0.0, 100.0) / 100.0 * MAX_BRAKE_DECEL;
    if state.parking_brake_status {
        braking += MAX_BRAKE_DECEL;
    }
    let resistance = if speed > 0.0 {
        ROLLING_RESISTANCE + AERO_DRAG * speed * speed
    } else {
        0.0
    };
    let next_speed = (speed + (drive - braking - resistance) * dt).max(0.0);

    next.acceleration = (next_speed - speed) / dt;
    next.vehicle_speed = next_speed * 3.6;
    next.brake_pedal_status = state.brake_pedal_position > 0.0;

    let distance_m = (speed + next_speed) / 2.0 * dt;
    next.odometer += distance_m / 1000.0;
    let heading = state.heading.to_radians();
    next.latitude += distance_m * heading.cos() / METRES_PER_DEGREE;
    next.longitude +=
        distance_m * heading.sin() / (METRES_PER_DEGREE * state.latitude.to_radians().cos().max(1e-6));

    let pedal = state.accelerator_pedal_position.clamp(0.0, 100.0) / 100.0;
    let burn = if powered {
        let gear = TransmissionGear::for_speed(next.vehicle_speed);
        let wheel_rpm = next_speed / (2.0 * PI * WHEEL_RADIUS_M) * 60.0;
        next.transmission_gear_position = gear;
        next.engine_speed = (wheel_rpm * gear.ratio() * FINAL_DRIVE).clamp(IDLE_RPM, MAX_RPM);
        next.torque_at_transmission =
            (IDLE_TORQUE_NM + pedal * MAX_ENGINE_TORQUE_NM) * gear.ratio();
        IDLE_BURN_LPS + pedal * FULL_BURN_LPS
    } else {
        next.transmission_gear_position = TransmissionGear::Neutral;
        next.engine_speed = 0.0;
        next.torque_at_transmission = 0.0;
        0.0
    };

    next.fuel_consumed_since_restart += burn * dt;
    next.fuel_level -= burn * dt / TANK_LITRES * 100.0;
    if next.fuel_level <= 0.0 {
        next.fuel_level = 0.0;
        next.engine_running = false;
    }

    let oil_target = if powered { 90.0 + 20.0 * pedal } else { AMBIENT_C };
    next.oil_temp += (oil_target - state.oil_temp) * (dt / OIL_TIME_CONSTANT_S).min(1.0);
    next
}

/// Randomized pedal inputs. The current phase lives in the snapshot so a
/// resumed vehicle carries on where it was checkpointed.
#[derive(Debug)]
struct Driver {
    rng: StdRng,
}

impl Driver {
    fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    fn act(&mut self, state: &mut VehicleState, dt: f64) {
        if !(state.engine_running && state.is_ignition_on()) {
            state.accelerator_pedal_position = 0.0;
            return;
        }
        if state.trip_finished() {
            state.driver_phase = Some(DriverPhase::EndTrip);
        }
        let speed = state.vehicle_speed;
        let phase = match state.driver_phase {
            Some(phase) => phase,
            None => DriverPhase::Accelerate {
                target: cruise_target(&mut self.rng),
            },
        };
        let (accelerator, brake, next) = match phase {
            DriverPhase::Accelerate { target } => {
                let pedal = (30.0 + (target - speed) * 1.5).clamp(20.0, 80.0);
                let next = (speed >= target).then(|| DriverPhase::Cruise {
                    target,
                    remaining: self.rng.gen_range(20.0..90.0),
                });
                (pedal, 0.0, next)
            }
            DriverPhase::Cruise { target, remaining } => {
                let pedal = (18.0 + (target - speed) * 3.0).clamp(0.0, 60.0);
                state.heading = (state.heading + self.rng.sample::<f64, _>(StandardNormal) * 0.5 * dt)
                    .rem_euclid(360.0);
                let remaining = remaining - dt;
                let next = if remaining > 0.0 {
                    DriverPhase::Cruise { target, remaining }
                } else if self.rng.gen_bool(0.25) {
                    DriverPhase::Brake { target: 0.0 }
                } else if self.rng.gen_bool(0.5) {
                    DriverPhase::Brake {
                        target: target * 0.6,
                    }
                } else {
                    DriverPhase::Accelerate {
                        target: cruise_target(&mut self.rng),
                    }
                };
                (pedal, 0.0, Some(next))
            }
            DriverPhase::Brake { target } => {
                let next = (speed <= target).then(|| {
                    if target <= 0.5 {
                        DriverPhase::Idle {
                            remaining: self.rng.gen_range(3.0..15.0),
                        }
                    } else {
                        DriverPhase::Cruise {
                            target,
                            remaining: self.rng.gen_range(10.0..40.0),
                        }
                    }
                });
                (0.0, 35.0, next)
            }
            DriverPhase::Idle { remaining } => {
                let remaining = remaining - dt;
                let next = if remaining > 0.0 {
                    DriverPhase::Idle { remaining }
                } else {
                    DriverPhase::Accelerate {
                        target: cruise_target(&mut self.rng),
                    }
                };
                (0.0, 15.0, Some(next))
            }
            DriverPhase::EndTrip => {
                if speed <= 0.0 {
                    debug!(odometer = state.odometer, "trip finished; switching ignition off");
                    state.switch_off();
                    state.gear_lever_position = GearLever::Park;
                    state.parking_brake_status = true;
                    state.brake_pedal_position = 0.0;
                    return;
                }
                (0.0, 50.0, None)
            }
        };
        state.accelerator_pedal_position = accelerator;
        state.brake_pedal_position = brake;
        state.driver_phase = Some(next.unwrap_or(phase));
    }
}

fn cruise_target<R: Rng>(rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    (MEAN_CRUISE_KMH + CRUISE_SPREAD_KMH * z).clamp(20.0, 120.0)
}

#[derive(Debug)]
struct Shared {
    state: VehicleState,
    driver: Driver,
    active: bool,
}

impl Shared {
    fn advance(&mut self, dt: f64) {
        self.driver.act(&mut self.state, dt);
        self.state = step(&self.state, dt);
    }
}

/// Vehicle model with a live, lock-protected snapshot.
#[derive(Debug)]
pub struct DynamicsModel {
    shared: Arc<Mutex<Shared>>,
    step: Duration,
    physics_loop: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl DynamicsModel {
    /// Build from a prior snapshot, restarting the engine unless the tank is empty.
    pub fn new(
        prior: Option<VehicleState>,
        rng: StdRng,
        step: Duration,
        trip_distance_km: Option<f64>,
    ) -> Self {
        let mut state = match prior {
            Some(mut state) => {
                if state.fuel_level > 0.0 {
                    state.ignition_status = IgnitionStatus::Run;
                    state.engine_running = true;
                    state.gear_lever_position = GearLever::Drive;
                    state.parking_brake_status = false;
                }
                state
            }
            None => VehicleState::default(),
        };
        if state.trip_distance.is_none() && trip_distance_km.is_some() {
            state.trip_distance = trip_distance_km;
            state.trip_start_odometer = state.odometer;
        }
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state,
                driver: Driver::new(rng),
                active: false,
            })),
            step,
            physics_loop: None,
        }
    }

    pub fn snapshot(&self) -> VehicleState {
        self.shared.lock().state.clone()
    }

    /// Mutate the live snapshot under the model lock.
    pub fn update<F: FnOnce(&mut VehicleState)>(&self, apply: F) {
        apply(&mut self.shared.lock().state);
    }

    /// Run one driver and integration step of `dt` synchronously.
    pub fn advance(&self, dt: Duration) {
        self.shared.lock().advance(dt.as_secs_f64());
    }

    pub fn is_looping(&self) -> bool {
        self.physics_loop.is_some()
    }

    /// Spawn the background integration loop on the current tokio runtime.
    pub fn start_physics_loop(&mut self) {
        if self.physics_loop.is_some() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "no tokio runtime; physics loop not started");
                return;
            }
        };
        self.shared.lock().active = true;
        let shared = Arc::clone(&self.shared);
        let period = self.step;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let mut limiter = RateLimiter::new(period);
            let dt = period.as_secs_f64();
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = limiter.tick() => {
                        let mut guard = shared.lock();
                        if !guard.active {
                            break;
                        }
                        guard.advance(dt);
                    }
                }
            }
            trace!(steps = limiter.ticks(), "physics loop exited");
        });
        self.physics_loop = Some((stop_tx, handle));
    }

    /// Halt the background loop. No step runs after this returns.
    pub fn stop_physics_loop(&mut self) {
        self.shared.lock().active = false;
        if let Some((stop_tx, _handle)) = self.physics_loop.take() {
            let _ = stop_tx.send(());
        }
    }
}

impl Drop for DynamicsModel {
    fn drop(&mut self) {
        self.stop_physics_loop();
    }
}
