//! ---
//! iotsim_section: "11-simulation"
//! iotsim_subsection: "module"
//! iotsim_type: "source"
//! iotsim_scope: "code"
//! iotsim_description: "Vehicle state snapshot shared by the physics loop and generator."
//! iotsim_version: "v0.1.0"
//! iotsim_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum IgnitionStatus {
    Off,
    Accessory,
    #[default]
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GearLever {
    Park,
    Reverse,
    Neutral,
    #[default]
    Drive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransmissionGear {
    #[default]
    Neutral,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
}

impl TransmissionGear {
    const FORWARD: [TransmissionGear; 6] = [
        TransmissionGear::First,
        TransmissionGear::Second,
        TransmissionGear::Third,
        TransmissionGear::Fourth,
        TransmissionGear::Fifth,
        TransmissionGear::Sixth,
    ];
    /// Upshift speeds in km/h.
    const UPSHIFT_KMH: [f64; 5] = [15.0, 30.0, 50.0, 70.0, 90.0];
    const RATIOS: [f64; 6] = [3.5, 2.1, 1.4, 1.0, 0.8, 0.65];

    pub fn for_speed(speed_kmh: f64) -> Self {
        let index = Self::UPSHIFT_KMH
            .iter()
            .take_while(|threshold| speed_kmh >= **threshold)
            .count();
        Self::FORWARD[index]
    }

    /// Gearbox ratio, zero in neutral.
    pub fn ratio(self) -> f64 {
        Self::FORWARD
            .iter()
            .position(|gear| *gear == self)
            .map_or(0.0, |index| Self::RATIOS[index])
    }
}

/// What the driver is doing. Speeds are km/h, durations seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum DriverPhase {
    Accelerate { target: f64 },
    Cruise { target: f64, remaining: f64 },
    Brake { target: f64 },
    Idle { remaining: f64 },
    EndTrip,
}

/// Every signal the vehicle model exposes. Field names double as the
/// attribute names a payload spec may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleState {
    /// km/h
    pub vehicle_speed: f64,
    /// m/s²
    pub acceleration: f64,
    /// rpm
    pub engine_speed: f64,
    /// Nm
    pub torque_at_transmission: f64,
    /// percent
    pub accelerator_pedal_position: f64,
    /// percent
    pub brake_pedal_position: f64,
    pub brake_pedal_status: bool,
    pub transmission_gear_position: TransmissionGear,
    pub gear_lever_position: GearLever,
    pub ignition_status: IgnitionStatus,
    pub engine_running: bool,
    pub parking_brake_status: bool,
    /// km
    pub odometer: f64,
    /// percent of tank
    pub fuel_level: f64,
    /// litres
    pub fuel_consumed_since_restart: f64,
    /// °C
    pub oil_temp: f64,
    /// degrees clockwise from north
    pub heading: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Odometer reading when the current trip began.
    pub trip_start_odometer: f64,
    /// Trip length in km; the driver ends the trip once it is covered.
    pub trip_distance: Option<f64>,
    /// Unset until the driver first acts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_phase: Option<DriverPhase>,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            vehicle_speed: 0.0,
            acceleration: 0.0,
            engine_speed: 0.0,
            torque_at_transmission: 0.0,
            accelerator_pedal_position: 0.0,
            brake_pedal_position: 0.0,
            brake_pedal_status: false,
            transmission_gear_position: TransmissionGear::Neutral,
            gear_lever_position: GearLever::Drive,
            ignition_status: IgnitionStatus::Run,
            engine_running: true,
            parking_brake_status: false,
            odometer: 0.0,
            fuel_level: 100.0,
            fuel_consumed_since_restart: 0.0,
            oil_temp: 20.0,
            heading: 0.0,
            latitude: 38.9072,
            longitude: -77.0369,
            trip_start_odometer: 0.0,
            trip_distance: None,
            driver_phase: None,
        }
    }
}

impl VehicleState {
    pub fn is_ignition_on(&self) -> bool {
        self.ignition_status == IgnitionStatus::Run
    }

    pub fn trip_odometer(&self) -> f64 {
        (self.odometer - self.trip_start_odometer).max(0.0)
    }

    pub fn trip_finished(&self) -> bool {
        self.trip_distance
            .is_some_and(|limit| self.trip_odometer() >= limit)
    }

    /// Turn the vehicle off in place.
    pub fn switch_off(&mut self) {
        self.ignition_status = IgnitionStatus::Off;
        self.engine_running = false;
        self.engine_speed = 0.0;
        self.torque_at_transmission = 0.0;
        self.accelerator_pedal_position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gear_selection_follows_speed() {
        assert_eq!(TransmissionGear::for_speed(0.0), TransmissionGear::First);
        assert_eq!(TransmissionGear::for_speed(45.0), TransmissionGear::Third);
        assert_eq!(TransmissionGear::for_speed(130.0), TransmissionGear::Sixth);
        assert_eq!(TransmissionGear::Neutral.ratio(), 0.0);
    }

    #[test]
    fn snapshot_serializes_with_signal_names() {
        let state = VehicleState::default();
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["ignition_status"], json!("run"));
        assert_eq!(value["gear_lever_position"], json!("drive"));
        assert_eq!(value["fuel_level"], json!(100.0));
    }

    #[test]
    fn partial_snapshots_fill_defaults() {
        let state: VehicleState =
            serde_json::from_value(json!({"odometer": 1200.5, "ignition_status": "off"})).unwrap();
        assert_eq!(state.odometer, 1200.5);
        assert_eq!(state.ignition_status, IgnitionStatus::Off);
        assert_eq!(state.fuel_level, 100.0);
        assert_eq!(state.driver_phase, None);
    }

    #[test]
    fn driver_phase_is_tagged_in_snapshots() {
        let state = VehicleState {
            driver_phase: Some(DriverPhase::Cruise {
                target: 55.0,
                remaining: 12.5,
            }),
            ..VehicleState::default()
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value["driver_phase"],
            json!({"phase": "cruise", "target": 55.0, "remaining": 12.5})
        );
        let back: VehicleState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);

        let fresh = serde_json::to_value(VehicleState::default()).unwrap();
        assert!(fresh.get("driver_phase").is_none());
    }
}
