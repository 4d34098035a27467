//! In-process simulation stand-ins for headless runs and CI.
//!
//! [`SimBus`] builds a [`MotorBus`] populated with [`SimMotor`]s that record
//! commands.  [`SimSimulator`] plays the role of the physics simulator: it
//! either accepts the connection and hands out a scriptable
//! [`SimCollisionSensor`], or refuses it to exercise the connection-error
//! path.
//!
//! # Example
//!
//! ```rust
//! use reachy_hal::sim::{SimBus, SimSimulator};
//! use reachy_hal::simulator::{Simulator, SimulatorConfig};
//!
//! let mut bus = SimBus::new().with_arm().build();
//! bus.set_motor_command("elbow_pitch", -90.0).unwrap();
//!
//! let sim = SimSimulator::new();
//! let sensor = sim.connect(&SimulatorConfig::default()).unwrap();
//! sim.sensor().set_colliding(true);
//! assert!(sensor.query_collision_state("Collision").unwrap());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use reachy_types::ReachyError;
use tracing::info;

use crate::bus::MotorBus;
use crate::motor::Motor;
use crate::simulator::{CollisionSensor, Simulator, SimulatorConfig};

/// Motor ids of one Reachy arm, shoulder to gripper.
pub const ARM_MOTORS: [&str; 8] = [
    "shoulder_pitch",
    "shoulder_roll",
    "arm_yaw",
    "elbow_pitch",
    "forearm_yaw",
    "wrist_pitch",
    "wrist_roll",
    "gripper",
];

// ────────────────────────────────────────────────────────────────────────────
// Simulated motor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated motor that records the most recent command and speed limit.
/// Always succeeds.
pub struct SimMotor {
    id: String,
    command: f32,
    speed_limit: f32,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            command: 0.0,
            speed_limit: 0.0,
        })
    }
}

impl Motor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_command(&mut self, value: f32) -> Result<(), ReachyError> {
        self.command = value;
        Ok(())
    }

    fn command(&self) -> f32 {
        self.command
    }

    fn set_speed_limit(&mut self, value: f32) -> Result<(), ReachyError> {
        self.speed_limit = value;
        Ok(())
    }

    fn speed_limit(&self) -> f32 {
        self.speed_limit
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated collision sensor
// ────────────────────────────────────────────────────────────────────────────

/// Collision sensor whose contact state is set by the test or demo driving
/// it.  Counts how many times it has been queried.
#[derive(Debug, Default)]
pub struct SimCollisionSensor {
    colliding: AtomicBool,
    queries: AtomicUsize,
}

impl SimCollisionSensor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_colliding(&self, colliding: bool) {
        self.colliding.store(colliding, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl CollisionSensor for SimCollisionSensor {
    fn query_collision_state(&self, _object_name: &str) -> Result<bool, ReachyError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.colliding.load(Ordering::SeqCst))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated simulator
// ────────────────────────────────────────────────────────────────────────────

/// In-process [`Simulator`].  Every successful connection shares the same
/// [`SimCollisionSensor`], reachable through [`SimSimulator::sensor`].
pub struct SimSimulator {
    reachable: bool,
    sensor: Arc<SimCollisionSensor>,
}

impl SimSimulator {
    /// A simulator that accepts connections.
    pub fn new() -> Self {
        Self {
            reachable: true,
            sensor: SimCollisionSensor::new(),
        }
    }

    /// A simulator that refuses every connection attempt.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            sensor: SimCollisionSensor::new(),
        }
    }

    pub fn sensor(&self) -> Arc<SimCollisionSensor> {
        Arc::clone(&self.sensor)
    }
}

impl Default for SimSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator for SimSimulator {
    fn connect(&self, config: &SimulatorConfig) -> Result<Arc<dyn CollisionSensor>, ReachyError> {
        if !self.reachable {
            return Err(ReachyError::Connection(format!(
                "no simulator listening on {}",
                config.address()
            )));
        }
        info!(address = %config.address(), scene = ?config.scene, "connected to in-process simulator");
        let sensor: Arc<dyn CollisionSensor> = self.sensor.clone();
        Ok(sensor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimBus builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that constructs a [`MotorBus`] pre-populated with simulated
/// motors.
#[derive(Default)]
pub struct SimBus {
    motors: Vec<Box<dyn Motor>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one simulated motor.
    pub fn with_motor(mut self, id: impl Into<String>) -> Self {
        self.motors.push(SimMotor::new(id));
        self
    }

    /// Add the simulated motors of one arm (see [`ARM_MOTORS`]).
    pub fn with_arm(self) -> Self {
        ARM_MOTORS.iter().fold(self, |bus, id| bus.with_motor(*id))
    }

    /// Add a custom driver, e.g. a test motor that fails on command.
    pub fn with_driver(mut self, motor: Box<dyn Motor>) -> Self {
        self.motors.push(motor);
        self
    }

    pub fn build(self) -> MotorBus {
        let mut bus = MotorBus::new();
        for m in self.motors {
            bus.register_motor(m);
        }
        bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_bus_with_arm_registers_every_motor() {
        let bus = SimBus::new().with_arm().build();
        assert_eq!(bus.len(), ARM_MOTORS.len());
        for id in ARM_MOTORS {
            assert_eq!(bus.command(id), Some(0.0));
        }
    }

    #[test]
    fn sim_motor_records_command_and_limit() {
        let mut motor = SimMotor::new("gripper");
        motor.set_command(12.0).unwrap();
        motor.set_speed_limit(50.0).unwrap();
        assert!((motor.command() - 12.0).abs() < f32::EPSILON);
        assert!((motor.speed_limit() - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn sim_sensor_reports_scripted_state() {
        let sensor = SimCollisionSensor::new();
        assert!(!sensor.query_collision_state("Collision").unwrap());
        sensor.set_colliding(true);
        assert!(sensor.query_collision_state("Collision").unwrap());
        assert_eq!(sensor.query_count(), 2);
    }

    #[test]
    fn connected_sensor_shares_state_with_simulator() {
        let sim = SimSimulator::new();
        let sensor = sim.connect(&SimulatorConfig::default()).unwrap();
        sim.sensor().set_colliding(true);
        assert!(sensor.query_collision_state("Collision").unwrap());
    }

    #[test]
    fn unreachable_simulator_returns_connection_error() {
        let sim = SimSimulator::unreachable();
        let result = sim.connect(&SimulatorConfig::default());
        match result {
            Err(ReachyError::Connection(msg)) => assert!(msg.contains("127.0.0.1:19997")),
            _ => panic!("expected connection error"),
        }
    }
}
