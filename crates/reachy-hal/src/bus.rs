//! [`MotorBus`] – registry of motors and command sink.
//!
//! The bus stores every registered [`Motor`] by id.  The primitive manager
//! writes each tick's [`CombinedCommand`] through [`MotorBus::apply`]; setup
//! code uses [`MotorBus::set_speed_limit_all`] to configure moving speeds.
//!
//! Motors absent from a combined command are not written, so they keep
//! whatever target the driver last received.

use std::collections::BTreeMap;

use reachy_types::{CombinedCommand, ReachyError};
use tracing::warn;

use crate::motor::Motor;

/// Motor registry and command dispatcher.
#[derive(Default)]
pub struct MotorBus {
    motors: BTreeMap<String, Box<dyn Motor>>,
}

impl MotorBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a motor driver.  Any previously registered driver with the
    /// same id is replaced.
    pub fn register_motor(&mut self, motor: Box<dyn Motor>) {
        self.motors.insert(motor.id().to_string(), motor);
    }

    /// Ids of every registered motor, sorted.
    pub fn list_motors(&self) -> Vec<String> {
        self.motors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    /// # Errors
    ///
    /// [`ReachyError::HardwareFault`] when `motor_id` is not registered or the
    /// driver rejects the value.
    pub fn set_motor_command(&mut self, motor_id: &str, value: f32) -> Result<(), ReachyError> {
        self.motor_mut(motor_id)?.set_command(value)
    }

    /// # Errors
    ///
    /// [`ReachyError::HardwareFault`] when `motor_id` is not registered or the
    /// driver rejects the value.
    pub fn set_speed_limit(&mut self, motor_id: &str, value: f32) -> Result<(), ReachyError> {
        self.motor_mut(motor_id)?.set_speed_limit(value)
    }

    /// Apply the same speed limit to every registered motor, stopping at the
    /// first driver error.
    pub fn set_speed_limit_all(&mut self, value: f32) -> Result<(), ReachyError> {
        for motor in self.motors.values_mut() {
            motor.set_speed_limit(value)?;
        }
        Ok(())
    }

    pub fn command(&self, motor_id: &str) -> Option<f32> {
        self.motors.get(motor_id).map(|m| m.command())
    }

    pub fn speed_limit(&self, motor_id: &str) -> Option<f32> {
        self.motors.get(motor_id).map(|m| m.speed_limit())
    }

    /// Write every value of `combined` to its motor.
    ///
    /// A failing motor does not prevent the others from being written; the
    /// per-motor errors are logged and returned.
    pub fn apply(&mut self, combined: &CombinedCommand) -> Vec<ReachyError> {
        let mut failures = Vec::new();
        for (motor_id, value) in combined.iter() {
            if let Err(e) = self.set_motor_command(motor_id, value) {
                warn!(motor = motor_id, error = %e, "failed to write combined command");
                failures.push(e);
            }
        }
        failures
    }

    fn motor_mut(&mut self, motor_id: &str) -> Result<&mut Box<dyn Motor>, ReachyError> {
        self.motors
            .get_mut(motor_id)
            .ok_or_else(|| ReachyError::HardwareFault {
                component: motor_id.to_string(),
                details: format!("motor '{motor_id}' is not registered"),
            })
    }
}
