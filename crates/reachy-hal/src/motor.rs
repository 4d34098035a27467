//! Generic `Motor` trait for the joints the core commands.
//!
//! Drivers implement this trait and register themselves with a
//! [`MotorBus`][crate::bus::MotorBus].  The arbitration layer only ever
//! writes through the bus, so drivers can be swapped without touching
//! primitives or the manager.

use reachy_types::ReachyError;

/// A commandable motor on the robot's bus.
///
/// The meaning of the command value (goal position in degrees, velocity, …)
/// is the driver's convention; the core only sums and forwards it.
pub trait Motor: Send + Sync {
    /// Stable identifier for this motor, e.g. `"r_shoulder_pitch"`.
    fn id(&self) -> &str;

    /// Write a new target value.
    ///
    /// # Errors
    ///
    /// Returns [`ReachyError::HardwareFault`] if the driver rejects the
    /// command (fault state, out of range, bus error).
    fn set_command(&mut self, value: f32) -> Result<(), ReachyError>;

    /// The most recently written target value.
    fn command(&self) -> f32;

    /// Set the maximum moving speed used when reaching the target.
    ///
    /// # Errors
    ///
    /// Returns [`ReachyError::HardwareFault`] if the driver rejects the value.
    fn set_speed_limit(&mut self, value: f32) -> Result<(), ReachyError>;

    fn speed_limit(&self) -> f32;
}
