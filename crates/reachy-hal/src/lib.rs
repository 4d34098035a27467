//! `reachy-hal` – driver and simulator seams.
//!
//! The core never talks to a motor bus or a physics simulator directly.  It
//! goes through the traits defined here so real drivers and the in-process
//! stand-ins in [`sim`] are interchangeable.
//!
//! # Modules
//!
//! - [`motor`] – [`Motor`][motor::Motor]: a commandable joint motor with a
//!   speed limit.
//! - [`bus`] – [`MotorBus`][bus::MotorBus]: the set of registered motors,
//!   addressed by id, and the single entry point for writing commands.
//! - [`simulator`] – [`Simulator`][simulator::Simulator] and
//!   [`CollisionSensor`][simulator::CollisionSensor]: the optional simulator
//!   connection used for collision queries.
//! - [`sim`] – in-process simulated motors, sensor and simulator for headless
//!   runs and tests.

pub mod bus;
pub mod motor;
pub mod sim;
pub mod simulator;

pub use bus::MotorBus;
pub use motor::Motor;
pub use sim::{SimBus, SimCollisionSensor, SimMotor, SimSimulator};
pub use simulator::{CollisionSensor, HardwareCollisionSensor, Simulator, SimulatorConfig};
