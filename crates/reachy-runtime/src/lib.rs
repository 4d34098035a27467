//! `reachy-runtime` – robot bring-up and the control loop.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: the statically typed capabilities
//!   of a set-up robot (motors, primitive manager, collision history,
//!   kinematic chain), and [`RobotBuilder`][robot::RobotBuilder], the single
//!   setup path every [`RobotVariant`][reachy_kinematics::RobotVariant] goes
//!   through.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: the
//!   fixed-rate tokio task that ticks the primitive manager and writes the
//!   combined command to the motors.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod control_loop;
pub mod robot;
pub mod telemetry;

pub use control_loop::ControlLoop;
pub use robot::{Robot, RobotBuilder, RobotConfig, RobotMode};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
