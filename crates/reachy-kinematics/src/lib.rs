//! `reachy-kinematics` – end-effector definition for IK callers.
//!
//! # Modules
//!
//! - [`chain`] – [`KinematicChain`][chain::KinematicChain]: an immutable
//!   binding of the robot's joint chain to a fixed tool-tip offset, with the
//!   forward end-effector transform external IK solvers query.
//! - [`variant`] – [`RobotVariant`][variant::RobotVariant]: the robot bodies
//!   the chain can be configured for, and the per-variant tip offset and
//!   model/scene file names.

pub mod chain;
pub mod variant;

pub use chain::{Joint, KinematicChain};
pub use variant::RobotVariant;
