//! Simulator connection and collision-sensor seams.
//!
//! A [`Simulator`] is only present when the robot runs against a physics
//! scene.  Connecting yields a [`CollisionSensor`] that the collision monitor
//! polls.  On physical hardware there is no such sensor;
//! [`HardwareCollisionSensor`] makes that explicit by answering every query
//! with [`ReachyError::SensorUnavailable`].

use std::path::PathBuf;
use std::sync::Arc;

use reachy_types::ReachyError;
use serde::{Deserialize, Serialize};

/// Name of the collision object the scene exposes for the robot body.
pub const DEFAULT_COLLISION_OBJECT: &str = "Collision";

/// Connection parameters for the physics simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scene file to load after connecting.  `None` keeps the scene already
    /// open in the simulator.
    #[serde(default)]
    pub scene: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    19997
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            scene: None,
        }
    }
}

impl SimulatorConfig {
    /// `host:port` form used in log lines and error messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Answers "is this object currently in contact with something?".
pub trait CollisionSensor: Send + Sync {
    /// # Errors
    ///
    /// [`ReachyError::SensorUnavailable`] when the current mode has no
    /// collision sensing, or [`ReachyError::Connection`] when the simulator
    /// link dropped.
    fn query_collision_state(&self, object_name: &str) -> Result<bool, ReachyError>;
}

/// A physics simulator the robot can be brought up against.
pub trait Simulator: Send + Sync {
    /// Open a session and return its collision sensor.
    ///
    /// # Errors
    ///
    /// Any failure to reach the simulator or load the scene is reported as a
    /// single [`ReachyError::Connection`].
    fn connect(&self, config: &SimulatorConfig) -> Result<Arc<dyn CollisionSensor>, ReachyError>;
}

/// Collision sensor stand-in for physical hardware, where no collision state
/// can be queried.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareCollisionSensor;

impl CollisionSensor for HardwareCollisionSensor {
    fn query_collision_state(&self, object_name: &str) -> Result<bool, ReachyError> {
        Err(ReachyError::SensorUnavailable(format!(
            "cannot query '{object_name}' on physical hardware"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_simulator() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.address(), "127.0.0.1:19997");
        assert!(cfg.scene.is_none());
    }

    #[test]
    fn hardware_sensor_is_unavailable() {
        let result = HardwareCollisionSensor.query_collision_state(DEFAULT_COLLISION_OBJECT);
        assert!(matches!(result, Err(ReachyError::SensorUnavailable(_))));
    }
}
