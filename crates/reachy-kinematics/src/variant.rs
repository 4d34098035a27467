//! Robot body variants and their per-variant parameters.
//!
//! Every variant goes through the same setup path; only the values returned
//! here differ.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use reachy_types::ReachyError;
use serde::{Deserialize, Serialize};

/// The robot bodies the core can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotVariant {
    /// Primary arm body with a short gripper tip.
    #[default]
    Reachy,
    /// Structurally different body with a long tool tip.
    Leachy,
}

impl RobotVariant {
    pub fn name(self) -> &'static str {
        match self {
            RobotVariant::Reachy => "reachy",
            RobotVariant::Leachy => "leachy",
        }
    }

    /// Tool-tip offset relative to the last joint frame, in metres.
    pub fn tip_offset(self) -> Vector3<f64> {
        match self {
            RobotVariant::Reachy => Vector3::new(0.0, 0.0, -0.02409),
            RobotVariant::Leachy => Vector3::new(0.0, 0.0, -0.8),
        }
    }

    pub fn model_file(self) -> String {
        format!("{}.urdf", self.name())
    }

    pub fn config_file(self) -> String {
        format!("{}.json", self.name())
    }

    pub fn scene_file(self) -> String {
        format!("{}.ttt", self.name())
    }
}

impl fmt::Display for RobotVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RobotVariant {
    type Err = ReachyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reachy" => Ok(RobotVariant::Reachy),
            "leachy" => Ok(RobotVariant::Leachy),
            other => Err(ReachyError::Config(format!("unknown robot variant '{other}'"))),
        }
    }
}
