use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One primitive's proposed motor values for a single control tick.
///
/// Entries keep the order in which the primitive produced them.  A motor id
/// that appears more than once contributes the sum of its entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandVector {
    entries: Vec<(String, f32)>,
}

impl CommandVector {
    /// Create an empty vector (a primitive that proposes nothing this tick).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append of `value` for `motor_id`.
    pub fn with(mut self, motor_id: impl Into<String>, value: f32) -> Self {
        self.push(motor_id, value);
        self
    }

    pub fn push(&mut self, motor_id: impl Into<String>, value: f32) {
        self.entries.push((motor_id.into(), value));
    }

    /// The proposed value for `motor_id`, or `None` if this vector does not
    /// touch that motor.
    pub fn get(&self, motor_id: &str) -> Option<f32> {
        self.entries
            .iter()
            .filter(|(id, _)| id == motor_id)
            .map(|(_, v)| *v)
            .reduce(|a, b| a + b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(id, v)| (id.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for CommandVector {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(id, v)| (id.into(), v)).collect(),
        }
    }
}

/// The per-motor value sent to the driver for one tick: the sum of every
/// active primitive's proposal for that motor.
///
/// Motors nobody proposed are absent and keep their last driver value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedCommand {
    values: BTreeMap<String, f32>,
}

impl CombinedCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every entry of `vector` onto the running per-motor sums.
    pub fn accumulate(&mut self, vector: &CommandVector) {
        for (motor_id, value) in vector.iter() {
            *self.values.entry(motor_id.to_string()).or_insert(0.0) += value;
        }
    }

    pub fn get(&self, motor_id: &str) -> Option<f32> {
        self.values.get(motor_id).copied()
    }

    /// Iterate in motor-id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(id, v)| (id.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Timestamp of a detected collision event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollisionRecord {
    pub timestamp: DateTime<Utc>,
}

impl CollisionRecord {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }
}

/// Lifecycle state of an attached primitive.
///
/// `Stopped → Starting → Running → Stopping → Stopped`, with `Paused`
/// reachable from `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveState {
    #[default]
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
}

impl fmt::Display for PrimitiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveState::Stopped => write!(f, "stopped"),
            PrimitiveState::Starting => write!(f, "starting"),
            PrimitiveState::Running => write!(f, "running"),
            PrimitiveState::Paused => write!(f, "paused"),
            PrimitiveState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Error type shared by every Reachy crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReachyError {
    #[error("a primitive named '{0}' is already attached")]
    DuplicateName(String),

    #[error("no primitive named '{0}' is attached")]
    UnknownPrimitive(String),

    #[error("primitive '{primitive}' cannot {action} while {from}")]
    InvalidTransition {
        primitive: String,
        from: PrimitiveState,
        action: String,
    },

    #[error("primitive '{primitive}' failed this tick: {reason}")]
    PrimitiveTickFailure { primitive: String, reason: String },

    #[error("primitive '{primitive}' did not respond: {reason}")]
    Unresponsive { primitive: String, reason: String },

    #[error("simulator connection failed: {0}")]
    Connection(String),

    #[error("collision sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("kinematics error: {0}")]
    Kinematics(String),

    #[error("configuration error: {0}")]
    Config(String),
}
