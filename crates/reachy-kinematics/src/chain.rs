//! [`KinematicChain`] – joint chain plus tool-tip offset.
//!
//! The chain is immutable once built.  Switching robot variant means
//! building a new chain and swapping the reference the robot holds; a caller
//! that already holds a chain keeps using a consistent one.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Vector3;
//! use reachy_kinematics::chain::{Joint, KinematicChain};
//!
//! let joints = vec![
//!     Joint::revolute("shoulder_pitch", Vector3::zeros(), Vector3::y()),
//!     Joint::revolute("elbow_pitch", Vector3::new(0.0, 0.0, -0.3), Vector3::y()),
//! ];
//! let chain = KinematicChain::new(joints, Vector3::new(0.0, 0.0, -0.02409));
//!
//! let tip = chain.end_effector(&[0.0, 0.0]).unwrap();
//! assert!((tip.translation.vector.z + 0.32409).abs() < 1e-9);
//! ```

use nalgebra::{Isometry3, Point3, Translation3, Unit, UnitQuaternion, Vector3};
use reachy_types::ReachyError;
use serde::{Deserialize, Serialize};

/// One revolute joint of the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    /// Pose of this joint's frame in its parent frame, at zero angle.
    pub origin: Isometry3<f64>,
    /// Rotation axis in the joint frame.
    pub axis: Unit<Vector3<f64>>,
}

impl Joint {
    /// Revolute joint offset by `translation` from its parent, rotating about
    /// `axis` (normalized here).
    pub fn revolute(name: impl Into<String>, translation: Vector3<f64>, axis: Vector3<f64>) -> Self {
        Self {
            name: name.into(),
            origin: Isometry3::from_parts(Translation3::from(translation), UnitQuaternion::identity()),
            axis: Unit::new_normalize(axis),
        }
    }

    /// This joint's transform at `angle` radians.
    fn transform(&self, angle: f64) -> Isometry3<f64> {
        let rotation = UnitQuaternion::from_axis_angle(&self.axis, angle);
        self.origin * Isometry3::from_parts(Translation3::identity(), rotation)
    }
}

/// Immutable joint chain bound to a fixed tool-tip offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicChain {
    joints: Vec<Joint>,
    tip: Vector3<f64>,
}

impl KinematicChain {
    /// Bind `joints` (base to last) to `tip`, the tool-tip position in the
    /// last joint's frame.
    pub fn new(joints: Vec<Joint>, tip: Vector3<f64>) -> Self {
        Self { joints, tip }
    }

    pub fn tip(&self) -> Vector3<f64> {
        self.tip
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Pose of the tool tip in the base frame for the given joint angles
    /// (radians, one per joint, base first).
    ///
    /// # Errors
    ///
    /// [`ReachyError::Kinematics`] when `angles` does not have one entry per
    /// joint.
    pub fn end_effector(&self, angles: &[f64]) -> Result<Isometry3<f64>, ReachyError> {
        if angles.len() != self.joints.len() {
            return Err(ReachyError::Kinematics(format!(
                "expected {} joint angles, got {}",
                self.joints.len(),
                angles.len()
            )));
        }
        let wrist = self
            .joints
            .iter()
            .zip(angles)
            .fold(Isometry3::identity(), |pose, (joint, &angle)| pose * joint.transform(angle));
        Ok(wrist * Translation3::from(self.tip))
    }

    /// Tool-tip position only.
    pub fn tip_position(&self, angles: &[f64]) -> Result<Point3<f64>, ReachyError> {
        Ok(self.end_effector(angles)?.transform_point(&Point3::origin()))
    }
}
