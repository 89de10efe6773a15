//! Geometry primitives shared across the bridge.
//!
//! Poses and vectors carry the name of the frame they are expressed in plus
//! the time they were sampled or requested at, mirroring the stamped message
//! types of the FCU middleware. Time is `tokio::time::Instant` so tests can
//! drive it deterministically with the paused runtime clock.

use nalgebra::{UnitQuaternion, Vector3};
use tokio::time::Instant;

/// A value expressed in a named coordinate frame at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub frame_id: String,
    pub stamp: Instant,
    pub value: T,
}

impl<T> Stamped<T> {
    pub fn new(frame_id: impl Into<String>, stamp: Instant, value: T) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp,
            value,
        }
    }
}

/// Position plus orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Origin pose with identity orientation.
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Pose at `position` with identity orientation.
    pub fn from_position(position: Vector3<f64>) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Quaternion from roll/pitch/yaw, Z-Y-X intrinsic (yaw about Z applied
/// last).
pub fn quat_from_rpy(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(roll, pitch, yaw)
}

/// Yaw component of an orientation under the Z-Y-X convention.
pub fn yaw_of(q: &UnitQuaternion<f64>) -> f64 {
    q.euler_angles().2
}

/// Orientation reduced to its yaw component only.
pub fn yaw_only(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(0.0, 0.0, yaw_of(q))
}
