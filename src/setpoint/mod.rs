//! Setpoint modes, outbound setpoint messages, and the engine state.
//!
//! Exactly one setpoint mode is active at a time; the validator replaces the
//! whole engine state when it accepts a command, and the periodic publisher
//! in [`engine`] reads it on every tick.

pub mod engine;

use bitflags::bitflags;
use nalgebra::Vector3;
use tokio::time::Instant;

use crate::types::{Pose, Stamped};

bitflags! {
    /// Ignore mask of a position-target message. A set bit tells the FCU to
    /// disregard that field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PositionTargetMask: u16 {
        const IGNORE_PX = 1;
        const IGNORE_PY = 2;
        const IGNORE_PZ = 4;
        const IGNORE_VX = 8;
        const IGNORE_VY = 16;
        const IGNORE_VZ = 32;
        const IGNORE_AFX = 64;
        const IGNORE_AFY = 128;
        const IGNORE_AFZ = 256;
        const FORCE = 512;
        const IGNORE_YAW = 1024;
        const IGNORE_YAW_RATE = 2048;
    }
}

bitflags! {
    /// Ignore mask of an attitude-target message.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttitudeTargetMask: u8 {
        const IGNORE_ROLL_RATE = 1;
        const IGNORE_PITCH_RATE = 2;
        const IGNORE_YAW_RATE = 4;
        const IGNORE_THRUST = 64;
        const IGNORE_ATTITUDE = 128;
    }
}

impl PositionTargetMask {
    /// Everything but position and yaw rate.
    pub fn position_with_yaw_rate() -> Self {
        Self::IGNORE_VX
            | Self::IGNORE_VY
            | Self::IGNORE_VZ
            | Self::IGNORE_AFX
            | Self::IGNORE_AFY
            | Self::IGNORE_AFZ
            | Self::IGNORE_YAW
    }

    /// Everything but velocity; yaw vs yaw-rate decided by the caller.
    pub fn velocity_base() -> Self {
        Self::IGNORE_PX
            | Self::IGNORE_PY
            | Self::IGNORE_PZ
            | Self::IGNORE_AFX
            | Self::IGNORE_AFY
            | Self::IGNORE_AFZ
    }
}

/// Active setpoint mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetpointKind {
    #[default]
    None,
    Navigate,
    NavigateGlobal,
    Position,
    Velocity,
    Attitude,
    Rates,
}

impl SetpointKind {
    /// Modes whose setpoint carries a positional component that must be
    /// re-transformed into the local frame every tick.
    pub fn has_position(self) -> bool {
        matches!(
            self,
            Self::Navigate | Self::NavigateGlobal | Self::Position | Self::Velocity | Self::Attitude
        )
    }

    /// Modes that keep the target-frame broadcast alive.
    pub fn broadcasts_target(self) -> bool {
        matches!(self, Self::Navigate | Self::NavigateGlobal | Self::Position)
    }

    pub fn is_navigate(self) -> bool {
        matches!(self, Self::Navigate | Self::NavigateGlobal)
    }
}

/// Yaw policy, decoded from the wire sentinels by the validator
/// (`yaw = NaN` selects `Rate`, `yaw = +inf` selects `Towards`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YawPolicy {
    /// Hold the absolute yaw baked into the setpoint orientation.
    Fixed,
    /// Command a yaw rate (rad/s).
    Rate(f64),
    /// Point the nose at the navigation target, recomputed every tick.
    Towards,
}

impl YawPolicy {
    pub fn yaw_rate(self) -> f64 {
        match self {
            Self::Rate(rate) => rate,
            _ => 0.0,
        }
    }
}

/// Raw position/velocity setpoint with an ignore mask, in the local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionTarget {
    pub stamp: Instant,
    pub type_mask: PositionTargetMask,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub yaw: f64,
    pub yaw_rate: f64,
}

/// Raw body-rate + thrust setpoint, stamped in the FCU body frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AttitudeTarget {
    pub stamp: Instant,
    pub frame_id: String,
    pub type_mask: AttitudeTargetMask,
    pub body_rate: Vector3<f64>,
    pub thrust: f32,
}

/// Scalar thrust setpoint accompanying an attitude pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustTarget {
    pub stamp: Instant,
    pub thrust: f32,
}

/// Everything the periodic publisher needs, replaced atomically by the
/// validator on command acceptance.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub kind: SetpointKind,
    pub yaw: YawPolicy,
    /// Target pose in its reference frame; orientation also carries the
    /// target yaw for attitude mode.
    pub position: Stamped<Pose>,
    /// `position` re-expressed in the local frame on the last successful
    /// tick transform.
    pub position_transformed: Stamped<Pose>,
    /// Velocity setpoint in its reference frame.
    pub velocity: Stamped<Vector3<f64>>,
    pub velocity_transformed: Stamped<Vector3<f64>>,
    pub thrust: f32,
    /// Body rates (roll, pitch, yaw), rad/s.
    pub rates: Vector3<f64>,
    /// Local pose of the vehicle when the navigate command was accepted.
    pub nav_start: Stamped<Pose>,
    /// Navigate cruise speed, m/s.
    pub nav_speed: f64,
    /// While set, the navigate clock origin slides with "now" so
    /// interpolation starts only once arming completes.
    pub wait_armed: bool,
    /// Whether the periodic publisher is active.
    pub streaming: bool,
    pub(crate) last_transform_ok: Instant,
    pub(crate) last_transform_warn: Option<Instant>,
}

impl EngineState {
    pub fn new(now: Instant, local_frame: &str) -> Self {
        Self {
            kind: SetpointKind::None,
            yaw: YawPolicy::Fixed,
            position: Stamped::new(local_frame, now, Pose::identity()),
            position_transformed: Stamped::new(local_frame, now, Pose::identity()),
            velocity: Stamped::new(local_frame, now, Vector3::zeros()),
            velocity_transformed: Stamped::new(local_frame, now, Vector3::zeros()),
            thrust: 0.0,
            rates: Vector3::zeros(),
            nav_start: Stamped::new(local_frame, now, Pose::identity()),
            nav_speed: 0.0,
            wait_armed: false,
            streaming: false,
            last_transform_ok: now,
            last_transform_warn: None,
        }
    }
}
