//! Command and telemetry records of the service boundary.
//!
//! Request fields mirror the wire conventions of the FCU middleware: yaw is
//! a sentinel-encoded angle (`NaN` selects yaw-rate control, `+inf` means
//! "face the navigation target"), and unset numeric fields default to zero.
//! Every command answers with [`CommandResponse`]; the transport call itself
//! always succeeds.

pub mod handshake;
pub mod serve;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::setpoint::SetpointKind;

/// Outcome of any command service call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl From<Result<(), CommandError>> for CommandResponse {
    fn from(result: Result<(), CommandError>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                message: String::new(),
            },
            Err(error) => Self {
                success: false,
                message: error.to_string(),
            },
        }
    }
}

/// Fly to a point in `frame_id` along a straight line at `speed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Navigate {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
    /// m/s; zero selects the configured default speed.
    pub speed: f32,
    pub frame_id: String,
    pub auto_arm: bool,
}

/// Fly to a global (lat, lon) target; `z` is altitude in `frame_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigateGlobal {
    pub lat: f64,
    pub lon: f64,
    pub z: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
    pub speed: f32,
    pub frame_id: String,
    pub auto_arm: bool,
}

/// Hold a position setpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
    pub frame_id: String,
    pub auto_arm: bool,
}

/// Hold a velocity setpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetVelocity {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub yaw: f32,
    pub yaw_rate: f32,
    pub frame_id: String,
    pub auto_arm: bool,
}

/// Hold an attitude + thrust setpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetAttitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub thrust: f32,
    pub frame_id: String,
    pub auto_arm: bool,
}

/// Hold a body-rates + thrust setpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetRates {
    pub roll_rate: f32,
    pub pitch_rate: f32,
    pub yaw_rate: f32,
    pub thrust: f32,
    pub auto_arm: bool,
}

/// Consolidated telemetry snapshot; stale or missing values are NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Telemetry {
    pub frame_id: String,
    pub connected: bool,
    pub armed: bool,
    pub mode: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub voltage: f32,
    pub cell_voltage: f32,
}

impl Telemetry {
    pub(crate) fn empty(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
            connected: false,
            armed: false,
            mode: String::new(),
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
            lat: f64::NAN,
            lon: f64::NAN,
            alt: f64::NAN,
            vx: f64::NAN,
            vy: f64::NAN,
            vz: f64::NAN,
            roll: f64::NAN,
            pitch: f64::NAN,
            yaw: f64::NAN,
            roll_rate: f64::NAN,
            pitch_rate: f64::NAN,
            yaw_rate: f64::NAN,
            voltage: f32::NAN,
            cell_voltage: f32::NAN,
        }
    }
}

/// A fully-typed command as seen by the validator, regardless of which
/// service it arrived on.
#[derive(Debug, Clone, Default)]
pub(crate) struct Command {
    pub kind: SetpointKind,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll_rate: f64,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub lat: f64,
    pub lon: f64,
    pub thrust: f32,
    pub speed: f64,
    pub frame_id: String,
    pub auto_arm: bool,
}

impl From<Navigate> for Command {
    fn from(req: Navigate) -> Self {
        Self {
            kind: SetpointKind::Navigate,
            x: req.x as f64,
            y: req.y as f64,
            z: req.z as f64,
            yaw: req.yaw as f64,
            yaw_rate: req.yaw_rate as f64,
            speed: req.speed as f64,
            frame_id: req.frame_id,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}

impl From<NavigateGlobal> for Command {
    fn from(req: NavigateGlobal) -> Self {
        Self {
            kind: SetpointKind::NavigateGlobal,
            lat: req.lat,
            lon: req.lon,
            z: req.z as f64,
            yaw: req.yaw as f64,
            yaw_rate: req.yaw_rate as f64,
            speed: req.speed as f64,
            frame_id: req.frame_id,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}

impl From<SetPosition> for Command {
    fn from(req: SetPosition) -> Self {
        Self {
            kind: SetpointKind::Position,
            x: req.x as f64,
            y: req.y as f64,
            z: req.z as f64,
            yaw: req.yaw as f64,
            yaw_rate: req.yaw_rate as f64,
            frame_id: req.frame_id,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}

impl From<SetVelocity> for Command {
    fn from(req: SetVelocity) -> Self {
        Self {
            kind: SetpointKind::Velocity,
            vx: req.vx as f64,
            vy: req.vy as f64,
            vz: req.vz as f64,
            yaw: req.yaw as f64,
            yaw_rate: req.yaw_rate as f64,
            frame_id: req.frame_id,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}

impl From<SetAttitude> for Command {
    fn from(req: SetAttitude) -> Self {
        Self {
            kind: SetpointKind::Attitude,
            roll: req.roll as f64,
            pitch: req.pitch as f64,
            yaw: req.yaw as f64,
            thrust: req.thrust,
            frame_id: req.frame_id,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}

impl From<SetRates> for Command {
    fn from(req: SetRates) -> Self {
        Self {
            kind: SetpointKind::Rates,
            roll_rate: req.roll_rate as f64,
            pitch_rate: req.pitch_rate as f64,
            yaw_rate: req.yaw_rate as f64,
            thrust: req.thrust,
            auto_arm: req.auto_arm,
            ..Self::default()
        }
    }
}
