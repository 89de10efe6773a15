//! The FCU boundary.
//!
//! [`FcuLink`] is everything the engine and the command handlers know about
//! the flight controller: five outbound setpoint channels and the two FCU
//! services (arming, set_mode). Publishing is fire-and-forget; the service
//! calls resolve once the FCU accepts or rejects the request.
//!
//! Implementations: `MavlinkLink` for a real connection, `MockFcu` for host
//! tests.

pub mod encode;
pub mod mavlink;
pub mod mock;

use async_trait::async_trait;

use crate::error::LinkError;
use crate::setpoint::{AttitudeTarget, PositionTarget, ThrustTarget};
use crate::types::{Pose, Stamped};

#[async_trait]
pub trait FcuLink: Send + Sync {
    /// Pose setpoint in the local frame.
    fn publish_position(&self, setpoint: &Stamped<Pose>);

    /// Position/velocity setpoint with an ignore mask.
    fn publish_position_raw(&self, setpoint: &PositionTarget);

    /// Attitude setpoint as a pose.
    fn publish_attitude(&self, setpoint: &Stamped<Pose>);

    /// Body rates + thrust with an ignore mask.
    fn publish_attitude_raw(&self, setpoint: &AttitudeTarget);

    /// Scalar thrust accompanying an attitude setpoint.
    fn publish_thrust(&self, setpoint: &ThrustTarget);

    /// Request arming (`true`) or disarming. `Ok(false)` means the FCU
    /// answered but refused.
    async fn arming(&self, arm: bool) -> Result<bool, LinkError>;

    /// Request a flight mode by its mode string (e.g. "OFFBOARD",
    /// "AUTO.LAND").
    async fn set_mode(&self, mode: &str) -> Result<bool, LinkError>;
}
