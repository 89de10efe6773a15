//! Periodic setpoint publisher.
//!
//! [`publish`] runs once per tick (and once directly from the validator when
//! a command is accepted). It re-transforms the time-varying quantities into
//! the local frame, advances the navigate interpolation, and emits exactly
//! one message on the channel dictated by the active mode and yaw policy:
//!
//! | mode                | yaw policy    | channel        |
//! |---------------------|---------------|----------------|
//! | navigate / position | fixed/towards | position       |
//! | navigate / position | rate          | position-raw   |
//! | velocity            | any           | position-raw   |
//! | attitude            | -             | attitude + thrust |
//! | rates               | -             | attitude-raw   |

use std::time::Duration;

use log::warn;
use nalgebra::Vector3;
use tokio::time::Instant;

use crate::config::Config;
use crate::frames::{pose_to_isometry, Frames};
use crate::link::FcuLink;
use crate::types::{quat_from_rpy, yaw_of, Stamped};

use super::{
    AttitudeTarget, AttitudeTargetMask, EngineState, PositionTarget, PositionTargetMask,
    SetpointKind, ThrustTarget, YawPolicy,
};

/// Tolerance for the per-tick re-transform; transforms are fed continuously,
/// so anything older than this is genuinely missing.
const TICK_TOLERANCE: Duration = Duration::from_millis(50);

/// Minimum spacing of "can't transform" warnings.
const WARN_PERIOD: Duration = Duration::from_secs(10);

/// Interpolated navigate position at `now`, between `nav_start` and the
/// transformed target. While `wait_armed` holds, the clock origin slides so
/// the fraction stays at zero.
fn navigate_position(state: &mut EngineState, now: Instant) -> Vector3<f64> {
    if state.wait_armed {
        state.nav_start.stamp = now;
    }

    let start = state.nav_start.value.position;
    let target = state.position_transformed.value.position;
    let distance = (target - start).norm();
    let duration = distance / state.nav_speed;

    let elapsed = now.saturating_duration_since(state.nav_start.stamp).as_secs_f64();
    let passed = if duration > 0.0 {
        (elapsed / duration).clamp(0.0, 1.0)
    } else {
        1.0
    };

    start + (target - start) * passed
}

fn warn_throttled(state: &mut EngineState, now: Instant, message: &str) {
    let due = state
        .last_transform_warn
        .map(|last| now.saturating_duration_since(last) >= WARN_PERIOD)
        .unwrap_or(true);
    if due {
        warn!("{message}");
        state.last_transform_warn = Some(now);
    }
}

/// Publish one setpoint for the current engine state at `now`.
pub fn publish(state: &mut EngineState, now: Instant, frames: &Frames, link: &dyn FcuLink, config: &Config) {
    if state.kind == SetpointKind::None {
        return;
    }

    // Re-transform the time-varying quantities. On failure keep the previous
    // transformed values; once they are older than a full transform timeout,
    // skip publishing entirely rather than stream stale setpoints.
    let mut transformed = true;
    if state.kind.has_position() {
        state.position.stamp = now;
        match frames.transform_pose(&state.position, &config.local_frame, TICK_TOLERANCE) {
            Ok(pose) => state.position_transformed = pose,
            Err(_) => transformed = false,
        }
    }
    if state.kind == SetpointKind::Velocity && transformed {
        state.velocity.stamp = now;
        match frames.transform_vector(&state.velocity, &config.local_frame, TICK_TOLERANCE) {
            Ok(vector) => state.velocity_transformed = vector,
            Err(_) => transformed = false,
        }
    }
    if transformed {
        state.last_transform_ok = now;
    } else {
        warn_throttled(state, now, "can't transform setpoint into local frame");
        if now.saturating_duration_since(state.last_transform_ok) > config.transform_timeout {
            return;
        }
    }

    if state.kind.broadcasts_target() && !config.target_frame.is_empty() {
        frames.insert(
            &config.local_frame,
            &config.target_frame,
            now,
            pose_to_isometry(&state.position_transformed.value),
        );
    }

    let mut out_pose = state.position_transformed.value;
    if state.kind.is_navigate() {
        out_pose.position = navigate_position(state, now);
        if state.yaw == YawPolicy::Towards {
            let start = state.nav_start.value.position;
            let yaw = (out_pose.position.y - start.y).atan2(out_pose.position.x - start.x);
            out_pose.orientation = quat_from_rpy(0.0, 0.0, yaw);
        }
    }

    match state.kind {
        SetpointKind::Navigate | SetpointKind::NavigateGlobal | SetpointKind::Position => {
            match state.yaw {
                YawPolicy::Fixed | YawPolicy::Towards => {
                    link.publish_position(&Stamped::new(config.local_frame.as_str(), now, out_pose));
                }
                YawPolicy::Rate(rate) => {
                    link.publish_position_raw(&PositionTarget {
                        stamp: now,
                        type_mask: PositionTargetMask::position_with_yaw_rate(),
                        position: out_pose.position,
                        velocity: Vector3::zeros(),
                        yaw: 0.0,
                        yaw_rate: rate,
                    });
                }
            }
        }
        SetpointKind::Velocity => {
            let type_mask = PositionTargetMask::velocity_base()
                | match state.yaw {
                    YawPolicy::Fixed => PositionTargetMask::IGNORE_YAW_RATE,
                    YawPolicy::Rate(_) | YawPolicy::Towards => PositionTargetMask::IGNORE_YAW,
                };
            link.publish_position_raw(&PositionTarget {
                stamp: now,
                type_mask,
                position: Vector3::zeros(),
                velocity: state.velocity_transformed.value,
                yaw: yaw_of(&state.position_transformed.value.orientation),
                yaw_rate: state.yaw.yaw_rate(),
            });
        }
        SetpointKind::Attitude => {
            link.publish_attitude(&Stamped::new(config.local_frame.as_str(), now, out_pose));
            link.publish_thrust(&ThrustTarget {
                stamp: now,
                thrust: state.thrust,
            });
        }
        SetpointKind::Rates => {
            // body rates go out untransformed, stamped in the FCU frame
            link.publish_attitude_raw(&AttitudeTarget {
                stamp: now,
                frame_id: config.fcu_frame.clone(),
                type_mask: AttitudeTargetMask::IGNORE_ATTITUDE,
                body_rate: state.rates,
                thrust: state.thrust,
            });
        }
        SetpointKind::None => unreachable!(),
    }
}
