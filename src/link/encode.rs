//! MAVLink wire encoding of setpoint messages.
//!
//! The bridge works in ENU with an FLU body frame; the FCU expects NED and
//! FRD. Conversion happens here and nowhere else: swap x/y, negate z, and
//! mirror yaw about north for world quantities; negate pitch/yaw axes for
//! body rates.

use mavlink::common::{
    AttitudeTargetTypemask, MavCmd, MavFrame, MavMessage, PositionTargetTypemask,
    COMMAND_LONG_DATA, SET_ATTITUDE_TARGET_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use nalgebra::{UnitQuaternion, Vector3};

use crate::setpoint::{AttitudeTarget, PositionTarget, PositionTargetMask};
use crate::types::Pose;

use std::f64::consts::{FRAC_PI_2, PI};

/// ENU world vector to NED.
pub fn world_enu_to_ned(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.y, v.x, -v.z)
}

/// NED world vector to ENU; the axis swap is its own inverse.
pub fn world_ned_to_enu(v: &Vector3<f64>) -> Vector3<f64> {
    world_enu_to_ned(v)
}

/// ENU yaw (counter-clockwise from east) to NED yaw (clockwise from north).
pub fn yaw_enu_to_ned(yaw: f64) -> f64 {
    FRAC_PI_2 - yaw
}

/// FLU body vector to FRD.
pub fn body_flu_to_frd(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, -v.y, -v.z)
}

/// Orientation of an FLU body in ENU, re-expressed as an FRD body in NED.
pub fn orientation_enu_to_ned(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let ned_from_enu = UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2);
    let flu_from_frd = UnitQuaternion::from_euler_angles(PI, 0.0, 0.0);
    ned_from_enu * q * flu_from_frd
}

/// Inverse of [`orientation_enu_to_ned`], for inbound attitude telemetry.
pub fn orientation_ned_to_enu(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let ned_from_enu = UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2);
    let flu_from_frd = UnitQuaternion::from_euler_angles(PI, 0.0, 0.0);
    ned_from_enu.inverse() * q * flu_from_frd.inverse()
}

fn quat_wxyz(q: &UnitQuaternion<f64>) -> [f32; 4] {
    [q.w as f32, q.i as f32, q.j as f32, q.k as f32]
}

/// A raw position/velocity setpoint as SET_POSITION_TARGET_LOCAL_NED.
pub fn position_target(
    setpoint: &PositionTarget,
    time_boot_ms: u32,
    target: (u8, u8),
) -> MavMessage {
    let position = world_enu_to_ned(&setpoint.position);
    let velocity = world_enu_to_ned(&setpoint.velocity);
    MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms,
        target_system: target.0,
        target_component: target.1,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask: PositionTargetTypemask::from_bits_truncate(setpoint.type_mask.bits()),
        x: position.x as f32,
        y: position.y as f32,
        z: position.z as f32,
        vx: velocity.x as f32,
        vy: velocity.y as f32,
        vz: velocity.z as f32,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: yaw_enu_to_ned(setpoint.yaw) as f32,
        yaw_rate: -setpoint.yaw_rate as f32,
    })
}

/// A pose setpoint as SET_POSITION_TARGET_LOCAL_NED with everything but
/// position and yaw ignored.
pub fn pose_target(pose: &Pose, time_boot_ms: u32, target: (u8, u8)) -> MavMessage {
    let type_mask = PositionTargetMask::IGNORE_VX
        | PositionTargetMask::IGNORE_VY
        | PositionTargetMask::IGNORE_VZ
        | PositionTargetMask::IGNORE_AFX
        | PositionTargetMask::IGNORE_AFY
        | PositionTargetMask::IGNORE_AFZ
        | PositionTargetMask::IGNORE_YAW_RATE;
    let position = world_enu_to_ned(&pose.position);
    MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms,
        target_system: target.0,
        target_component: target.1,
        coordinate_frame: MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask: PositionTargetTypemask::from_bits_truncate(type_mask.bits()),
        x: position.x as f32,
        y: position.y as f32,
        z: position.z as f32,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: yaw_enu_to_ned(crate::types::yaw_of(&pose.orientation)) as f32,
        yaw_rate: 0.0,
    })
}

/// An attitude pose + thrust as SET_ATTITUDE_TARGET with body rates ignored.
pub fn attitude_target(
    orientation: &UnitQuaternion<f64>,
    thrust: f32,
    time_boot_ms: u32,
    target: (u8, u8),
) -> MavMessage {
    MavMessage::SET_ATTITUDE_TARGET(SET_ATTITUDE_TARGET_DATA {
        time_boot_ms,
        target_system: target.0,
        target_component: target.1,
        type_mask: AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_ROLL_RATE_IGNORE
            | AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_PITCH_RATE_IGNORE
            | AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_BODY_YAW_RATE_IGNORE,
        q: quat_wxyz(&orientation_enu_to_ned(orientation)),
        body_roll_rate: 0.0,
        body_pitch_rate: 0.0,
        body_yaw_rate: 0.0,
        thrust,
    })
}

/// A body-rate setpoint as SET_ATTITUDE_TARGET with attitude ignored.
pub fn rates_target(setpoint: &AttitudeTarget, time_boot_ms: u32, target: (u8, u8)) -> MavMessage {
    let rates = body_flu_to_frd(&setpoint.body_rate);
    MavMessage::SET_ATTITUDE_TARGET(SET_ATTITUDE_TARGET_DATA {
        time_boot_ms,
        target_system: target.0,
        target_component: target.1,
        type_mask: AttitudeTargetTypemask::ATTITUDE_TARGET_TYPEMASK_ATTITUDE_IGNORE,
        q: [1.0, 0.0, 0.0, 0.0],
        body_roll_rate: rates.x as f32,
        body_pitch_rate: rates.y as f32,
        body_yaw_rate: rates.z as f32,
        thrust: setpoint.thrust,
    })
}

/// Arm/disarm as COMMAND_LONG.
pub fn arm_command(arm: bool, target: (u8, u8)) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        param1: if arm { 1.0 } else { 0.0 },
        param2: 0.0,
        param3: 0.0,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
        command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        target_system: target.0,
        target_component: target.1,
        confirmation: 0,
    })
}

/// PX4 custom mode pair (main, sub) for a mode string.
pub fn px4_mode(mode: &str) -> Option<(f32, f32)> {
    let pair = match mode {
        "MANUAL" => (1.0, 0.0),
        "ALTCTL" => (2.0, 0.0),
        "POSCTL" => (3.0, 0.0),
        "AUTO.READY" => (4.0, 1.0),
        "AUTO.TAKEOFF" => (4.0, 2.0),
        "AUTO.LOITER" => (4.0, 3.0),
        "AUTO.MISSION" => (4.0, 4.0),
        "AUTO.RTL" => (4.0, 5.0),
        "AUTO.LAND" => (4.0, 6.0),
        "ACRO" => (5.0, 0.0),
        "OFFBOARD" => (6.0, 0.0),
        "STABILIZED" => (7.0, 0.0),
        _ => return None,
    };
    Some(pair)
}

/// Mode string for a PX4 custom mode word from HEARTBEAT.
pub fn px4_mode_name(custom_mode: u32) -> Option<&'static str> {
    let main = (custom_mode >> 16) & 0xff;
    let sub = (custom_mode >> 24) & 0xff;
    let name = match (main, sub) {
        (1, _) => "MANUAL",
        (2, _) => "ALTCTL",
        (3, _) => "POSCTL",
        (4, 1) => "AUTO.READY",
        (4, 2) => "AUTO.TAKEOFF",
        (4, 3) => "AUTO.LOITER",
        (4, 4) => "AUTO.MISSION",
        (4, 5) => "AUTO.RTL",
        (4, 6) => "AUTO.LAND",
        (5, _) => "ACRO",
        (6, _) => "OFFBOARD",
        (7, _) => "STABILIZED",
        _ => return None,
    };
    Some(name)
}

/// Mode switch as COMMAND_LONG DO_SET_MODE with the PX4 custom mode pair.
pub fn set_mode_command(main_mode: f32, sub_mode: f32, target: (u8, u8)) -> MavMessage {
    MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
        // MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        param1: 1.0,
        param2: main_mode,
        param3: sub_mode,
        param4: 0.0,
        param5: 0.0,
        param6: 0.0,
        param7: 0.0,
        command: MavCmd::MAV_CMD_DO_SET_MODE,
        target_system: target.0,
        target_component: target.1,
        confirmation: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::quat_from_rpy;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_axes_swap() {
        let enu = Vector3::new(1.0, 2.0, 3.0);
        let ned = world_enu_to_ned(&enu);
        assert_eq!(ned, Vector3::new(2.0, 1.0, -3.0));
    }

    #[test]
    fn test_yaw_mirror() {
        // east in ENU is north-of-east 90deg in NED terms
        assert_relative_eq!(yaw_enu_to_ned(0.0), FRAC_PI_2);
        assert_relative_eq!(yaw_enu_to_ned(FRAC_PI_2), 0.0);
    }

    #[test]
    fn test_orientation_round_trips_through_yaw() {
        // yaw-only ENU orientation maps to the mirrored NED yaw
        let q = quat_from_rpy(0.0, 0.0, 1.0);
        let ned = orientation_enu_to_ned(&q);
        let (_, _, yaw) = ned.euler_angles();
        assert_relative_eq!(yaw, yaw_enu_to_ned(1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_body_rates_frd() {
        let flu = Vector3::new(0.1, 0.2, 0.3);
        let frd = body_flu_to_frd(&flu);
        assert_eq!(frd, Vector3::new(0.1, -0.2, -0.3));
    }

    #[test]
    fn test_position_target_mask_passthrough() {
        let setpoint = PositionTarget {
            stamp: tokio::time::Instant::now(),
            type_mask: PositionTargetMask::position_with_yaw_rate(),
            position: Vector3::new(1.0, 2.0, 3.0),
            velocity: Vector3::zeros(),
            yaw: 0.0,
            yaw_rate: 0.25,
        };
        match position_target(&setpoint, 1000, (1, 1)) {
            MavMessage::SET_POSITION_TARGET_LOCAL_NED(data) => {
                assert_eq!(data.type_mask.bits(), 1528);
                assert_relative_eq!(data.x, 2.0);
                assert_relative_eq!(data.y, 1.0);
                assert_relative_eq!(data.z, -3.0);
                assert_relative_eq!(data.yaw_rate, -0.25);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_px4_mode_map() {
        assert_eq!(px4_mode("OFFBOARD"), Some((6.0, 0.0)));
        assert_eq!(px4_mode("AUTO.LAND"), Some((4.0, 6.0)));
        assert_eq!(px4_mode("FLY_BETTER"), None);
    }

    #[test]
    fn test_px4_mode_name_round_trip() {
        for mode in ["MANUAL", "POSCTL", "AUTO.LAND", "OFFBOARD", "STABILIZED"] {
            let (main, sub) = px4_mode(mode).unwrap();
            let word = ((main as u32) << 16) | ((sub as u32) << 24);
            assert_eq!(px4_mode_name(word), Some(mode));
        }
        assert_eq!(px4_mode_name(0), None);
    }

    #[test]
    fn test_orientation_decode_inverts_encode() {
        let q = quat_from_rpy(0.2, -0.1, 0.8);
        let back = orientation_ned_to_enu(&orientation_enu_to_ned(&q));
        let (roll, pitch, yaw) = back.euler_angles();
        assert_relative_eq!(roll, 0.2, epsilon = 1e-9);
        assert_relative_eq!(pitch, -0.1, epsilon = 1e-9);
        assert_relative_eq!(yaw, 0.8, epsilon = 1e-9);
    }
}
