//! End-to-end command scenarios over the mock FCU link.
//!
//! Each test runs the full stack (telemetry feed, transform tree, setpoint
//! stream, command validation, arming handshake) on the paused runtime
//! clock, so timeouts and interpolation are exact.

use std::sync::Arc;
use std::time::Duration;

use nalgebra::Vector3;
use tokio::time::sleep;

use offboard_bridge::command::{Navigate, NavigateGlobal, SetAttitude, SetPosition, SetVelocity};
use offboard_bridge::link::mock::{MockFcu, Published};
use offboard_bridge::setpoint::PositionTargetMask;
use offboard_bridge::telemetry::GlobalPosition;
use offboard_bridge::types::{quat_from_rpy, yaw_of, Pose};
use offboard_bridge::{Config, OffboardBridge};

fn approx(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

fn harness() -> (Arc<OffboardBridge>, MockFcu) {
    let fcu = MockFcu::new();
    let bridge = OffboardBridge::new(Config::default(), Arc::new(fcu.clone()));
    bridge.spawn_stream();
    (bridge, fcu)
}

/// Pump FCU state and a fixed local pose into the bridge at 20 Hz, the way
/// the telemetry read loop would.
fn spawn_feeder(bridge: &Arc<OffboardBridge>, fcu: &MockFcu, pose: Pose) {
    let bridge = bridge.clone();
    let fcu = fcu.clone();
    tokio::spawn(async move {
        loop {
            bridge.handle_state(fcu.state());
            bridge.handle_local_position(pose);
            sleep(Duration::from_millis(50)).await;
        }
    });
}

async fn settle() {
    sleep(Duration::from_millis(120)).await;
}

fn last_position(fcu: &MockFcu) -> Option<Pose> {
    fcu.published().iter().rev().find_map(|published| match published {
        Published::Position(pose) => Some(pose.value),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_navigate_with_auto_arm_full_flight() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;

    let response = bridge
        .navigate(Navigate {
            x: 5.0,
            y: 0.0,
            z: 2.0,
            yaw: 0.0,
            speed: 1.0,
            frame_id: "map".into(),
            auto_arm: true,
            ..Default::default()
        })
        .await;
    assert!(response.success, "navigate failed: {}", response.message);

    // the handshake drove the FCU through OFFBOARD + arming
    assert_eq!(fcu.set_mode_calls(), vec!["OFFBOARD".to_string()]);
    assert_eq!(fcu.arming_calls(), vec![true]);
    let state = fcu.state();
    assert_eq!(state.mode, "OFFBOARD");
    assert!(state.armed);

    // setpoints were streaming during the handshake, held at the start pose
    let first = fcu
        .published()
        .iter()
        .find_map(|published| match published {
            Published::Position(pose) => Some(pose.value),
            _ => None,
        })
        .expect("no position setpoint published");
    assert!(approx(first.position.x, 0.0, 1e-6));
    assert!(approx(first.position.z, 0.0, 1e-6));

    // distance is sqrt(5^2 + 2^2) at 1 m/s; well after that the stream sits
    // exactly on the target
    sleep(Duration::from_secs(7)).await;
    let arrived = last_position(&fcu).unwrap();
    assert!(approx(arrived.position.x, 5.0, 1e-9));
    assert!(approx(arrived.position.y, 0.0, 1e-9));
    assert!(approx(arrived.position.z, 2.0, 1e-9));
}

#[tokio::test(start_paused = true)]
async fn test_navigate_interpolation_is_monotone() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let response = bridge
        .navigate(Navigate {
            x: 10.0,
            speed: 1.0,
            yaw: 0.0,
            ..Default::default()
        })
        .await;
    assert!(response.success, "{}", response.message);

    sleep(Duration::from_secs(4)).await;
    let xs: Vec<f64> = fcu
        .published()
        .iter()
        .filter_map(|published| match published {
            Published::Position(pose) => Some(pose.value.position.x),
            _ => None,
        })
        .collect();
    assert!(xs.len() > 50);
    assert!(xs.windows(2).all(|w| w[1] >= w[0] - 1e-9), "not monotone");
    assert!(xs.iter().all(|x| (0.0..=10.0 + 1e-9).contains(x)));
    // mid-flight samples sit strictly between the endpoints
    assert!(xs.iter().any(|x| *x > 0.5 && *x < 9.5));
}

#[tokio::test(start_paused = true)]
async fn test_set_velocity_in_body_frame() {
    let (bridge, fcu) = harness();
    // vehicle yawed 90 degrees left
    let pose = Pose::new(Vector3::zeros(), quat_from_rpy(0.0, 0.0, std::f64::consts::FRAC_PI_2));
    spawn_feeder(&bridge, &fcu, pose);
    settle().await;
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let response = bridge
        .set_velocity(SetVelocity {
            vx: 1.0,
            yaw: f32::NAN,
            yaw_rate: 0.2,
            frame_id: "body".into(),
            auto_arm: false,
            ..Default::default()
        })
        .await;
    assert!(response.success, "{}", response.message);

    sleep(Duration::from_millis(500)).await;
    let target = fcu
        .published()
        .iter()
        .rev()
        .find_map(|published| match published {
            Published::PositionRaw(target) => Some(target.clone()),
            _ => None,
        })
        .expect("no raw setpoint published");

    assert_eq!(
        target.type_mask,
        PositionTargetMask::velocity_base() | PositionTargetMask::IGNORE_YAW
    );
    // forward in a 90deg-yawed body frame is +y in the local frame
    assert!(approx(target.velocity.x, 0.0, 1e-9));
    assert!(approx(target.velocity.y, 1.0, 1e-9));
    assert!(approx(target.yaw_rate, 0.2, 1e-6));
}

#[tokio::test(start_paused = true)]
async fn test_set_velocity_towards_ignores_yaw() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let response = bridge
        .set_velocity(SetVelocity {
            vx: 1.0,
            yaw: f32::INFINITY,
            auto_arm: false,
            ..Default::default()
        })
        .await;
    assert!(response.success, "{}", response.message);

    sleep(Duration::from_millis(500)).await;
    let target = fcu
        .published()
        .iter()
        .rev()
        .find_map(|published| match published {
            Published::PositionRaw(target) => Some(target.clone()),
            _ => None,
        })
        .expect("no raw setpoint published");

    // "face the target" leaves yaw meaningless for a pure velocity command;
    // the FCU must be told to ignore yaw, not yaw rate
    assert_eq!(
        target.type_mask,
        PositionTargetMask::velocity_base() | PositionTargetMask::IGNORE_YAW
    );
    assert!(approx(target.yaw_rate, 0.0, 1e-9));
}

#[tokio::test(start_paused = true)]
async fn test_navigate_global_towards_target() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;
    bridge.handle_global_position(GlobalPosition {
        latitude: 55.0,
        longitude: 37.0,
        altitude: 100.0,
    });
    settle().await;

    let response = bridge
        .navigate_global(NavigateGlobal {
            lat: 55.0,
            lon: 37.01,
            z: 10.0,
            yaw: f32::INFINITY,
            speed: 2.0,
            auto_arm: true,
            ..Default::default()
        })
        .await;
    assert!(response.success, "{}", response.message);

    sleep(Duration::from_secs(5)).await;
    let pose = last_position(&fcu).unwrap();
    // the target is ~638 m due east: position crawls along +x and the nose
    // points at the target the whole way
    assert!(pose.position.x > 1.0);
    assert!(approx(pose.position.y, 0.0, 1.0));
    assert!(approx(yaw_of(&pose.orientation), 0.0, 0.01));
}

#[tokio::test(start_paused = true)]
async fn test_set_attitude_pose_and_thrust() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let response = bridge
        .set_attitude(SetAttitude {
            roll: 0.0,
            pitch: 0.1,
            yaw: 0.0,
            thrust: 0.5,
            frame_id: String::new(),
            auto_arm: false,
        })
        .await;
    assert!(response.success, "{}", response.message);

    sleep(Duration::from_millis(200)).await;
    let published = fcu.published();
    let attitude = published
        .iter()
        .rev()
        .find_map(|p| match p {
            Published::Attitude(pose) => Some(pose.value),
            _ => None,
        })
        .expect("no attitude setpoint");
    let (roll, pitch, yaw) = attitude.orientation.euler_angles();
    assert!(approx(roll, 0.0, 1e-9));
    assert!(approx(pitch, 0.1, 1e-9));
    assert!(approx(yaw, 0.0, 1e-9));
    assert!(published.iter().any(|p| matches!(
        p,
        Published::Thrust(thrust) if (thrust.thrust - 0.5).abs() < 1e-6
    )));
}

#[tokio::test(start_paused = true)]
async fn test_second_command_is_busy() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;

    let first = bridge.navigate(Navigate {
        x: 5.0,
        yaw: 0.0,
        speed: 1.0,
        auto_arm: true,
        ..Default::default()
    });
    let second = async {
        sleep(Duration::from_millis(10)).await;
        bridge
            .navigate(Navigate {
                x: -5.0,
                yaw: 0.0,
                speed: 1.0,
                auto_arm: true,
                ..Default::default()
            })
            .await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.success, "{}", first.message);
    assert!(!second.success);
    assert_eq!(second.message, "Busy");
    // the rejected command never reached the FCU services a second time
    assert_eq!(fcu.set_mode_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_land_switches_mode() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let response = bridge.land().await;
    assert!(response.success, "{}", response.message);
    assert_eq!(fcu.set_mode_calls(), vec!["AUTO.LAND".to_string()]);
    assert_eq!(fcu.state().mode, "AUTO.LAND");
}

#[tokio::test(start_paused = true)]
async fn test_land_timeout_message() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
        inner.hold_mode = true;
    });
    settle().await;

    let response = bridge.land().await;
    assert!(!response.success);
    assert_eq!(response.message, "Land request timed out");
}

#[tokio::test(start_paused = true)]
async fn test_land_gated_outside_offboard() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;

    let response = bridge.land().await;
    assert!(!response.success);
    assert_eq!(response.message, "Copter is not in OFFBOARD mode");
    assert!(fcu.set_mode_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_offboard_timeout_carries_status_text() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    fcu.configure(|inner| inner.hold_mode = true);
    settle().await;

    let status_feeder = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            bridge.handle_status_text("Offboard rejected: no setpoints");
        })
    };

    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            speed: 1.0,
            auto_arm: true,
            ..Default::default()
        })
        .await;
    status_feeder.abort();

    assert!(!response.success);
    assert_eq!(
        response.message,
        "OFFBOARD timed out: Offboard rejected: no setpoints"
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejections_leave_engine_idle() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;

    // negative speed
    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            speed: -1.0,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Navigate speed must be positive, -1 passed");

    // yaw and yaw_rate both requested
    let response = bridge
        .set_position(SetPosition {
            x: 1.0,
            yaw: 0.5,
            yaw_rate: 0.5,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Yaw value should be NaN for setting yaw rate");

    // neither yaw nor yaw_rate
    let response = bridge
        .set_position(SetPosition {
            x: 1.0,
            yaw: f32::NAN,
            yaw_rate: f32::NAN,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Both yaw and yaw_rate cannot be NaN");

    // unknown frame with no reference entry falls back to itself, and the
    // rejection names both ends of the missing transform
    let response = bridge
        .set_position(SetPosition {
            x: 1.0,
            yaw: 0.0,
            frame_id: "ghost".into(),
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Can't transform from ghost to map");

    // none of the rejects started a stream
    sleep(Duration::from_millis(300)).await;
    assert!(fcu.published().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_local_position_rejects_navigate() {
    let (bridge, fcu) = harness();
    // state only; no local position feed
    {
        let bridge = bridge.clone();
        let fcu = fcu.clone();
        tokio::spawn(async move {
            loop {
                bridge.handle_state(fcu.state());
                sleep(Duration::from_millis(50)).await;
            }
        });
    }
    settle().await;

    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            auto_arm: true,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "No local position, check settings");
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_fcu_rejects() {
    let (bridge, fcu) = harness();
    fcu.configure(|inner| inner.connected = false);
    spawn_feeder(&bridge, &fcu, Pose::identity());
    settle().await;

    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "No connection to FCU");
}

#[tokio::test(start_paused = true)]
async fn test_stale_state_rejects() {
    let (bridge, fcu) = harness();
    bridge.handle_state(fcu.state());
    bridge.handle_local_position(Pose::identity());
    // let the one state sample age out
    sleep(Duration::from_secs(4)).await;

    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "State timeout, check mavros settings");
}

#[tokio::test(start_paused = true)]
async fn test_not_armed_without_auto_arm() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    fcu.configure(|inner| inner.mode = "OFFBOARD".into());
    settle().await;

    let response = bridge
        .navigate(Navigate {
            x: 1.0,
            yaw: 0.0,
            auto_arm: false,
            ..Default::default()
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.message, "Copter is not armed, use auto_arm?");
}

#[tokio::test(start_paused = true)]
async fn test_repeat_command_reproduces_setpoints() {
    let (bridge, fcu) = harness();
    spawn_feeder(&bridge, &fcu, Pose::identity());
    fcu.configure(|inner| {
        inner.mode = "OFFBOARD".into();
        inner.armed = true;
    });
    settle().await;

    let request = SetPosition {
        x: 1.0,
        y: 2.0,
        z: 3.0,
        yaw: 0.25,
        ..Default::default()
    };

    let response = bridge.set_position(request.clone()).await;
    assert!(response.success, "{}", response.message);
    sleep(Duration::from_millis(200)).await;
    let first = last_position(&fcu).unwrap();

    fcu.clear_published();
    let response = bridge.set_position(request).await;
    assert!(response.success, "{}", response.message);
    sleep(Duration::from_millis(200)).await;
    let second = last_position(&fcu).unwrap();

    assert_eq!(first, second);
}
