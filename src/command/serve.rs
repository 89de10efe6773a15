//! Command validation and preparation.
//!
//! One entry point for all six setpoint services: validate the command
//! against current telemetry, resolve every frame up front, then commit the
//! prepared setpoint to the engine in one step and start the stream. Nothing
//! in the engine is touched until validation has fully passed.

use nalgebra::Vector3;
use tokio::time::Instant;

use crate::bridge::OffboardBridge;
use crate::error::CommandError;
use crate::geo;
use crate::setpoint::{engine, SetpointKind, YawPolicy};
use crate::types::{quat_from_rpy, Pose, Stamped};

use super::Command;

impl OffboardBridge {
    pub(crate) async fn serve(&self, mut command: Command) -> Result<(), CommandError> {
        let stamp = Instant::now();
        let config = self.config();

        self.check_state(stamp)?;

        if command.kind.is_navigate() {
            if self
                .cache()
                .read()
                .unwrap()
                .local_position
                .fresh(stamp, config.local_position_timeout)
                .is_none()
            {
                return Err(CommandError::NoLocalPosition);
            }
            if command.speed < 0.0 {
                return Err(CommandError::NegativeSpeed(command.speed as f32));
            }
            if command.speed == 0.0 {
                command.speed = config.default_speed as f64;
            }
        }

        if matches!(
            command.kind,
            SetpointKind::Navigate
                | SetpointKind::NavigateGlobal
                | SetpointKind::Position
                | SetpointKind::Velocity
        ) {
            if command.yaw_rate != 0.0 && !command.yaw.is_nan() {
                return Err(CommandError::YawWithYawRate);
            }
            if command.yaw.is_nan() && command.yaw_rate.is_nan() {
                return Err(CommandError::YawUnspecified);
            }
        }

        if command.kind == SetpointKind::NavigateGlobal
            && self
                .cache()
                .read()
                .unwrap()
                .global_position
                .fresh(stamp, config.global_position_timeout)
                .is_none()
        {
            return Err(CommandError::NoGlobalPosition);
        }

        if command.frame_id.is_empty() {
            command.frame_id = config.local_frame.clone();
        }
        let frame_id = command.frame_id.clone();
        let reference_frame = config.reference_frame(&frame_id).to_string();

        if command.kind.has_position() {
            if !self
                .frames()
                .wait(&reference_frame, &frame_id, stamp, config.transform_timeout)
                .await
            {
                return Err(CommandError::TransformUnavailable {
                    from: frame_id,
                    to: reference_frame,
                });
            }
            if !self
                .frames()
                .wait(
                    &config.local_frame,
                    &reference_frame,
                    stamp,
                    config.transform_timeout,
                )
                .await
            {
                return Err(CommandError::TransformUnavailable {
                    from: reference_frame,
                    to: config.local_frame.clone(),
                });
            }
        }

        if command.kind == SetpointKind::NavigateGlobal {
            // project the global target into the local frame, then express
            // its x/y in the request frame; z stays as requested
            let (fix, fix_stamp) = self
                .cache()
                .read()
                .unwrap()
                .global_position
                .fresh_stamped(stamp, config.global_position_timeout)
                .ok_or(CommandError::NoGlobalPosition)?;
            let local_pose = geo::global_to_local(
                command.lat,
                command.lon,
                &fix,
                fix_stamp,
                self.frames(),
                &config.local_frame,
                &config.fcu_frame,
                config.local_position_timeout,
            )?;
            let in_request_frame =
                self.frames()
                    .transform_pose(&local_pose, &frame_id, config.transform_timeout)?;
            command.x = in_request_frame.value.position.x;
            command.y = in_request_frame.value.position.y;
        }

        // decode the yaw policy from the wire sentinels and build the
        // setpoint pose in the request frame
        let mut pose = Pose::from_position(Vector3::new(command.x, command.y, command.z));
        let yaw_policy = if command.yaw.is_nan() {
            YawPolicy::Rate(command.yaw_rate)
        } else if command.yaw.is_infinite() && command.yaw > 0.0 {
            YawPolicy::Towards
        } else {
            pose.orientation = quat_from_rpy(command.roll, command.pitch, command.yaw);
            YawPolicy::Fixed
        };

        let position = if command.kind.has_position() {
            let stamped = Stamped::new(frame_id.clone(), stamp, pose);
            Some(self.frames().transform_pose(
                &stamped,
                &reference_frame,
                config.transform_timeout,
            )?)
        } else {
            None
        };

        let velocity = if command.kind == SetpointKind::Velocity {
            let stamped = Stamped::new(
                frame_id.clone(),
                stamp,
                Vector3::new(command.vx, command.vy, command.vz),
            );
            Some(self.frames().transform_vector(
                &stamped,
                &reference_frame,
                config.transform_timeout,
            )?)
        } else {
            None
        };

        let nav_start = if command.kind.is_navigate() {
            let (pose, pose_stamp) = self
                .cache()
                .read()
                .unwrap()
                .local_position
                .fresh_stamped(stamp, config.local_position_timeout)
                .ok_or(CommandError::NoLocalPosition)?;
            Some(Stamped::new(config.local_frame.clone(), pose_stamp, pose))
        } else {
            None
        };

        // Everything checked out: replace the engine state in one step,
        // publish the first setpoint, and open the stream.
        {
            let mut state = self.engine().lock().unwrap();
            state.kind = command.kind;
            if command.kind.has_position() {
                state.yaw = yaw_policy;
            }
            if let Some(position) = position {
                state.position = position;
            }
            if let Some(velocity) = velocity {
                state.velocity = velocity;
            }
            if let Some(nav_start) = nav_start {
                state.nav_start = nav_start;
                state.nav_speed = command.speed;
            }
            if matches!(command.kind, SetpointKind::Attitude | SetpointKind::Rates) {
                state.thrust = command.thrust;
            }
            if command.kind == SetpointKind::Rates {
                state.rates = Vector3::new(command.roll_rate, command.pitch_rate, command.yaw_rate);
            }
            state.wait_armed = command.auto_arm;
            state.last_transform_ok = stamp;

            engine::publish(&mut state, stamp, self.frames(), self.link(), config);
            state.streaming = true;
        }

        if command.auto_arm {
            self.offboard_and_arm().await?;
            self.engine().lock().unwrap().wait_armed = false;
        } else {
            let state = self.last_state();
            if state.mode != "OFFBOARD" {
                self.engine().lock().unwrap().streaming = false;
                return Err(CommandError::NotInOffboard);
            }
            if !state.armed {
                self.engine().lock().unwrap().streaming = false;
                return Err(CommandError::NotArmed);
            }
        }

        Ok(())
    }
}
