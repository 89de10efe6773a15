//! [`FcuLink`] over a real MAVLink connection.
//!
//! Setpoint publishes are fire-and-forget writes; `arming` and `set_mode`
//! are COMMAND_LONG requests that resolve when the matching COMMAND_ACK
//! arrives. The owner of the connection's read loop must route COMMAND_ACK
//! frames back in through [`MavlinkLink::handle_ack`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use mavlink::common::{MavCmd, MavMessage, MavResult, COMMAND_ACK_DATA};
use mavlink::error::MessageWriteError;
use mavlink::{MavConnection, MavHeader};
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};

use crate::error::LinkError;
use crate::setpoint::{AttitudeTarget, PositionTarget, ThrustTarget};
use crate::types::{Pose, Stamped};

use super::encode;
use super::FcuLink;

/// How long a COMMAND_LONG may stay unacknowledged before the service call
/// counts as failed.
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

pub struct MavlinkLink {
    conn: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    boot: Instant,
    target: (u8, u8),
    /// Last thrust seen on the thrust channel; folded into the next
    /// attitude message, which is how the FCU wants the pair delivered.
    thrust: Mutex<f32>,
    pending_ack: Mutex<Option<(MavCmd, oneshot::Sender<bool>)>>,
}

impl MavlinkLink {
    pub fn new(conn: Box<dyn MavConnection<MavMessage> + Send + Sync>, target_system: u8) -> Self {
        Self {
            conn,
            boot: Instant::now(),
            target: (target_system, 1),
            thrust: Mutex::new(0.0),
            pending_ack: Mutex::new(None),
        }
    }

    /// Connect using a mavlink address string such as
    /// `udpout:127.0.0.1:14540` or `serial:/dev/ttyACM0:57600`.
    pub fn connect(address: &str, target_system: u8) -> Result<Self, LinkError> {
        let conn = mavlink::connect::<MavMessage>(address)?;
        Ok(Self::new(conn, target_system))
    }

    /// Blocking read of the next inbound frame; run this on its own thread
    /// and feed the results to the bridge (and COMMAND_ACKs back here).
    pub fn recv(&self) -> Result<(MavHeader, MavMessage), LinkError> {
        loop {
            match self.conn.recv() {
                Ok(frame) => return Ok(frame),
                Err(mavlink::error::MessageReadError::Io(e))
                    if e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    continue;
                }
                Err(mavlink::error::MessageReadError::Io(e)) => return Err(LinkError::Io(e)),
                // skip frames we can't parse
                Err(mavlink::error::MessageReadError::Parse(_)) => continue,
            }
        }
    }

    /// Route a COMMAND_ACK from the read loop to the waiting service call.
    pub fn handle_ack(&self, ack: &COMMAND_ACK_DATA) {
        let mut pending = self.pending_ack.lock().unwrap();
        if let Some((command, _)) = pending.as_ref() {
            if *command == ack.command {
                let (_, sender) = pending.take().unwrap();
                let _ = sender.send(ack.result == MavResult::MAV_RESULT_ACCEPTED);
            }
        }
    }

    fn time_boot_ms(&self) -> u32 {
        self.boot.elapsed().as_millis() as u32
    }

    fn send(&self, message: &MavMessage) -> Result<(), LinkError> {
        self.conn
            .send(&MavHeader::default(), message)
            .map(|_| ())
            .map_err(|e| match e {
                MessageWriteError::Io(io) => LinkError::Io(io),
            })
    }

    fn publish(&self, message: &MavMessage) {
        if let Err(e) = self.send(message) {
            warn!("setpoint publish failed: {e}");
        }
    }

    async fn command(&self, message: MavMessage, command: MavCmd) -> Result<bool, LinkError> {
        let (sender, receiver) = oneshot::channel();
        *self.pending_ack.lock().unwrap() = Some((command, sender));
        self.send(&message)?;
        match timeout(ACK_TIMEOUT, receiver).await {
            Ok(Ok(accepted)) => Ok(accepted),
            _ => {
                self.pending_ack.lock().unwrap().take();
                Err(LinkError::AckTimeout)
            }
        }
    }
}

#[async_trait]
impl FcuLink for MavlinkLink {
    fn publish_position(&self, setpoint: &Stamped<Pose>) {
        self.publish(&encode::pose_target(
            &setpoint.value,
            self.time_boot_ms(),
            self.target,
        ));
    }

    fn publish_position_raw(&self, setpoint: &PositionTarget) {
        self.publish(&encode::position_target(
            setpoint,
            self.time_boot_ms(),
            self.target,
        ));
    }

    fn publish_attitude(&self, setpoint: &Stamped<Pose>) {
        let thrust = *self.thrust.lock().unwrap();
        self.publish(&encode::attitude_target(
            &setpoint.value.orientation,
            thrust,
            self.time_boot_ms(),
            self.target,
        ));
    }

    fn publish_attitude_raw(&self, setpoint: &AttitudeTarget) {
        self.publish(&encode::rates_target(
            setpoint,
            self.time_boot_ms(),
            self.target,
        ));
    }

    fn publish_thrust(&self, setpoint: &ThrustTarget) {
        *self.thrust.lock().unwrap() = setpoint.thrust;
    }

    async fn arming(&self, arm: bool) -> Result<bool, LinkError> {
        self.command(
            encode::arm_command(arm, self.target),
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
        )
        .await
    }

    async fn set_mode(&self, mode: &str) -> Result<bool, LinkError> {
        let (main_mode, sub_mode) =
            encode::px4_mode(mode).ok_or_else(|| LinkError::UnsupportedMode(mode.to_string()))?;
        self.command(
            encode::set_mode_command(main_mode, sub_mode, self.target),
            MavCmd::MAV_CMD_DO_SET_MODE,
        )
        .await
    }
}
