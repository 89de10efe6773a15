//! OFFBOARD + arming handshake and the land command.
//!
//! Both are bounded polling loops over the state slot: request the change,
//! then watch telemetry at 10 Hz until the FCU reports it or the timeout
//! fires. The loops only sleep, never block, so the setpoint stream keeps
//! running underneath; the FCU refuses the OFFBOARD switch without it.

use std::time::Duration;

use log::info;
use tokio::time::{sleep, Instant};

use crate::bridge::OffboardBridge;
use crate::error::CommandError;

const POLL: Duration = Duration::from_millis(100);

impl OffboardBridge {
    /// Drive the FCU into OFFBOARD mode and arm it, while the setpoint
    /// stream keeps publishing.
    pub(crate) async fn offboard_and_arm(&self) -> Result<(), CommandError> {
        if self.last_state().mode != "OFFBOARD" {
            let start = Instant::now();
            info!("switching to OFFBOARD");
            if self.link().set_mode("OFFBOARD").await.is_err() {
                return Err(CommandError::SetModeCall);
            }
            loop {
                if self.last_state().mode == "OFFBOARD" {
                    break;
                }
                if Instant::now().saturating_duration_since(start)
                    > self.config().offboard_timeout
                {
                    return Err(CommandError::OffboardTimeout {
                        status: self.status_text_after(start),
                    });
                }
                sleep(POLL).await;
            }
        }

        if !self.last_state().armed {
            let start = Instant::now();
            info!("arming");
            if self.link().arming(true).await.is_err() {
                return Err(CommandError::ArmingCall);
            }
            loop {
                if self.last_state().armed {
                    break;
                }
                if Instant::now().saturating_duration_since(start) > self.config().arming_timeout {
                    return Err(CommandError::ArmingTimeout {
                        status: self.status_text_after(start),
                    });
                }
                sleep(POLL).await;
            }
        }

        Ok(())
    }

    pub(crate) async fn land_inner(&self) -> Result<(), CommandError> {
        let now = Instant::now();
        let state = self.check_state(now)?;

        if self.config().land_only_in_offboard && state.mode != "OFFBOARD" {
            return Err(CommandError::LandOutsideOffboard);
        }

        let start = Instant::now();
        info!("landing");
        match self.link().set_mode("AUTO.LAND").await {
            Err(_) => return Err(CommandError::SetModeCall),
            Ok(false) => return Err(CommandError::SetModeRejected),
            Ok(true) => {}
        }

        loop {
            if self.last_state().mode == "AUTO.LAND" {
                return Ok(());
            }
            if Instant::now().saturating_duration_since(start) > self.config().land_timeout {
                return Err(CommandError::LandTimeout {
                    status: self.status_text_after(start),
                });
            }
            sleep(POLL).await;
        }
    }
}
