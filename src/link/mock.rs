//! Scriptable in-memory FCU for host tests.
//!
//! Records every published setpoint and service call. Mode and arming
//! requests take effect immediately when accepted, so tests drive the
//! telemetry side by feeding [`MockFcu::state`] back into the bridge.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::LinkError;
use crate::setpoint::{AttitudeTarget, PositionTarget, ThrustTarget};
use crate::telemetry::FcuState;
use crate::types::{Pose, Stamped};

use super::FcuLink;

/// A message observed on one of the outbound channels.
#[derive(Debug, Clone)]
pub enum Published {
    Position(Stamped<Pose>),
    PositionRaw(PositionTarget),
    Attitude(Stamped<Pose>),
    AttitudeRaw(AttitudeTarget),
    Thrust(ThrustTarget),
}

#[derive(Debug)]
pub struct MockFcuInner {
    pub mode: String,
    pub armed: bool,
    pub connected: bool,
    pub published: Vec<Published>,
    pub set_mode_calls: Vec<String>,
    pub arming_calls: Vec<bool>,
    /// When false the respective service call is refused.
    pub accept_set_mode: bool,
    pub accept_arming: bool,
    /// When true the call is accepted but the FCU never follows through,
    /// for exercising handshake timeouts.
    pub hold_mode: bool,
    pub hold_arming: bool,
}

/// Shared mock FCU; clones observe the same state.
#[derive(Debug, Clone)]
pub struct MockFcu {
    inner: Arc<Mutex<MockFcuInner>>,
}

impl MockFcu {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockFcuInner {
                mode: "POSCTL".into(),
                armed: false,
                connected: true,
                published: Vec::new(),
                set_mode_calls: Vec::new(),
                arming_calls: Vec::new(),
                accept_set_mode: true,
                accept_arming: true,
                hold_mode: false,
                hold_arming: false,
            })),
        }
    }

    /// Current state as the telemetry stream would report it.
    pub fn state(&self) -> FcuState {
        let inner = self.inner.lock().unwrap();
        FcuState {
            connected: inner.connected,
            armed: inner.armed,
            mode: inner.mode.clone(),
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn clear_published(&self) {
        self.inner.lock().unwrap().published.clear();
    }

    pub fn set_mode_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().set_mode_calls.clone()
    }

    pub fn arming_calls(&self) -> Vec<bool> {
        self.inner.lock().unwrap().arming_calls.clone()
    }

    /// Mutate the scripted FCU state.
    pub fn configure(&self, f: impl FnOnce(&mut MockFcuInner)) {
        f(&mut self.inner.lock().unwrap());
    }
}

impl Default for MockFcu {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FcuLink for MockFcu {
    fn publish_position(&self, setpoint: &Stamped<Pose>) {
        self.inner
            .lock()
            .unwrap()
            .published
            .push(Published::Position(setpoint.clone()));
    }

    fn publish_position_raw(&self, setpoint: &PositionTarget) {
        self.inner
            .lock()
            .unwrap()
            .published
            .push(Published::PositionRaw(setpoint.clone()));
    }

    fn publish_attitude(&self, setpoint: &Stamped<Pose>) {
        self.inner
            .lock()
            .unwrap()
            .published
            .push(Published::Attitude(setpoint.clone()));
    }

    fn publish_attitude_raw(&self, setpoint: &AttitudeTarget) {
        self.inner
            .lock()
            .unwrap()
            .published
            .push(Published::AttitudeRaw(setpoint.clone()));
    }

    fn publish_thrust(&self, setpoint: &ThrustTarget) {
        self.inner
            .lock()
            .unwrap()
            .published
            .push(Published::Thrust(*setpoint));
    }

    async fn arming(&self, arm: bool) -> Result<bool, LinkError> {
        let mut inner = self.inner.lock().unwrap();
        inner.arming_calls.push(arm);
        if inner.accept_arming && !inner.hold_arming {
            inner.armed = arm;
        }
        Ok(inner.accept_arming)
    }

    async fn set_mode(&self, mode: &str) -> Result<bool, LinkError> {
        let mut inner = self.inner.lock().unwrap();
        inner.set_mode_calls.push(mode.to_string());
        if inner.accept_set_mode && !inner.hold_mode {
            inner.mode = mode.to_string();
        }
        Ok(inner.accept_set_mode)
    }
}
