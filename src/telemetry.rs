//! Last-value telemetry cache.
//!
//! One slot per inbound telemetry stream, each stamped with its arrival
//! time. A read returns the value only while the stamp is within the slot's
//! configured timeout of "now"; there is no blocking wait; publishers are
//! expected to write well above `1/timeout`.

use std::time::Duration;

use nalgebra::Vector3;
use tokio::time::Instant;

use crate::types::Pose;

/// FCU connection / arming / flight mode report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FcuState {
    pub connected: bool,
    pub armed: bool,
    pub mode: String,
}

/// Linear and angular velocity, expressed in `frame_id` (angular part is
/// always body rates).
#[derive(Debug, Clone)]
pub struct Velocity {
    pub frame_id: String,
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

/// Global fix from the FCU.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Battery report; `cell_voltage` may be empty when per-cell sensing is
/// unavailable.
#[derive(Debug, Clone)]
pub struct Battery {
    pub voltage: f32,
    pub cell_voltage: Vec<f32>,
}

/// A single last-value slot.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    inner: Option<(T, Instant)>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self { inner: None }
    }
}

impl<T: Clone> Slot<T> {
    pub fn set(&mut self, value: T, stamp: Instant) {
        self.inner = Some((value, stamp));
    }

    /// The value, if one was stored within `timeout` of `now`.
    pub fn fresh(&self, now: Instant, timeout: Duration) -> Option<T> {
        self.fresh_stamped(now, timeout).map(|(value, _)| value)
    }

    pub fn fresh_stamped(&self, now: Instant, timeout: Duration) -> Option<(T, Instant)> {
        match &self.inner {
            Some((value, stamp)) if now.saturating_duration_since(*stamp) <= timeout => {
                Some((value.clone(), *stamp))
            }
            _ => None,
        }
    }

    /// The value regardless of age.
    pub fn last(&self) -> Option<&(T, Instant)> {
        self.inner.as_ref()
    }
}

/// All telemetry slots. Lives behind a `RwLock` in the bridge: subscribers
/// write, command validation and the telemetry service read.
#[derive(Debug, Default)]
pub struct TelemetryCache {
    pub state: Slot<FcuState>,
    pub local_position: Slot<Pose>,
    pub velocity: Slot<Velocity>,
    pub global_position: Slot<GlobalPosition>,
    pub battery: Slot<Battery>,
    /// Status text is not freshness-gated; the handshake only asks for the
    /// newest entry after a given instant.
    pub status_text: Slot<String>,
}

impl TelemetryCache {
    /// Newest status text stamped strictly after `start`, if any.
    pub fn status_text_after(&self, start: Instant) -> Option<String> {
        self.status_text
            .last()
            .filter(|(_, stamp)| *stamp > start)
            .map(|(text, _)| text.clone())
    }
}
