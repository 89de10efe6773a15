//! The service facade.
//!
//! [`OffboardBridge`] owns the telemetry cache, the transform tree, the
//! engine state, and the FCU link, and exposes the eight services. Telemetry
//! ingest methods are called by whatever feeds the bridge (the MAVLink read
//! loop in the binary, a test harness on the host); each write also keeps
//! the transform tree current, and a local position update re-broadcasts the
//! yaw-only body frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::info;
use nalgebra::{Isometry3, Translation3};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::command::{
    Command, CommandResponse, Navigate, NavigateGlobal, SetAttitude, SetPosition, SetRates,
    SetVelocity, Telemetry,
};
use crate::config::Config;
use crate::error::CommandError;
use crate::frames::{pose_to_isometry, Frames};
use crate::link::FcuLink;
use crate::setpoint::{engine, EngineState};
use crate::telemetry::{Battery, FcuState, GlobalPosition, TelemetryCache, Velocity};
use crate::types::{yaw_only, Pose, Stamped};

pub struct OffboardBridge {
    config: Config,
    link: Arc<dyn FcuLink>,
    frames: Arc<Frames>,
    cache: RwLock<TelemetryCache>,
    engine: Mutex<EngineState>,
    /// At most one command in flight across all services.
    busy: AtomicBool,
}

impl OffboardBridge {
    pub fn new(config: Config, link: Arc<dyn FcuLink>) -> Arc<Self> {
        let now = Instant::now();
        let engine = EngineState::new(now, &config.local_frame);
        Arc::new(Self {
            config,
            link,
            frames: Arc::new(Frames::new()),
            cache: RwLock::new(TelemetryCache::default()),
            engine: Mutex::new(engine),
            busy: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    // -- Telemetry ingest --

    pub fn handle_state(&self, state: FcuState) {
        self.cache.write().unwrap().state.set(state, Instant::now());
    }

    /// Local pose update: cache it, refresh the FCU frame in the transform
    /// tree, and re-broadcast the yaw-only body frame.
    pub fn handle_local_position(&self, pose: Pose) {
        let now = Instant::now();
        self.cache.write().unwrap().local_position.set(pose, now);

        self.frames.insert(
            &self.config.local_frame,
            &self.config.fcu_frame,
            now,
            pose_to_isometry(&pose),
        );
        if !self.config.body_frame.is_empty() {
            let body = Isometry3::from_parts(
                Translation3::from(pose.position),
                yaw_only(&pose.orientation),
            );
            self.frames
                .insert(&self.config.local_frame, &self.config.body_frame, now, body);
        }
    }

    pub fn handle_velocity(&self, velocity: Velocity) {
        self.cache
            .write()
            .unwrap()
            .velocity
            .set(velocity, Instant::now());
    }

    pub fn handle_global_position(&self, fix: GlobalPosition) {
        self.cache
            .write()
            .unwrap()
            .global_position
            .set(fix, Instant::now());
    }

    pub fn handle_battery(&self, battery: Battery) {
        self.cache
            .write()
            .unwrap()
            .battery
            .set(battery, Instant::now());
    }

    pub fn handle_status_text(&self, text: impl Into<String>) {
        self.cache
            .write()
            .unwrap()
            .status_text
            .set(text.into(), Instant::now());
    }

    // -- Setpoint stream --

    /// Spawn the periodic publisher; runs for the life of the process.
    pub fn spawn_stream(self: &Arc<Self>) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(bridge.config.setpoint_period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let now = ticker.tick().await;
                bridge.tick(now);
            }
        })
    }

    /// One stream tick; public so a test harness can drive the clock itself.
    pub fn tick(&self, now: Instant) {
        let mut state = self.engine.lock().unwrap();
        if state.streaming {
            engine::publish(&mut state, now, &self.frames, self.link.as_ref(), &self.config);
        }
    }

    // -- Command services --

    pub async fn navigate(&self, request: Navigate) -> CommandResponse {
        self.execute(request.into()).await
    }

    pub async fn navigate_global(&self, request: NavigateGlobal) -> CommandResponse {
        self.execute(request.into()).await
    }

    pub async fn set_position(&self, request: SetPosition) -> CommandResponse {
        self.execute(request.into()).await
    }

    pub async fn set_velocity(&self, request: SetVelocity) -> CommandResponse {
        self.execute(request.into()).await
    }

    pub async fn set_attitude(&self, request: SetAttitude) -> CommandResponse {
        self.execute(request.into()).await
    }

    pub async fn set_rates(&self, request: SetRates) -> CommandResponse {
        self.execute(request.into()).await
    }

    async fn execute(&self, command: Command) -> CommandResponse {
        self.guarded(self.serve(command)).await
    }

    /// Switch the FCU to AUTO.LAND and wait for the mode to take. The engine
    /// state is left untouched; the FCU's own landing outranks the stream.
    pub async fn land(&self) -> CommandResponse {
        self.guarded(self.land_inner()).await
    }

    /// Run one command under the busy guard, folding the result into a
    /// response.
    async fn guarded(
        &self,
        operation: impl std::future::Future<Output = Result<(), CommandError>>,
    ) -> CommandResponse {
        if self.busy.swap(true, Ordering::SeqCst) {
            return self.respond(Err(CommandError::Busy));
        }
        let result = operation.await;
        self.busy.store(false, Ordering::SeqCst);
        self.respond(result)
    }

    fn respond(&self, result: Result<(), CommandError>) -> CommandResponse {
        if let Err(error) = &result {
            info!("command rejected: {error}");
        }
        result.into()
    }

    // -- Shared helpers for the command path --

    /// State slot value if fresh and connected.
    pub(crate) fn check_state(&self, now: Instant) -> Result<FcuState, CommandError> {
        let state = self
            .cache
            .read()
            .unwrap()
            .state
            .fresh(now, self.config.state_timeout)
            .ok_or(CommandError::StateTimeout)?;
        if !state.connected {
            return Err(CommandError::Disconnected);
        }
        Ok(state)
    }

    /// Latest state regardless of freshness; the poll loops watch this after
    /// `check_state` has already vouched for the stream.
    pub(crate) fn last_state(&self) -> FcuState {
        self.cache
            .read()
            .unwrap()
            .state
            .last()
            .map(|(state, _)| state.clone())
            .unwrap_or_default()
    }

    pub(crate) fn status_text_after(&self, start: Instant) -> Option<String> {
        self.cache.read().unwrap().status_text_after(start)
    }

    pub(crate) fn cache(&self) -> &RwLock<TelemetryCache> {
        &self.cache
    }

    pub(crate) fn link(&self) -> &dyn FcuLink {
        self.link.as_ref()
    }

    pub(crate) fn engine(&self) -> &Mutex<EngineState> {
        &self.engine
    }

    // -- Telemetry service --

    /// Consolidated snapshot in `frame_id` (the local frame when empty).
    /// Stale slots surface as NaN fields.
    pub async fn get_telemetry(&self, frame_id: &str) -> Telemetry {
        let stamp = Instant::now();
        let frame_id = if frame_id.is_empty() {
            self.config.local_frame.as_str()
        } else {
            frame_id
        };
        let mut telemetry = Telemetry::empty(frame_id);

        if let Some(state) = self
            .cache
            .read()
            .unwrap()
            .state
            .fresh(stamp, self.config.state_timeout)
        {
            telemetry.connected = state.connected;
            telemetry.armed = state.armed;
            telemetry.mode = state.mode;
        }

        self.frames
            .wait(
                &self.config.local_frame,
                frame_id,
                stamp,
                self.config.telemetry_transform_timeout,
            )
            .await;
        let tolerance = self.config.telemetry_transform_timeout;

        let local_position = self
            .cache
            .read()
            .unwrap()
            .local_position
            .fresh_stamped(stamp, self.config.local_position_timeout);
        if let Some((pose, pose_stamp)) = local_position {
            let stamped = Stamped::new(self.config.local_frame.clone(), pose_stamp, pose);
            if let Ok(out) = self.frames.transform_pose(&stamped, frame_id, tolerance) {
                telemetry.x = out.value.position.x;
                telemetry.y = out.value.position.y;
                telemetry.z = out.value.position.z;
                let (roll, pitch, yaw) = out.value.orientation.euler_angles();
                telemetry.roll = roll;
                telemetry.pitch = pitch;
                telemetry.yaw = yaw;
            }
        }

        let velocity = self
            .cache
            .read()
            .unwrap()
            .velocity
            .fresh_stamped(stamp, self.config.velocity_timeout);
        if let Some((velocity, velocity_stamp)) = velocity {
            let linear = Stamped::new(velocity.frame_id.clone(), velocity_stamp, velocity.linear);
            if let Ok(out) = self.frames.transform_vector(&linear, frame_id, tolerance) {
                telemetry.vx = out.value.x;
                telemetry.vy = out.value.y;
                telemetry.vz = out.value.z;
            }
            // angular velocity passes through as body rates
            telemetry.roll_rate = velocity.angular.x;
            telemetry.pitch_rate = velocity.angular.y;
            telemetry.yaw_rate = velocity.angular.z;
        }

        if let Some(fix) = self
            .cache
            .read()
            .unwrap()
            .global_position
            .fresh(stamp, self.config.global_position_timeout)
        {
            telemetry.lat = fix.latitude;
            telemetry.lon = fix.longitude;
            telemetry.alt = fix.altitude;
        }

        if let Some(battery) = self
            .cache
            .read()
            .unwrap()
            .battery
            .fresh(stamp, self.config.battery_timeout)
        {
            telemetry.voltage = battery.voltage;
            if let Some(cell) = battery.cell_voltage.first() {
                telemetry.cell_voltage = *cell;
            }
        }

        telemetry
    }
}
