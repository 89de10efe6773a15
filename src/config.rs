//! Bridge configuration.
//!
//! Loaded from a TOML file; every option has a default so an empty (or
//! missing) file yields a working configuration. Durations are written as
//! seconds, e.g. `state_timeout = 3.0`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can't read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("can't parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("setpoint_rate must be positive, {0} given")]
    BadSetpointRate(f64),

    #[error("default_speed must be positive, {0} given")]
    BadDefaultSpeed(f32),
}

fn duration_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(d)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom("duration must be non-negative"));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// World-fixed frame used for navigation (ENU, origin at takeoff).
    pub local_frame: String,
    /// Vehicle body frame as reported by the FCU driver.
    pub fcu_frame: String,
    /// Frame broadcast at the current navigation target.
    pub target_frame: String,
    /// Yaw-only body frame broadcast on every local position update.
    pub body_frame: String,
    /// Per-frame reference frame overrides; a frame absent here is its own
    /// reference.
    pub reference_frames: HashMap<String, String>,

    /// Substitute for `speed = 0` in navigate commands, m/s.
    pub default_speed: f32,
    /// Setpoint stream frequency, Hz.
    pub setpoint_rate: f64,

    #[serde(deserialize_with = "duration_secs")]
    pub state_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub local_position_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub velocity_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub global_position_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub battery_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub transform_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub telemetry_transform_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub offboard_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub arming_timeout: Duration,
    #[serde(deserialize_with = "duration_secs")]
    pub land_timeout: Duration,

    /// Reserved; accepted for compatibility, currently without effect.
    pub auto_release: bool,
    /// Reject `land` unless the FCU is already in OFFBOARD mode.
    pub land_only_in_offboard: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_frame: "map".into(),
            fcu_frame: "base_link".into(),
            target_frame: "navigate_target".into(),
            body_frame: "body".into(),
            reference_frames: HashMap::new(),
            default_speed: 0.5,
            setpoint_rate: 30.0,
            state_timeout: Duration::from_secs(3),
            local_position_timeout: Duration::from_secs(2),
            velocity_timeout: Duration::from_secs(2),
            global_position_timeout: Duration::from_secs(10),
            battery_timeout: Duration::from_secs(2),
            transform_timeout: Duration::from_millis(500),
            telemetry_transform_timeout: Duration::from_millis(500),
            offboard_timeout: Duration::from_secs(3),
            arming_timeout: Duration::from_secs(4),
            land_timeout: Duration::from_secs(3),
            auto_release: true,
            land_only_in_offboard: true,
        }
    }
}

impl Config {
    /// Parse and validate a TOML configuration string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, failing before any service comes up.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Reference frame for `frame_id`: the configured override, or the frame
    /// itself.
    pub fn reference_frame<'a>(&'a self, frame_id: &'a str) -> &'a str {
        self.reference_frames
            .get(frame_id)
            .map(String::as_str)
            .unwrap_or(frame_id)
    }

    /// Tick period of the setpoint stream.
    pub fn setpoint_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.setpoint_rate)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.setpoint_rate > 0.0) {
            return Err(ConfigError::BadSetpointRate(self.setpoint_rate));
        }
        if !(self.default_speed > 0.0) {
            return Err(ConfigError::BadDefaultSpeed(self.default_speed));
        }
        Ok(())
    }
}
