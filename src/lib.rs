//! offboard_bridge - High-level offboard command mediation for a MAVLink FCU
//!
//! Accepts one motion command at a time ("navigate to this point", "hold this
//! velocity", "adopt this attitude", "land"), keeps the flight controller fed
//! with the continuous setpoint stream its OFFBOARD mode requires, and serves
//! a consolidated telemetry snapshot.
//!
//! # Architecture
//!
//! - [`telemetry`]: last-value telemetry slots with per-slot freshness
//! - [`frames`]: transform tree between named coordinate frames
//! - [`geo`]: WGS-84 projection of global targets into the local frame
//! - [`setpoint`]: setpoint modes, engine state, and the periodic publisher
//! - [`command`]: command records, validation, and the arming handshake
//! - [`link`]: the FCU boundary (setpoint channels + arming/set_mode)
//! - [`bridge`]: the service facade wiring everything together
//!
//! The bridge validates each incoming command against current telemetry,
//! resolves all coordinate frames up front, then commits the prepared
//! setpoint atomically and streams it until another command replaces it.
//! All bounded waits (transform availability, OFFBOARD switch, arming) are
//! polling loops that yield to the runtime, so the setpoint stream never
//! stalls while a command is in flight.

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod frames;
pub mod geo;
pub mod link;
pub mod setpoint;
pub mod telemetry;
pub mod types;

pub use bridge::OffboardBridge;
pub use command::{CommandResponse, Telemetry};
pub use config::Config;
pub use error::{CommandError, TransformError};
