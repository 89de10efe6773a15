//! Error types for command validation, the arming handshake, and frame math.
//!
//! Every command failure surfaces to the client as a human-readable message;
//! the display strings here are the exact messages clients see.

use std::io;

fn status_suffix(status: &Option<String>) -> String {
    match status {
        Some(text) => format!(": {text}"),
        None => String::new(),
    }
}

/// Failure of a single command request.
///
/// Command handlers return this internally; the service facade folds it into
/// a `{success: false, message}` response, so the transport call itself never
/// fails.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Another command is currently being validated or armed.
    #[error("Busy")]
    Busy,

    #[error("State timeout, check mavros settings")]
    StateTimeout,

    #[error("No connection to FCU")]
    Disconnected,

    #[error("No local position, check settings")]
    NoLocalPosition,

    #[error("No global position")]
    NoGlobalPosition,

    #[error("Navigate speed must be positive, {0} passed")]
    NegativeSpeed(f32),

    #[error("Yaw value should be NaN for setting yaw rate")]
    YawWithYawRate,

    #[error("Both yaw and yaw_rate cannot be NaN")]
    YawUnspecified,

    #[error("Can't transform from {from} to {to}")]
    TransformUnavailable { from: String, to: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Error calling set_mode service")]
    SetModeCall,

    #[error("Error calling arming service")]
    ArmingCall,

    /// OFFBOARD switch not observed within the timeout. Carries the newest
    /// status text received after the switch was requested, if any.
    #[error("OFFBOARD timed out{}", status_suffix(.status))]
    OffboardTimeout { status: Option<String> },

    #[error("Arming timed out{}", status_suffix(.status))]
    ArmingTimeout { status: Option<String> },

    #[error("Land request timed out{}", status_suffix(.status))]
    LandTimeout { status: Option<String> },

    #[error("Copter is not in OFFBOARD mode, use auto_arm?")]
    NotInOffboard,

    #[error("Copter is not armed, use auto_arm?")]
    NotArmed,

    /// Land gate when `land_only_in_offboard` is set.
    #[error("Copter is not in OFFBOARD mode")]
    LandOutsideOffboard,

    #[error("Can't send set_mode request")]
    SetModeRejected,
}

/// Failure to resolve or apply a transform between two named frames.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransformError {
    /// No path through the tree connects the two frames.
    #[error("no transform from {from} to {to}")]
    NoPath { from: String, to: String },

    /// A path exists but an edge on it is older than the requested stamp
    /// allows.
    #[error("transform from {from} to {to} is too old")]
    TooOld { from: String, to: String },
}

/// Failure on the FCU link (encoding, transport, or command acknowledgement).
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no COMMAND_ACK within timeout")]
    AckTimeout,

    #[error("unsupported flight mode: {0}")]
    UnsupportedMode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_messages_are_verbatim() {
        assert_eq!(CommandError::Busy.to_string(), "Busy");
        assert_eq!(
            CommandError::StateTimeout.to_string(),
            "State timeout, check mavros settings"
        );
        assert_eq!(
            CommandError::NoLocalPosition.to_string(),
            "No local position, check settings"
        );
        assert_eq!(
            CommandError::NegativeSpeed(-1.5).to_string(),
            "Navigate speed must be positive, -1.5 passed"
        );
    }

    #[test]
    fn test_timeout_carries_status_text() {
        let plain = CommandError::OffboardTimeout { status: None };
        assert_eq!(plain.to_string(), "OFFBOARD timed out");

        let augmented = CommandError::ArmingTimeout {
            status: Some("Arming denied: high accel".into()),
        };
        assert_eq!(
            augmented.to_string(),
            "Arming timed out: Arming denied: high accel"
        );
    }

    #[test]
    fn test_transform_unavailable_names_both_frames() {
        let err = CommandError::TransformUnavailable {
            from: "body".into(),
            to: "map".into(),
        };
        assert_eq!(err.to_string(), "Can't transform from body to map");
    }
}
