//! Projection of global (lat/lon) targets into the local frame.
//!
//! Uses the WGS-84 inverse geodesic: azimuth and ground distance from the
//! vehicle's current fix to the target give a flat offset from the vehicle's
//! local pose. Altitude is intentionally left at zero; the caller supplies
//! the requested `z` in its own frame.

use std::time::Duration;

use geographiclib_rs::{Geodesic, InverseGeodesic};
use nalgebra::Vector3;
use tokio::time::Instant;

use crate::error::TransformError;
use crate::frames::Frames;
use crate::telemetry::GlobalPosition;
use crate::types::{Pose, Stamped};

/// Ground distance (m) and azimuth (rad, clockwise from north) from `from`
/// to `(lat, lon)` on the WGS-84 ellipsoid.
pub fn inverse(from: &GlobalPosition, lat: f64, lon: f64) -> (f64, f64) {
    let geod = Geodesic::wgs84();
    let (distance, azimuth, _azi2, _a12): (f64, f64, f64, f64) =
        geod.inverse(from.latitude, from.longitude, lat, lon);
    (distance, azimuth.to_radians())
}

/// Pose of the `(lat, lon)` target in `local_frame`: the FCU's local pose at
/// the fix stamp, offset by the geodesic projection. Orientation is identity
/// and `z` is zero.
pub fn global_to_local(
    lat: f64,
    lon: f64,
    fix: &GlobalPosition,
    fix_stamp: Instant,
    frames: &Frames,
    local_frame: &str,
    fcu_frame: &str,
    tolerance: Duration,
) -> Result<Stamped<Pose>, TransformError> {
    let (distance, azimuth) = inverse(fix, lat, lon);
    // azimuth is clockwise from north: east offset uses sin, north uses cos
    let x_offset = distance * azimuth.sin();
    let y_offset = distance * azimuth.cos();

    let fcu = frames.lookup(local_frame, fcu_frame, fix_stamp, tolerance)?;
    let origin = fcu.translation.vector;

    Ok(Stamped::new(
        local_frame,
        fix_stamp,
        Pose::from_position(Vector3::new(origin.x + x_offset, origin.y + y_offset, 0.0)),
    ))
}
