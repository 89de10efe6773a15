//! Bridge executable: wire the library to a real MAVLink FCU.
//!
//! Usage: `offboard_bridge [address] [config.toml]`
//!
//! `address` is a mavlink connection string (default `udpin:0.0.0.0:14540`).
//! Inbound telemetry is decoded on a dedicated read thread and fed into the
//! bridge; the setpoint stream runs on the async runtime.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{info, warn};
use mavlink::common::{MavMessage, MavModeFlag};
use nalgebra::{UnitQuaternion, Vector3};

use offboard_bridge::link::encode;
use offboard_bridge::link::mavlink::MavlinkLink;
use offboard_bridge::telemetry::{Battery, FcuState, GlobalPosition, Velocity};
use offboard_bridge::types::Pose;
use offboard_bridge::{Config, OffboardBridge};

/// Inbound decoding state: attitude and body rates arrive on their own
/// message and are merged into the next local position update.
#[derive(Default)]
struct Ingest {
    orientation: Option<UnitQuaternion<f64>>,
    body_rates: Vector3<f64>,
}

fn route(
    bridge: &OffboardBridge,
    link: &MavlinkLink,
    ingest: &Mutex<Ingest>,
    message: MavMessage,
) {
    match message {
        MavMessage::HEARTBEAT(data) => {
            let mode = encode::px4_mode_name(data.custom_mode).unwrap_or("").to_string();
            bridge.handle_state(FcuState {
                connected: true,
                armed: data
                    .base_mode
                    .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED),
                mode,
            });
        }
        MavMessage::ATTITUDE_QUATERNION(data) => {
            let ned = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                data.q1 as f64,
                data.q2 as f64,
                data.q3 as f64,
                data.q4 as f64,
            ));
            let mut ingest = ingest.lock().unwrap();
            ingest.orientation = Some(encode::orientation_ned_to_enu(&ned));
            ingest.body_rates = Vector3::new(
                data.rollspeed as f64,
                -data.pitchspeed as f64,
                -data.yawspeed as f64,
            );
        }
        MavMessage::LOCAL_POSITION_NED(data) => {
            let ingest = ingest.lock().unwrap();
            let Some(orientation) = ingest.orientation else {
                return;
            };
            let ned_position = Vector3::new(data.x as f64, data.y as f64, data.z as f64);
            let ned_velocity = Vector3::new(data.vx as f64, data.vy as f64, data.vz as f64);
            bridge.handle_local_position(Pose::new(
                encode::world_ned_to_enu(&ned_position),
                orientation,
            ));
            bridge.handle_velocity(Velocity {
                frame_id: bridge.config().local_frame.clone(),
                linear: encode::world_ned_to_enu(&ned_velocity),
                angular: ingest.body_rates,
            });
        }
        MavMessage::GLOBAL_POSITION_INT(data) => {
            bridge.handle_global_position(GlobalPosition {
                latitude: data.lat as f64 / 1e7,
                longitude: data.lon as f64 / 1e7,
                altitude: data.alt as f64 / 1e3,
            });
        }
        MavMessage::BATTERY_STATUS(data) => {
            let cells: Vec<f32> = data
                .voltages
                .iter()
                .filter(|mv| **mv != u16::MAX)
                .map(|mv| *mv as f32 / 1000.0)
                .collect();
            bridge.handle_battery(Battery {
                voltage: cells.iter().sum(),
                cell_voltage: cells,
            });
        }
        MavMessage::STATUSTEXT(data) => {
            let text = String::from_utf8_lossy(&data.text)
                .trim_end_matches('\0')
                .to_string();
            bridge.handle_status_text(text);
        }
        MavMessage::COMMAND_ACK(data) => link.handle_ack(&data),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "udpin:0.0.0.0:14540".into());
    let config = match args.next() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let link = Arc::new(MavlinkLink::connect(&address, 1)?);
    let bridge = OffboardBridge::new(config, link.clone());
    bridge.spawn_stream();

    let reader_bridge = bridge.clone();
    let reader_link = link.clone();
    thread::spawn(move || {
        let ingest = Mutex::new(Ingest::default());
        loop {
            match reader_link.recv() {
                Ok((_header, message)) => {
                    route(&reader_bridge, &reader_link, &ingest, message);
                }
                Err(e) => {
                    warn!("link read failed: {e}");
                    thread::sleep(Duration::from_secs(1));
                }
            }
        }
    });

    info!("offboard bridge ready on {address}");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
