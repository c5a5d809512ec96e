//! Daemon loops over a mock serial link

use crate::harness::{drill_state, fast_config, telemetry_frame, wait_until, written_commands};
use approx::assert_relative_eq;
use downhole_io::DownholeApp;
use downhole_io::orientation::Quaternion;
use downhole_io::protocol::{Command, TelemetryReport};
use downhole_io::state::DrillStateAggregator;
use downhole_io::store::{KEY_DEPTH_ENCODER, TOPIC_DOWNHOLE, TOPIC_ORICALIB, TOPIC_UPHOLE};
use downhole_io::transport::MockTransport;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

fn start_app() -> (MockTransport, DownholeApp) {
    let mock = MockTransport::new();
    let mut app = DownholeApp::with_connector(fast_config(), Arc::new(mock.clone()));
    app.start().unwrap();
    (mock, app)
}

#[test]
fn test_telemetry_survives_line_noise() {
    let (mock, mut app) = start_app();
    let store = app.store();
    let uphole = store.subscribe(TOPIC_UPHOLE).unwrap();
    store
        .set(KEY_DEPTH_ENCODER, r#"{"depth": 42.0, "velocity": -0.5}"#)
        .unwrap();

    let report = TelemetryReport {
        motor_rpm: 13.0,
        hammer: 128.0,
        quat_w: 1.0,
        ..Default::default()
    };
    let mut bytes = vec![0x00, 0x13, 0xAA];
    bytes.extend(telemetry_frame(report));
    bytes.push(0xFF);
    mock.inject_read(&bytes);

    assert!(wait_until(TIMEOUT, || drill_state(store.as_ref()).is_some()));
    let record = drill_state(store.as_ref()).unwrap();
    assert_eq!(record.telemetry.motor_rpm, 13.0);
    assert_relative_eq!(record.hammer_percent, 50.196, epsilon = 1e-3);
    assert_eq!(record.depth_encoder.map(|d| d.depth), Some(42.0));
    assert!(record.load_cell.is_none());

    let msg = uphole.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert_eq!(msg.payload, "Telemetry");
    app.stop();
}

#[test]
fn test_intents_become_frames_in_order() {
    let (mock, mut app) = start_app();
    let store = app.store();

    for intent in ["motor-pwm:300", "bogus", "motor-rpm:-20", "set-alarm:gyro,1"] {
        store.publish(TOPIC_DOWNHOLE, intent).unwrap();
    }
    assert!(wait_until(TIMEOUT, || written_commands(&mock.get_written()).len() >= 3));
    app.stop();

    let commands = written_commands(&mock.get_written());
    assert_eq!(
        commands,
        vec![
            Command::motor_pwm(255).0,
            Command::motor_rpm(-20).0,
            Command::SetAlarm {
                alarm: downhole_io::protocol::Alarm::Gyro,
                enabled: true,
            },
            Command::MotorStop,
        ]
    );
}

#[test]
fn test_ingest_resumes_after_link_failure() {
    let (mock, mut app) = start_app();
    let store = app.store();
    // Ingest and dispatcher both hold a handle
    assert!(wait_until(TIMEOUT, || mock.connect_count() == 2));

    mock.set_failed(true);
    std::thread::sleep(Duration::from_millis(50));
    mock.set_failed(false);

    let report = TelemetryReport {
        tachometer: 7.0,
        quat_w: 1.0,
        ..Default::default()
    };
    mock.inject_read(&telemetry_frame(report));
    assert!(wait_until(TIMEOUT, || {
        drill_state(store.as_ref()).is_some_and(|r| r.telemetry.tachometer == 7.0)
    }));
    assert!(mock.connect_count() > 2);
    app.stop();
}

#[test]
fn test_zero_request_cancels_roll() {
    let (mock, mut app) = start_app();
    let store = app.store();

    let q = Quaternion::about_z(90f64.to_radians());
    let report = TelemetryReport {
        quat_x: q.x,
        quat_y: q.y,
        quat_z: q.z,
        quat_w: q.w,
        ..Default::default()
    };
    mock.inject_read(&telemetry_frame(report));
    assert!(wait_until(TIMEOUT, || drill_state(store.as_ref()).is_some()));

    let aggregator = DrillStateAggregator::new(Arc::clone(&store), 15.0);
    let before = aggregator.snapshot().sfus.unwrap();
    assert_relative_eq!(before.angles.roll, 90.0, epsilon = 1.0);

    store.publish(TOPIC_ORICALIB, "zero:sfus").unwrap();
    assert!(wait_until(TIMEOUT, || {
        store.get("oricalib-sfus-roll").unwrap().is_some()
    }));

    let after = aggregator.snapshot();
    assert!(after.alive);
    assert_relative_eq!(after.sfus.unwrap().angles.roll, 0.0, epsilon = 1e-6);
    assert!(after.ahrs.is_none());
    app.stop();
}
