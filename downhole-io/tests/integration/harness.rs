//! Shared helpers for the integration tests

use downhole_io::config::AppConfig;
use downhole_io::ingest::TelemetryRecord;
use downhole_io::protocol::{Command, FrameEvent, Packet, StreamFramer, TelemetryReport, frame};
use downhole_io::store::{KEY_DRILL_STATE, SharedStore, read_json};
use std::time::{Duration, Instant};

/// Config with short timeouts and the store server off
pub fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.serial.read_timeout_ms = 10;
    config.serial.reconnect_backoff_ms = 5;
    config.serial.reconnect_backoff_max_ms = 20;
    config.store.enabled = false;
    config
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn telemetry_frame(report: TelemetryReport) -> Vec<u8> {
    frame(&Packet::Telemetry(report).encode())
}

pub fn drill_state(store: &dyn SharedStore) -> Option<TelemetryRecord> {
    read_json(store, KEY_DRILL_STATE)
}

/// Commands framed in `bytes`, ignoring anything else
pub fn written_commands(bytes: &[u8]) -> Vec<Command> {
    let mut framer = StreamFramer::new();
    framer.push(bytes);
    framer
        .events()
        .filter_map(|e| match e {
            FrameEvent::Frame(Packet::Command(c)) => Some(c),
            _ => None,
        })
        .collect()
}
