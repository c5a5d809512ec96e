//! Telemetry ingest loop
//!
//! Reads the link, runs the stream framer and publishes every decoded
//! telemetry packet to the shared store:
//!
//! 1. enrich with the latest depth encoder and load cell readings
//! 2. add hammer percent and arrival time
//! 3. write the record to `drill-state`
//! 4. announce the packet type name on `uphole`
//!
//! Only a transport failure ends the loop; its supervisor reopens the link.

use crate::error::Result;
use crate::protocol::constants::READ_CHUNK_SIZE;
use crate::protocol::{FrameEvent, Packet, StreamFramer, TelemetryReport};
use crate::state::unix_time;
use crate::store::{
    KEY_DEPTH_ENCODER, KEY_DRILL_STATE, KEY_LOAD_CELL, SharedStore, TOPIC_UPHOLE, read_json,
};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Depth encoder reading written by its driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthEncoderReading {
    pub depth: f64,
    pub velocity: f64,
}

/// Load cell reading written by its driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadCellReading {
    pub load: f64,
}

/// Enriched telemetry as stored under `drill-state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(flatten)]
    pub telemetry: TelemetryReport,

    /// Hammer position as a percentage of full stroke
    #[serde(default)]
    pub hammer_percent: f64,

    /// Arrival time, seconds since the Unix epoch
    #[serde(default)]
    pub timestamp: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_encoder: Option<DepthEncoderReading>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_cell: Option<LoadCellReading>,
}

impl TelemetryRecord {
    pub fn new(telemetry: TelemetryReport, hammer_max: f64, timestamp: f64) -> Self {
        let hammer_percent = if hammer_max > 0.0 {
            100.0 * telemetry.hammer / hammer_max
        } else {
            0.0
        };
        Self {
            telemetry,
            hammer_percent,
            timestamp,
            depth_encoder: None,
            load_cell: None,
        }
    }
}

/// Counters for the periodic status line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub telemetry: u64,
    pub other_frames: u64,
    pub stray_bytes: u64,
}

pub struct TelemetryIngest<T: Transport> {
    transport: T,
    framer: StreamFramer,
    store: Arc<dyn SharedStore>,
    hammer_max: f64,
    stats: IngestStats,
    buffer: [u8; READ_CHUNK_SIZE],
}

impl<T: Transport> TelemetryIngest<T> {
    pub fn new(transport: T, store: Arc<dyn SharedStore>, hammer_max: f64) -> Self {
        Self {
            transport,
            framer: StreamFramer::new(),
            store,
            hammer_max,
            stats: IngestStats::default(),
            buffer: [0u8; READ_CHUNK_SIZE],
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// One read from the link plus every event it completes
    ///
    /// Returns the number of frames handled.
    pub fn poll_once(&mut self) -> Result<usize> {
        let n = self.transport.read(&mut self.buffer)?;
        if n > 0 {
            log::trace!("RX {} bytes", n);
            self.framer.push(&self.buffer[..n]);
        }

        let mut frames = 0;
        while let Some(event) = self.framer.next_event() {
            match event {
                FrameEvent::Frame(packet) => {
                    self.handle_packet(packet);
                    frames += 1;
                }
                FrameEvent::Stray(count) => {
                    self.stats.stray_bytes += count as u64;
                    log::warn!("Skipped {} stray byte(s) on the downhole link", count);
                }
            }
        }
        Ok(frames)
    }

    /// Ingest until shutdown or a link failure
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        log::info!("Telemetry ingest started");
        while !shutdown.load(Ordering::Relaxed) {
            self.poll_once()?;
        }
        log::info!(
            "Telemetry ingest stopped (telemetry={}, other={}, stray={})",
            self.stats.telemetry,
            self.stats.other_frames,
            self.stats.stray_bytes
        );
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        let ty = packet.packet_type();
        match packet {
            Packet::Telemetry(report) => {
                self.stats.telemetry += 1;
                self.store_telemetry(report);
            }
            Packet::GyroSlipAlarm(alarm) => {
                self.stats.other_frames += 1;
                log::warn!(
                    "Gyro slip alarm: gyro_z={:.2} motor_rpm={:.2}",
                    alarm.gyro_z,
                    alarm.motor_rpm
                );
            }
            Packet::Command(cmd) => {
                self.stats.other_frames += 1;
                log::debug!("Uphole echo of {:?}", cmd);
            }
        }

        // Store failures are logged; the link keeps running
        if let Err(e) = self.store.publish(TOPIC_UPHOLE, ty.name()) {
            log::warn!("Failed to announce {}: {}", ty, e);
        }
    }

    fn store_telemetry(&self, report: TelemetryReport) {
        let store = self.store.as_ref();
        let mut record = TelemetryRecord::new(report, self.hammer_max, unix_time());
        record.depth_encoder = read_json(store, KEY_DEPTH_ENCODER);
        record.load_cell = read_json(store, KEY_LOAD_CELL);

        let written = serde_json::to_string(&record)
            .map_err(crate::error::Error::from)
            .and_then(|json| store.set(KEY_DRILL_STATE, &json));
        match written {
            Ok(()) => log::debug!(
                "Telemetry: rpm={:.2} current={:.2} hammer={:.1}%",
                report.motor_rpm,
                report.motor_current,
                record.hammer_percent
            ),
            Err(e) => log::warn!("Failed to store telemetry: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, RawTelemetry, encode_frame, frame};
    use crate::store::MemoryStore;
    use crate::transport::MockTransport;

    fn telemetry_frame(raw: RawTelemetry) -> Vec<u8> {
        frame(&Packet::Telemetry(raw.scale()).encode())
    }

    fn setup() -> (MockTransport, Arc<MemoryStore>, TelemetryIngest<MockTransport>) {
        let mock = MockTransport::new();
        let store = Arc::new(MemoryStore::new());
        let ingest = TelemetryIngest::new(mock.clone(), store.clone(), 255.0);
        (mock, store, ingest)
    }

    #[test]
    fn test_record_hammer_percent() {
        let report = TelemetryReport {
            hammer: 255.0,
            ..Default::default()
        };
        assert_eq!(TelemetryRecord::new(report, 255.0, 0.0).hammer_percent, 100.0);
        assert_eq!(TelemetryRecord::new(report, 0.0, 0.0).hammer_percent, 0.0);
    }

    #[test]
    fn test_record_json_shape() {
        let mut record = TelemetryRecord::new(TelemetryReport::default(), 255.0, 12.5);
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert!(json.get("motor_rpm").is_some());
        assert!(json.get("depth_encoder").is_none());

        record.load_cell = Some(LoadCellReading { load: 2.0 });
        let text = serde_json::to_string(&record).unwrap();
        let back: TelemetryRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_telemetry_is_stored_and_announced() {
        let (mock, store, mut ingest) = setup();
        let uphole = store.subscribe(TOPIC_UPHOLE).unwrap();
        store
            .set(KEY_DEPTH_ENCODER, r#"{"depth": 12.5, "velocity": 0.1}"#)
            .unwrap();

        mock.inject_read(&telemetry_frame(RawTelemetry {
            motor_current: 1300,
            motor_voltage: 2400,
            hammer: 128,
            ..Default::default()
        }));
        assert_eq!(ingest.poll_once().unwrap(), 1);

        let json = store.get(KEY_DRILL_STATE).unwrap().unwrap();
        let record: TelemetryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record.telemetry.motor_current, 13.0);
        assert_eq!(record.telemetry.motor_voltage, 24.0);
        assert!((record.hammer_percent - 50.196).abs() < 0.01);
        assert!(record.timestamp > 0.0);
        assert_eq!(
            record.depth_encoder,
            Some(DepthEncoderReading {
                depth: 12.5,
                velocity: 0.1
            })
        );
        assert_eq!(record.load_cell, None);

        assert_eq!(uphole.try_recv().unwrap().unwrap().payload, "Telemetry");
    }

    #[test]
    fn test_malformed_enrichment_is_skipped() {
        let (mock, store, mut ingest) = setup();
        store.set(KEY_LOAD_CELL, "garbage").unwrap();
        mock.inject_read(&telemetry_frame(RawTelemetry::default()));
        ingest.poll_once().unwrap();

        let json = store.get(KEY_DRILL_STATE).unwrap().unwrap();
        assert!(!json.contains("load_cell"));
    }

    #[test]
    fn test_other_frames_announced_and_strays_counted() {
        let (mock, store, mut ingest) = setup();
        let uphole = store.subscribe(TOPIC_UPHOLE).unwrap();

        mock.inject_read(&[0x01, 0x02]);
        mock.inject_read(&encode_frame(&Command::Ping));
        assert_eq!(ingest.poll_once().unwrap(), 1);

        assert_eq!(uphole.try_recv().unwrap().unwrap().payload, "Ping");
        assert_eq!(store.get(KEY_DRILL_STATE).unwrap(), None);
        assert_eq!(
            ingest.stats(),
            IngestStats {
                telemetry: 0,
                other_frames: 1,
                stray_bytes: 2
            }
        );
    }

    #[test]
    fn test_transport_failure_ends_loop() {
        let (mock, _store, mut ingest) = setup();
        mock.set_failed(true);
        let shutdown = AtomicBool::new(false);
        assert!(ingest.run(&shutdown).is_err());
    }
}
