//! Simulated downhole unit
//!
//! Stands in for the serial link when `serial.port = "sim"`. Reads return
//! framed telemetry at `simulation.rate_hz`; writes are framed, decoded and
//! applied to a [`SimUnit`] motor model, so commands sent by the dispatcher
//! show up in the telemetry read by ingest.
//!
//! ```toml
//! [serial]
//! port = "sim"
//!
//! [simulation]
//! rate_hz = 20.0
//! seed = 42      # 0 = random each run
//! ```
//!
//! Clones share one unit, so the ingest and dispatcher handles see the same
//! drill.

mod noise;
mod unit;

pub use noise::NoiseGenerator;
pub use unit::SimUnit;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::protocol::{FrameEvent, Packet, StreamFramer, frame};
use crate::transport::{Connector, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Floor for the frame rate so the period stays finite
const MIN_RATE_HZ: f64 = 0.1;

#[derive(Clone)]
pub struct SimTransport {
    inner: Arc<Mutex<SimInner>>,
    period: Duration,
    read_timeout: Duration,
}

struct SimInner {
    unit: SimUnit,
    framer: StreamFramer,
    outgoing: VecDeque<u8>,
    last_step: Instant,
    next_frame: Instant,
    frames_sent: u64,
    commands_applied: u64,
}

impl SimTransport {
    pub fn new(config: &SimulationConfig, read_timeout: Duration) -> Self {
        let period = Duration::from_secs_f64(1.0 / config.rate_hz.max(MIN_RATE_HZ));
        let now = Instant::now();
        log::info!(
            "Simulated downhole unit at {:.1} Hz (seed {})",
            config.rate_hz,
            config.seed
        );
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                unit: SimUnit::new(config.seed),
                framer: StreamFramer::new(),
                outgoing: VecDeque::new(),
                last_step: now,
                next_frame: now,
                frames_sent: 0,
                commands_applied: 0,
            })),
            period,
            read_timeout,
        }
    }

    /// Telemetry frames emitted so far
    pub fn frames_sent(&self) -> u64 {
        self.inner.lock().frames_sent
    }

    /// Commands decoded from writes and applied to the unit
    pub fn commands_applied(&self) -> u64 {
        self.inner.lock().commands_applied
    }

    /// Run `f` against the motor model
    pub fn with_unit<R>(&self, f: impl FnOnce(&mut SimUnit) -> R) -> R {
        f(&mut self.inner.lock().unit)
    }
}

impl SimInner {
    /// Advance the model and queue any telemetry frames that are due
    fn advance(&mut self, now: Instant, period: Duration) {
        let dt = now.saturating_duration_since(self.last_step).as_secs_f64();
        self.last_step = now;
        self.unit.step(dt);

        if now >= self.next_frame {
            let report = self.unit.telemetry();
            self.outgoing
                .extend(frame(&Packet::Telemetry(report).encode()));
            self.frames_sent += 1;
            self.next_frame += period;
            // Skip missed frames rather than bursting
            if self.next_frame <= now {
                self.next_frame = now + period;
            }
        }
    }
}

impl Transport for SimTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let wait = {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            inner.advance(now, self.period);

            if !inner.outgoing.is_empty() {
                let n = inner.outgoing.len().min(buffer.len());
                for (slot, b) in buffer.iter_mut().zip(inner.outgoing.drain(..n)) {
                    *slot = b;
                }
                return Ok(n);
            }
            inner.next_frame.saturating_duration_since(now)
        };
        std::thread::sleep(wait.min(self.read_timeout));
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.advance(now, self.period);
        inner.framer.push(data);
        while let Some(event) = inner.framer.next_event() {
            match event {
                FrameEvent::Frame(Packet::Command(command)) => {
                    inner.unit.apply(&command);
                    inner.commands_applied += 1;
                }
                FrameEvent::Frame(other) => {
                    log::warn!("Sim unit ignoring uplink {}", other.packet_type());
                }
                FrameEvent::Stray(n) => log::debug!("Sim unit skipped {} stray bytes", n),
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().outgoing.len())
    }
}

impl Connector for SimTransport {
    fn describe(&self) -> String {
        "sim".to_string()
    }

    fn connect(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, encode_frame};

    fn sim(rate_hz: f64) -> SimTransport {
        SimTransport::new(
            &SimulationConfig { rate_hz, seed: 7 },
            Duration::from_millis(20),
        )
    }

    fn read_frames(transport: &mut SimTransport, wanted: usize) -> Vec<Packet> {
        let mut framer = StreamFramer::new();
        let mut packets = Vec::new();
        let mut buf = [0u8; 64];
        let deadline = Instant::now() + Duration::from_secs(5);
        while packets.len() < wanted && Instant::now() < deadline {
            let n = transport.read(&mut buf).unwrap();
            framer.push(&buf[..n]);
            packets.extend(framer.events().filter_map(|e| match e {
                FrameEvent::Frame(p) => Some(p),
                FrameEvent::Stray(_) => None,
            }));
        }
        packets
    }

    #[test]
    fn test_emits_telemetry_frames() {
        let mut transport = sim(200.0);
        let packets = read_frames(&mut transport, 3);
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| matches!(p, Packet::Telemetry(_))));
        assert!(transport.frames_sent() >= 3);
    }

    #[test]
    fn test_commands_reach_unit() {
        let sim = sim(50.0);
        let mut writer = sim.connect().unwrap();

        let mut bytes = vec![0x00, 0x13];
        bytes.extend(encode_frame(&Command::motor_rpm(60).0));
        bytes.extend(encode_frame(&Command::MotorSetTachometer(5)));
        writer.send(&bytes).unwrap();

        assert_eq!(sim.commands_applied(), 2);
        assert_eq!(sim.with_unit(|u| u.target_rpm()), 60.0);
        assert_eq!(sim.with_unit(|u| u.tachometer()), 5);
    }

    #[test]
    fn test_idle_read_waits() {
        let mut transport = sim(MIN_RATE_HZ);
        let mut buf = [0u8; 128];
        // First frame is due immediately
        assert!(transport.read(&mut buf).unwrap() > 0);
        while transport.available().unwrap() > 0 {
            transport.read(&mut buf).unwrap();
        }

        let start = Instant::now();
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
