//! Downhole link dumper
//!
//! Opens the serial port, runs the stream framer over everything received and
//! prints each decoded frame plus a hex dump of any stray bytes.
//!
//! ```bash
//! cargo run --example serial_dump -- /dev/ttyUSB0 115200 10
//! ```

use downhole_io::protocol::{FrameEvent, Packet, StreamFramer};
use downhole_io::transport::{SerialTransport, Transport};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud: u32 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(115200);
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(10);

    log::info!("Opening {} at {} baud...", port, baud);
    let mut transport = SerialTransport::open(&port, baud, Duration::from_millis(100))?;
    log::info!("Capturing for {} seconds", seconds);

    let start = Instant::now();
    let duration = Duration::from_secs(seconds);
    let mut buffer = [0u8; 256];
    let mut framer = StreamFramer::new();
    let mut raw: Vec<u8> = Vec::new();
    let mut total_bytes = 0;

    while start.elapsed() < duration {
        let n = transport.read(&mut buffer)?;
        if n == 0 {
            continue;
        }
        total_bytes += n;
        raw.extend_from_slice(&buffer[..n]);
        framer.push(&buffer[..n]);

        let mut consumed = 0;
        for event in framer.events() {
            let t = start.elapsed().as_secs_f64();
            if let FrameEvent::Frame(ref packet) = event {
                consumed += packet.packet_type().frame_size();
            }
            match event {
                FrameEvent::Frame(Packet::Telemetry(report)) => println!(
                    "[{:8.3}] Telemetry rpm={:.2} hammer={} tacho={} quat={:?}",
                    t,
                    report.motor_rpm,
                    report.hammer,
                    report.tachometer,
                    report.quaternion()
                ),
                FrameEvent::Frame(packet) => println!("[{:8.3}] {:?}", t, packet),
                FrameEvent::Stray(count) => {
                    let hex: Vec<String> = raw[consumed..(consumed + count).min(raw.len())]
                        .iter()
                        .take(32)
                        .map(|b| format!("{:02X}", b))
                        .collect();
                    println!("[{:8.3}] {} stray bytes: {}", t, count, hex.join(" "));
                    consumed += count;
                }
            }
        }
        raw.drain(..consumed.min(raw.len()));
    }

    log::info!("=== Capture Complete ===");
    log::info!("Total bytes received: {}", total_bytes);
    log::info!(
        "Frames: {}  Stray bytes: {}",
        framer.frame_count(),
        framer.stray_count()
    );
    Ok(())
}
