//! Application orchestration for the downhole-io daemon
//!
//! Wires the shared store, the downhole link and the long-running loops:
//!
//! | Thread | Loop | Link |
//! |--------|------|------|
//! | `ingest` | [`TelemetryIngest`] | supervised reader handle |
//! | `dispatcher` | [`CommandDispatcher`] on the `downhole` topic | supervised writer handle |
//! | `oricalib` | [`CalibrationListener`] on the `oricalib` topic | none |
//! | `store-server` | [`StoreServer`] (when `store.enabled`) | none |
//!
//! SIGINT/SIGTERM set the shared shutdown flag; every loop notices it within
//! one read timeout and the dispatcher sends a final motor stop.

use crate::config::AppConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::Result;
use crate::ingest::TelemetryIngest;
use crate::orientation::CalibrationListener;
use crate::state::DrillStateAggregator;
use crate::store::{MemoryStore, SharedStore, TOPIC_DOWNHOLE, TOPIC_ORICALIB};
use crate::streaming::StoreServer;
use crate::supervisor::{Backoff, spawn_supervised};
use crate::transport::{Connector, SerialConnector};
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const STATUS_INTERVAL: Duration = Duration::from_secs(10);

pub struct DownholeApp {
    config: AppConfig,
    store: Arc<dyn SharedStore>,
    connector: Arc<dyn Connector>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
}

impl DownholeApp {
    /// Build the store and the link selected by `serial.port`
    pub fn new(config: AppConfig) -> Result<Self> {
        let connector = build_connector(&config)?;
        Ok(Self::with_connector(config, connector))
    }

    /// Use an explicit link instead of the configured one
    pub fn with_connector(config: AppConfig, connector: Arc<dyn Connector>) -> Self {
        info!("Downhole link: {}", connector.describe());
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
            connector,
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn SharedStore> {
        Arc::clone(&self.store)
    }

    /// Flag observed by every loop; setting it stops the app
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn every loop; returns once they are running
    pub fn start(&mut self) -> Result<()> {
        self.start_ingest()?;
        self.start_dispatcher()?;
        self.start_calibration_listener()?;
        if self.config.store.enabled {
            self.start_store_server()?;
        } else {
            info!("Store server disabled, store is in-process only");
        }
        info!("✓ {} threads started", self.threads.len());
        Ok(())
    }

    /// Run until SIGINT/SIGTERM or until the shutdown flag is set
    pub fn run(&mut self) -> Result<()> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let signal_handle = signals.handle();
        let shutdown = Arc::clone(&self.shutdown);
        std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    info!("Received signal {}, initiating shutdown...", sig);
                    shutdown.store(true, Ordering::Relaxed);
                }
            })?;

        self.start()?;
        info!("Press Ctrl+C to stop");

        let aggregator = DrillStateAggregator::new(
            Arc::clone(&self.store),
            self.config.telemetry.liveness_threshold_secs,
        );
        let mut last_status = Instant::now();
        while !self.shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
            if last_status.elapsed() >= STATUS_INTERVAL {
                log_status(&aggregator);
                last_status = Instant::now();
            }
        }

        info!("Shutdown signal received, stopping threads...");
        signal_handle.close();
        self.stop();
        Ok(())
    }

    /// Set the shutdown flag and join every thread
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for (name, handle) in self.threads.drain(..) {
            debug!("Joining {}", name);
            if handle.join().is_err() {
                error!("Thread {} panicked", name);
            }
        }
        info!("✓ All threads stopped");
    }

    fn backoff(&self) -> Backoff {
        Backoff::from_config(&self.config.serial)
    }

    fn start_ingest(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let hammer_max = self.config.telemetry.hammer_max;

        let handle = spawn_supervised(
            "ingest",
            Arc::clone(&self.connector),
            self.backoff(),
            Arc::clone(&self.shutdown),
            move |transport| {
                TelemetryIngest::new(transport, Arc::clone(&store), hammer_max).run(&shutdown)
            },
        )?;
        self.threads.push(("ingest", handle));
        Ok(())
    }

    fn start_dispatcher(&mut self) -> Result<()> {
        // One subscription across reconnects, so intents queue while the link is down
        let intents = self.store.subscribe(TOPIC_DOWNHOLE)?;
        let shutdown = Arc::clone(&self.shutdown);
        let poll = self.config.serial.read_timeout();

        let handle = spawn_supervised(
            "dispatcher",
            Arc::clone(&self.connector),
            self.backoff(),
            Arc::clone(&self.shutdown),
            move |transport| CommandDispatcher::new(transport).run(&intents, &shutdown, poll),
        )?;
        self.threads.push(("dispatcher", handle));
        Ok(())
    }

    fn start_calibration_listener(&mut self) -> Result<()> {
        let requests = self.store.subscribe(TOPIC_ORICALIB)?;
        let listener = CalibrationListener::new(Arc::clone(&self.store));
        let shutdown = Arc::clone(&self.shutdown);
        let poll = self.config.serial.read_timeout();

        let handle = std::thread::Builder::new()
            .name("oricalib".to_string())
            .spawn(move || {
                if let Err(e) = listener.run(&requests, &shutdown, poll) {
                    error!("Calibration listener error: {}", e);
                }
            })?;
        self.threads.push(("oricalib", handle));
        Ok(())
    }

    fn start_store_server(&mut self) -> Result<()> {
        let server = StoreServer::bind(
            &self.config.store.bind_address,
            Arc::clone(&self.store),
            self.config.telemetry.liveness_threshold_secs,
            Arc::clone(&self.shutdown),
        )?;
        self.threads.push(("store-server", server.spawn()?));
        Ok(())
    }
}

impl Drop for DownholeApp {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            debug!("DownholeApp cleaning up...");
            self.stop();
        }
    }
}

fn log_status(aggregator: &DrillStateAggregator) {
    let state = aggregator.snapshot();
    match (&state.telemetry, state.age_secs) {
        (Some(record), Some(age)) if state.alive => info!(
            "Link up: rpm={:.1} hammer={:.1}% tacho={} ({:.1}s ago)",
            record.telemetry.motor_rpm, record.hammer_percent, record.telemetry.tachometer, age
        ),
        (Some(_), Some(age)) => warn!("Link down: last telemetry {:.0}s ago", age),
        _ => warn!("Link down: no telemetry received yet"),
    }
}

fn build_connector(config: &AppConfig) -> Result<Arc<dyn Connector>> {
    if config.serial.is_simulated() {
        return simulated_connector(config);
    }
    Ok(Arc::new(SerialConnector::new(config.serial.clone())))
}

#[cfg(feature = "sim")]
fn simulated_connector(config: &AppConfig) -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(crate::devices::sim::SimTransport::new(
        &config.simulation,
        config.serial.read_timeout(),
    )))
}

#[cfg(not(feature = "sim"))]
fn simulated_connector(_config: &AppConfig) -> Result<Arc<dyn Connector>> {
    Err(crate::error::Error::Config(
        "serial.port = \"sim\" requires the `sim` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, FrameEvent, Packet, StreamFramer};
    use crate::transport::MockTransport;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.serial.read_timeout_ms = 10;
        config.serial.reconnect_backoff_ms = 5;
        config.store.enabled = false;
        config
    }

    #[test]
    fn test_intent_reaches_link_and_stop_on_shutdown() {
        let mock = MockTransport::new();
        let mut app = DownholeApp::with_connector(config(), Arc::new(mock.clone()));
        app.start().unwrap();

        // Wait for the dispatcher to be running before publishing
        std::thread::sleep(Duration::from_millis(50));
        app.store().publish(TOPIC_DOWNHOLE, "motor-rpm:50").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        app.stop();

        let mut framer = StreamFramer::new();
        framer.push(&mock.get_written());
        let commands: Vec<_> = framer
            .events()
            .filter_map(|e| match e {
                FrameEvent::Frame(Packet::Command(c)) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0], Command::motor_rpm(50).0);
        assert_eq!(commands[1], Command::MotorStop);
    }
}
