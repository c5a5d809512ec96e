//! End-to-end runs against the simulated downhole unit

use crate::harness::{drill_state, fast_config, wait_until};
use downhole_io::DownholeApp;
use downhole_io::config::SimulationConfig;
use downhole_io::devices::sim::SimTransport;
use downhole_io::state::DrillStateAggregator;
use downhole_io::store::TOPIC_DOWNHOLE;
use std::sync::Arc;
use std::time::Duration;

fn start_sim() -> (SimTransport, DownholeApp) {
    let config = fast_config();
    let sim = SimTransport::new(
        &SimulationConfig {
            rate_hz: 100.0,
            seed: 11,
        },
        config.serial.read_timeout(),
    );
    let mut app = DownholeApp::with_connector(config, Arc::new(sim.clone()));
    app.start().unwrap();
    (sim, app)
}

#[test]
fn test_rpm_command_spins_simulated_motor() {
    let (sim, mut app) = start_sim();
    let store = app.store();

    assert!(wait_until(Duration::from_secs(2), || {
        drill_state(store.as_ref()).is_some()
    }));
    store.publish(TOPIC_DOWNHOLE, "motor-rpm:60").unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        drill_state(store.as_ref()).is_some_and(|r| r.telemetry.motor_rpm > 50.0)
    }));
    assert_eq!(sim.commands_applied(), 1);

    let state = DrillStateAggregator::new(Arc::clone(&store), 15.0).snapshot();
    assert!(state.alive);
    let sfus = state.sfus.unwrap();
    // Simulated tool sits a few degrees off its upright reference
    assert!(sfus.angles.inclination > 170.0);

    app.stop();
    assert_eq!(sim.with_unit(|u| u.target_rpm()), 0.0);
}

#[test]
fn test_tachometer_reset_reaches_telemetry() {
    let (_sim, mut app) = start_sim();
    let store = app.store();

    store.publish(TOPIC_DOWNHOLE, "motor-set-tachometer:500").unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        drill_state(store.as_ref()).is_some_and(|r| r.telemetry.tachometer == 500.0)
    }));
    app.stop();
}
