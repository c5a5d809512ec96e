//! downhole-io daemon
//!
//! Bridges the downhole tool's serial link and the shared store:
//!
//! - **Uplink**: framed telemetry → `drill-state` key + `uphole` topic
//! - **Downlink**: `downhole` topic intents → framed commands
//! - **Store server (TCP)**: get/set/publish/subscribe for GUI and loggers

use downhole_io::{AppConfig, DownholeApp, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "/etc/downhole-io.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `downhole-io <path>` (positional)
/// - `downhole-io --config <path>` (flag-based)
/// - `downhole-io -c <path>` (short flag)
///
/// Returns `None` when no path is given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }
    None
}

/// An explicit path must exist; a missing default falls back to built-in defaults
fn load_config(explicit: Option<String>) -> Result<(AppConfig, String)> {
    match explicit {
        Some(path) => Ok((AppConfig::from_file(&path)?, path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
            AppConfig::from_file(DEFAULT_CONFIG_PATH)?,
            DEFAULT_CONFIG_PATH.to_string(),
        )),
        None => Ok((AppConfig::default(), "built-in defaults".to_string())),
    }
}

fn main() -> Result<()> {
    let (config, source) = load_config(parse_config_path())?;

    // RUST_LOG overrides the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("downhole-io v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", source);
    log::info!(
        "Link: {} @ {} baud, store server {}",
        config.serial.port,
        config.serial.baud_rate,
        if config.store.enabled {
            config.store.bind_address.as_str()
        } else {
            "disabled"
        }
    );

    let mut app = DownholeApp::new(config)?;
    app.run()?;

    log::info!("downhole-io stopped");
    Ok(())
}
