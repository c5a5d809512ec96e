//! downhole-io - Surface-side link to a downhole drilling tool
//!
//! Decodes the tool's framed serial telemetry into a shared key-value store,
//! turns textual operator intents into framed commands, and keeps calibrated
//! orientation estimates for the GUI and loggers.
//!
//! ## Features
//!
//! - `sim` (default): simulated downhole unit, selected with `serial.port = "sim"`

pub mod app;
pub mod config;
pub mod devices;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod orientation;
pub mod protocol;
pub mod state;
pub mod store;
pub mod streaming;
pub mod supervisor;
pub mod transport;

// Re-export commonly used types
pub use app::DownholeApp;
pub use config::AppConfig;
pub use error::{Error, Result};
