//! Shared key/value store and pub/sub topics
//!
//! The store is the only state shared between the loops and with the
//! external collaborators. Values are strings, mostly JSON documents.
//!
//! # Keys
//!
//! | Key | Direction | Contents |
//! |-----|-----------|----------|
//! | `drill-state` | write | enriched telemetry (JSON) |
//! | `depth-encoder` | read | `{"depth": f64, "velocity": f64}` |
//! | `load-cell` | read | `{"load": f64}` |
//! | `orientation-ahrs` | read | `[x, y, z, w]` from the AHRS filter |
//! | `oricalib-<method>-<incl\|azim\|roll>` | read/write | offset in degrees |
//!
//! # Topics
//!
//! | Topic | Direction | Payload |
//! |-------|-----------|---------|
//! | `uphole` | publish | packet type name |
//! | `downhole` | subscribe | operator intent |
//! | `oricalib` | subscribe | `zero:<method>` / `clear:<method>` |

mod memory;

pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const KEY_DRILL_STATE: &str = "drill-state";
pub const KEY_DEPTH_ENCODER: &str = "depth-encoder";
pub const KEY_LOAD_CELL: &str = "load-cell";
pub const KEY_ORIENTATION_AHRS: &str = "orientation-ahrs";

pub const TOPIC_UPHOLE: &str = "uphole";
pub const TOPIC_DOWNHOLE: &str = "downhole";
pub const TOPIC_ORICALIB: &str = "oricalib";

/// One message delivered on a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

/// Atomic single-key store with topic fan-out
pub trait SharedStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deliver `payload` to every current subscriber of `topic`
    ///
    /// Returns the number of subscribers reached.
    fn publish(&self, topic: &str, payload: &str) -> Result<usize>;

    /// Messages published after this call, in publish order
    fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

/// Receiving end of a topic subscription
pub struct Subscription {
    topic: String,
    rx: Receiver<Message>,
    _alive: Arc<()>,
}

impl Subscription {
    pub(crate) fn new(topic: &str, rx: Receiver<Message>, alive: Arc<()>) -> Self {
        Self {
            topic: topic.to_string(),
            rx,
            _alive: alive,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait up to `timeout` for the next message; `Ok(None)` on timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Message>> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(self.closed()),
        }
    }

    /// Next message if one is already queued
    pub fn try_recv(&self) -> Result<Option<Message>> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.closed()),
        }
    }

    fn closed(&self) -> Error {
        Error::Store(format!("subscription to '{}' closed", self.topic))
    }
}

/// Read and parse a JSON value, treating every failure as absent
pub fn read_json<T: DeserializeOwned>(store: &dyn SharedStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            log::debug!("Store read of '{}' failed: {}", key, e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Ignoring malformed '{}': {}", key, e);
            None
        }
    }
}

/// Read a numeric value, 0.0 when absent or not a number
pub fn read_f64(store: &dyn SharedStore, key: &str) -> f64 {
    store
        .get(key)
        .ok()
        .flatten()
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}
