//! Drill state aggregator
//!
//! Read-side facade for UI and logging collaborators: one snapshot combining
//! the latest stored telemetry, both calibrated orientation estimates and link
//! liveness. Every call re-reads the store.

use crate::ingest::TelemetryRecord;
use crate::orientation::{
    Method, OrientationEstimate, OrientationOffset, Quaternion, calibration, estimate,
};
use crate::store::{KEY_DRILL_STATE, SharedStore, read_json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Telemetry older than this means the link is down
pub const LIVENESS_THRESHOLD_SECS: f64 = 15.0;

/// Seconds since the Unix epoch
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Whether telemetry received at `last` is still fresh at `now`
pub fn is_alive(last: f64, now: f64, threshold_secs: f64) -> bool {
    now - last < threshold_secs
}

/// Coherent view of the drill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrillState {
    /// Latest enriched telemetry, absent until the first packet
    pub telemetry: Option<TelemetryRecord>,
    /// Estimate from the on-board fusion quaternion
    pub sfus: Option<OrientationEstimate>,
    /// Estimate from the external AHRS filter
    pub ahrs: Option<OrientationEstimate>,
    pub alive: bool,
    /// Seconds since the latest telemetry arrived
    pub age_secs: Option<f64>,
}

pub struct DrillStateAggregator {
    store: Arc<dyn SharedStore>,
    liveness_threshold_secs: f64,
}

impl DrillStateAggregator {
    pub fn new(store: Arc<dyn SharedStore>, liveness_threshold_secs: f64) -> Self {
        Self {
            store,
            liveness_threshold_secs,
        }
    }

    pub fn snapshot(&self) -> DrillState {
        self.snapshot_at(unix_time())
    }

    /// Snapshot as seen at `now` (seconds since the epoch)
    pub fn snapshot_at(&self, now: f64) -> DrillState {
        let store = self.store.as_ref();
        let telemetry: Option<TelemetryRecord> = read_json(store, KEY_DRILL_STATE);

        let age_secs = telemetry.as_ref().map(|t| now - t.timestamp);
        let alive = telemetry
            .as_ref()
            .is_some_and(|t| is_alive(t.timestamp, now, self.liveness_threshold_secs));

        let sfus = telemetry.as_ref().and_then(|t| {
            let raw = Quaternion::from_array(t.telemetry.quaternion());
            estimate(raw, &OrientationOffset::load(store, Method::Sfus))
        });
        let ahrs = calibration::raw_quaternion(store, Method::Ahrs)
            .and_then(|raw| estimate(raw, &OrientationOffset::load(store, Method::Ahrs)));

        DrillState {
            telemetry,
            sfus,
            ahrs,
            alive,
            age_secs,
        }
    }
}
