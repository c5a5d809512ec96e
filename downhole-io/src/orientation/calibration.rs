//! Orientation calibration and angle extraction
//!
//! Each estimation method keeps its own offset in the store under
//! `oricalib-<method>-<incl|azim|roll>`. Zeroing records the negated roll of
//! the current raw attitude; calibration rotates about world z by that amount
//! so the zeroed attitude reads roll 0.

use super::quaternion::Quaternion;
use crate::error::Result;
use crate::ingest::TelemetryRecord;
use crate::store::{KEY_DRILL_STATE, KEY_ORIENTATION_AHRS, SharedStore, read_f64, read_json};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attitude source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// On-board sensor fusion quaternion from telemetry
    Sfus,
    /// External AHRS filter output
    Ahrs,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Sfus, Method::Ahrs];

    pub fn name(self) -> &'static str {
        match self {
            Method::Sfus => "sfus",
            Method::Ahrs => "ahrs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Store key of one offset angle (`incl`, `azim` or `roll`)
pub fn offset_key(method: Method, angle: &str) -> String {
    format!("oricalib-{}-{}", method.name(), angle)
}

/// Angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    pub inclination: f64,
    pub azimuth: f64,
    pub roll: f64,
}

/// Persisted per-method offset
pub type OrientationOffset = Angles;

impl OrientationOffset {
    /// Read a method's offset; absent or non-numeric angles are 0
    pub fn load(store: &dyn SharedStore, method: Method) -> Self {
        Self {
            inclination: read_f64(store, &offset_key(method, "incl")),
            azimuth: read_f64(store, &offset_key(method, "azim")),
            roll: read_f64(store, &offset_key(method, "roll")),
        }
    }
}

/// Calibrated attitude and its angles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationEstimate {
    pub quaternion: Quaternion,
    #[serde(flatten)]
    pub angles: Angles,
}

/// Apply a stored offset: rotate about world z by `offset.roll`
///
/// A zero roll offset returns `q` unchanged.
pub fn calibrate(q: Quaternion, offset: &OrientationOffset) -> Quaternion {
    if offset.roll == 0.0 {
        return q;
    }
    Quaternion::about_z(offset.roll.to_radians()) * q
}

/// Inclination, azimuth and roll of the tool axes rotated by `q`
///
/// Inclination is 0 with the tool z axis pointing straight down.
pub fn extract_angles(q: Quaternion) -> Angles {
    let q = q.normalized().unwrap_or_default();
    let x = q.rotate([1.0, 0.0, 0.0]);
    let z = q.rotate([0.0, 0.0, 1.0]);
    Angles {
        inclination: 180.0 - z[2].clamp(-1.0, 1.0).acos().to_degrees(),
        azimuth: z[1].atan2(z[0]).to_degrees(),
        roll: x[1].atan2(x[0]).to_degrees(),
    }
}

/// Calibrated estimate for a raw sample; invalid samples give `None`
pub fn estimate(raw: Quaternion, offset: &OrientationOffset) -> Option<OrientationEstimate> {
    if !raw.is_valid_sample() {
        log::trace!("Skipping invalid quaternion {:?}", raw.to_array());
        return None;
    }
    let quaternion = calibrate(raw.normalized()?, offset);
    Some(OrientationEstimate {
        quaternion,
        angles: extract_angles(quaternion),
    })
}

fn format_angle(value: f64) -> String {
    // -0.0 would print as "-0"
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Persist a new offset for `method`
///
/// With the tool's current x axis (world frame), the stored roll cancels the
/// measured roll and inclination/azimuth are zeroed. Without an axis every
/// angle is reset to 0.
pub fn set_offset(
    store: &dyn SharedStore,
    method: Method,
    x_axis: Option<[f64; 3]>,
) -> Result<OrientationOffset> {
    let roll = x_axis.map_or(0.0, |x| -x[1].atan2(x[0]).to_degrees());
    let offset = OrientationOffset {
        inclination: 0.0,
        azimuth: 0.0,
        roll,
    };
    store.set(&offset_key(method, "incl"), &format_angle(offset.inclination))?;
    store.set(&offset_key(method, "azim"), &format_angle(offset.azimuth))?;
    store.set(&offset_key(method, "roll"), &format_angle(offset.roll))?;
    log::info!("Orientation offset for {}: roll={:.2}°", method, offset.roll);
    Ok(offset)
}

/// Latest valid raw quaternion for `method`
pub fn raw_quaternion(store: &dyn SharedStore, method: Method) -> Option<Quaternion> {
    let q = match method {
        Method::Sfus => {
            let record: TelemetryRecord = read_json(store, KEY_DRILL_STATE)?;
            Quaternion::from_array(record.telemetry.quaternion())
        }
        Method::Ahrs => Quaternion::from_array(read_json::<[f64; 4]>(store, KEY_ORIENTATION_AHRS)?),
    };
    q.is_valid_sample().then_some(q)
}

/// Zero `method` against its current raw attitude
///
/// Returns `Ok(None)` when no valid sample is available.
pub fn zero(store: &dyn SharedStore, method: Method) -> Result<Option<OrientationOffset>> {
    let Some(q) = raw_quaternion(store, method).and_then(|q| q.normalized()) else {
        log::warn!("Cannot zero {}: no valid orientation sample", method);
        return Ok(None);
    };
    set_offset(store, method, Some(q.rotate([1.0, 0.0, 0.0]))).map(Some)
}
