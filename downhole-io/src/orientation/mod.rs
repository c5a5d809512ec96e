//! Orientation calibration
//!
//! - `quaternion`: scalar-last quaternion math
//! - `calibration`: offsets, angle extraction, zeroing
//! - `listener`: `oricalib` topic handler

pub mod calibration;
pub mod listener;
pub mod quaternion;

pub use calibration::{
    Angles, Method, OrientationEstimate, OrientationOffset, calibrate, estimate, extract_angles,
    set_offset, zero,
};
pub use listener::{CalibrationListener, CalibrationRequest};
pub use quaternion::Quaternion;
