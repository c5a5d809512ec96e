//! Telemetry packet (type 0x10)
//!
//! The layout table, the raw wire struct and the scaled report are generated
//! from a single field list, so adding a field without a transfer function does
//! not compile.
//!
//! # Layout (82 bytes, little-endian)
//!
//! | Group | Fields | Wire | Scale |
//! |-------|--------|------|-------|
//! | Motor | voltage, current, rpm | i16 | ÷100 |
//! | Motor | duty cycle | i16 | ÷1000 |
//! | Motor | controller temperature | i16 | ÷10 |
//! | Hammer | position | u8 | raw (percent computed on ingest) |
//! | Pressure | 4 sensors | u16 | raw |
//! | Temperature | motor, mosfet, pcb, imu | i16 | ÷10 |
//! | Temperature | gear 0/1, top plug | i16 | raw |
//! | Inclinometer | x, y | i16 | ÷100 |
//! | IMU | accel, gyro, mag, linear accel, gravity (xyz) | i16 | ÷100 |
//! | IMU | quaternion x, y, z, w | i16 | ÷100 |
//! | Tachometer | revolutions | i32 | raw |
//! | Gyro alarm | flags | u8 | raw |
//! | Supply | downhole voltage | u16 | ÷100 |

use super::fields::{FieldReader, FieldSpec, Transfer, WireType, payload_size};
use crate::error::Result;
use serde::{Deserialize, Serialize};

macro_rules! telemetry_layout {
    ($( $(#[$doc:meta])* $field:ident : $wire:ident => $transfer:ident ),+ $(,)?) => {
        /// Telemetry layout table in wire order
        pub const TELEMETRY_FIELDS: &[FieldSpec] = &[
            $( FieldSpec::new(stringify!($field), WireType::$wire, Transfer::$transfer), )+
        ];

        /// Wire integers of one telemetry packet, before scaling
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct RawTelemetry {
            $( pub $field: i64, )+
        }

        /// Unit-scaled snapshot of the downhole unit
        ///
        /// Missing keys deserialize to 0 so older `drill-state` records stay
        /// readable.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct TelemetryReport {
            $( $(#[$doc])* pub $field: f64, )+
        }

        impl RawTelemetry {
            /// Read every field in wire order
            pub fn read(reader: &mut FieldReader<'_>) -> Result<Self> {
                Ok(Self {
                    $( $field: reader.read(WireType::$wire)?, )+
                })
            }

            /// Append every field in wire order (values saturate to their width)
            pub fn write(&self, out: &mut Vec<u8>) {
                $( WireType::$wire.write(self.$field, out); )+
            }

            /// Apply each field's transfer function
            pub fn scale(&self) -> TelemetryReport {
                TelemetryReport {
                    $( $field: Transfer::$transfer.apply(self.$field), )+
                }
            }
        }

        impl TelemetryReport {
            /// Inverse of [`RawTelemetry::scale`], rounding to the nearest wire integer
            pub fn to_raw(&self) -> RawTelemetry {
                RawTelemetry {
                    $( $field: Transfer::$transfer.invert(self.$field), )+
                }
            }
        }
    };
}

telemetry_layout! {
    /// Motor supply voltage (V)
    motor_voltage: I16 => CENTI,
    /// Motor current (A)
    motor_current: I16 => CENTI,
    /// Motor speed (rev/min)
    motor_rpm: I16 => CENTI,
    /// PWM duty cycle (fraction, signed)
    motor_duty_cycle: I16 => MILLI,
    /// Motor controller temperature (°C)
    motor_controller_temp: I16 => DECI,
    /// Raw hammer position (0..HAMMER_MAX)
    hammer: U8 => IDENTITY,
    pressure_0: U16 => IDENTITY,
    pressure_1: U16 => IDENTITY,
    pressure_2: U16 => IDENTITY,
    pressure_3: U16 => IDENTITY,
    temp_motor: I16 => DECI,
    temp_mosfet: I16 => DECI,
    temp_pcb: I16 => DECI,
    temp_imu: I16 => DECI,
    temp_gear_0: I16 => IDENTITY,
    temp_gear_1: I16 => IDENTITY,
    temp_top_plug: I16 => IDENTITY,
    /// Inclinometer x (°)
    inclinometer_x: I16 => CENTI,
    /// Inclinometer y (°)
    inclinometer_y: I16 => CENTI,
    accel_x: I16 => CENTI,
    accel_y: I16 => CENTI,
    accel_z: I16 => CENTI,
    gyro_x: I16 => CENTI,
    gyro_y: I16 => CENTI,
    gyro_z: I16 => CENTI,
    mag_x: I16 => CENTI,
    mag_y: I16 => CENTI,
    mag_z: I16 => CENTI,
    linear_accel_x: I16 => CENTI,
    linear_accel_y: I16 => CENTI,
    linear_accel_z: I16 => CENTI,
    gravity_x: I16 => CENTI,
    gravity_y: I16 => CENTI,
    gravity_z: I16 => CENTI,
    /// Sensor-fusion quaternion, scalar last
    quat_x: I16 => CENTI,
    quat_y: I16 => CENTI,
    quat_z: I16 => CENTI,
    quat_w: I16 => CENTI,
    /// Signed revolution count
    tachometer: I32 => IDENTITY,
    /// Gyro slip alarm flags
    gyro_alarm: U8 => IDENTITY,
    /// Downhole supply voltage (V)
    downhole_voltage: U16 => CENTI,
}

/// Telemetry payload size in bytes
pub const TELEMETRY_PAYLOAD_SIZE: usize = payload_size(TELEMETRY_FIELDS);

impl TelemetryReport {
    /// On-board fusion quaternion as `[x, y, z, w]`
    pub fn quaternion(&self) -> [f64; 4] {
        [self.quat_x, self.quat_y, self.quat_z, self.quat_w]
    }
}
