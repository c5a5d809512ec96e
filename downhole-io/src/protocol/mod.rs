//! Downhole link protocol
//!
//! Packet format: [0xAA] [TYPE] [PAYLOAD] [CSUM_H] [CSUM_L]
//!
//! - `fields`: wire types and transfer functions
//! - `telemetry`: the telemetry layout table and report
//! - `command`: validated downhole commands
//! - `packet`: packet table, checksum, encode/decode
//! - `framer`: stream resynchronization

pub mod command;
pub mod constants;
pub mod fields;
pub mod framer;
pub mod packet;
mod ring_buffer;
pub mod telemetry;

pub use command::{Alarm, CalibrationDirection, ClampNote, Command, MotorConfig, Pwm, Rpm};
pub use fields::{FieldSpec, Transfer, WireType};
pub use framer::{FrameEvent, StreamFramer};
pub use packet::{GyroSlipAlarm, Packet, PacketType, checksum, decode, encode, encode_frame, frame};
pub use telemetry::{RawTelemetry, TELEMETRY_FIELDS, TelemetryReport};
