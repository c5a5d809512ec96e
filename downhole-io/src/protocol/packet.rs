//! Packet table and frame codec
//!
//! Frame format: `[0xAA] [TYPE] [PAYLOAD ...] [CSUM_H] [CSUM_L]`
//!
//! There is no length byte. The type id selects a fixed layout, so the frame
//! size is known as soon as the type byte has arrived.

use super::command::{
    CALIBRATION_FIELDS, Command, FLASH_CONFIG_FIELDS, PWM_FIELDS, ROTATE_BY_FIELDS, RPM_FIELDS,
    SET_ALARM_FIELDS, TACHOMETER_FIELDS,
};
use super::constants::*;
use super::fields::{FieldReader, FieldSpec, Transfer, WireType, payload_size};
use super::telemetry::{RawTelemetry, TELEMETRY_FIELDS, TelemetryReport};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const GYRO_SLIP_ALARM_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("gyro_z", WireType::I16, Transfer::CENTI),
    FieldSpec::new("motor_rpm", WireType::I16, Transfer::CENTI),
];

/// Every packet type known to both ends of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Telemetry,
    GyroSlipAlarm,
    Ping,
    MotorStop,
    MotorStartPwm,
    MotorStartRpm,
    MotorRotateBy,
    MotorFlashConfig,
    SetAlarm,
    Bno055SaveLoadCalibration,
    MotorSetTachometer,
}

impl PacketType {
    pub const ALL: [PacketType; 11] = [
        PacketType::Telemetry,
        PacketType::GyroSlipAlarm,
        PacketType::Ping,
        PacketType::MotorStop,
        PacketType::MotorStartPwm,
        PacketType::MotorStartRpm,
        PacketType::MotorRotateBy,
        PacketType::MotorFlashConfig,
        PacketType::SetAlarm,
        PacketType::Bno055SaveLoadCalibration,
        PacketType::MotorSetTachometer,
    ];

    pub const fn id(self) -> u8 {
        match self {
            PacketType::Telemetry => TYPE_TELEMETRY,
            PacketType::GyroSlipAlarm => TYPE_GYRO_SLIP_ALARM,
            PacketType::Ping => TYPE_PING,
            PacketType::MotorStop => TYPE_MOTOR_STOP,
            PacketType::MotorStartPwm => TYPE_MOTOR_START_PWM,
            PacketType::MotorStartRpm => TYPE_MOTOR_START_RPM,
            PacketType::MotorRotateBy => TYPE_MOTOR_ROTATE_BY,
            PacketType::MotorFlashConfig => TYPE_MOTOR_FLASH_CONFIG,
            PacketType::SetAlarm => TYPE_SET_ALARM,
            PacketType::Bno055SaveLoadCalibration => TYPE_BNO055_SAVE_LOAD_CALIBRATION,
            PacketType::MotorSetTachometer => TYPE_MOTOR_SET_TACHOMETER,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Name announced on the `uphole` topic
    pub const fn name(self) -> &'static str {
        match self {
            PacketType::Telemetry => "Telemetry",
            PacketType::GyroSlipAlarm => "GyroSlipAlarm",
            PacketType::Ping => "Ping",
            PacketType::MotorStop => "MotorStop",
            PacketType::MotorStartPwm => "MotorStartPWM",
            PacketType::MotorStartRpm => "MotorStartRPM",
            PacketType::MotorRotateBy => "MotorRotateBy",
            PacketType::MotorFlashConfig => "MotorFlashConfig",
            PacketType::SetAlarm => "SetAlarm",
            PacketType::Bno055SaveLoadCalibration => "Bno055SaveLoadCalibration",
            PacketType::MotorSetTachometer => "MotorSetTachometer",
        }
    }

    pub const fn layout(self) -> &'static [FieldSpec] {
        match self {
            PacketType::Telemetry => TELEMETRY_FIELDS,
            PacketType::GyroSlipAlarm => GYRO_SLIP_ALARM_FIELDS,
            PacketType::Ping | PacketType::MotorStop => &[],
            PacketType::MotorStartPwm => PWM_FIELDS,
            PacketType::MotorStartRpm => RPM_FIELDS,
            PacketType::MotorRotateBy => ROTATE_BY_FIELDS,
            PacketType::MotorFlashConfig => FLASH_CONFIG_FIELDS,
            PacketType::SetAlarm => SET_ALARM_FIELDS,
            PacketType::Bno055SaveLoadCalibration => CALIBRATION_FIELDS,
            PacketType::MotorSetTachometer => TACHOMETER_FIELDS,
        }
    }

    pub const fn payload_size(self) -> usize {
        payload_size(self.layout())
    }

    /// Full frame size including marker, type id and checksum
    pub const fn frame_size(self) -> usize {
        HEADER_SIZE + self.payload_size() + CHECKSUM_SIZE
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Gyro slip alarm raised by the downhole unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroSlipAlarm {
    /// Body rotation rate at the time of the alarm
    pub gyro_z: f64,
    /// Motor speed at the time of the alarm
    pub motor_rpm: f64,
}

/// A decoded packet
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Telemetry(TelemetryReport),
    GyroSlipAlarm(GyroSlipAlarm),
    Command(Command),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Telemetry(_) => PacketType::Telemetry,
            Packet::GyroSlipAlarm(_) => PacketType::GyroSlipAlarm,
            Packet::Command(cmd) => cmd.packet_type(),
        }
    }

    /// Type id followed by the payload
    pub fn encode(&self) -> Vec<u8> {
        let ty = self.packet_type();
        let mut out = Vec::with_capacity(1 + ty.payload_size());
        out.push(ty.id());
        match self {
            Packet::Telemetry(report) => report.to_raw().write(&mut out),
            Packet::GyroSlipAlarm(alarm) => {
                let values = [alarm.gyro_z, alarm.motor_rpm];
                for (spec, v) in GYRO_SLIP_ALARM_FIELDS.iter().zip(values) {
                    spec.wire.write(spec.transfer.invert(v), &mut out);
                }
            }
            Packet::Command(cmd) => {
                for (spec, v) in ty.layout().iter().zip(cmd.wire_values()) {
                    spec.wire.write(v, &mut out);
                }
            }
        }
        out
    }
}

impl From<Command> for Packet {
    fn from(cmd: Command) -> Self {
        Packet::Command(cmd)
    }
}

/// 16-bit sum of big-endian byte pairs; a trailing odd byte is XOR-ed in
pub fn checksum(data: &[u8]) -> u16 {
    let mut chunks = data.chunks_exact(2);
    let mut sum = chunks
        .by_ref()
        .fold(0u16, |acc, w| acc.wrapping_add(u16::from_be_bytes([w[0], w[1]])));
    if let [last] = chunks.remainder() {
        sum ^= *last as u16;
    }
    sum
}

/// Encode a command as type id followed by its payload
pub fn encode(command: &Command) -> Vec<u8> {
    Packet::Command(*command).encode()
}

/// Wrap an encoded body (type id + payload) with the start marker and checksum
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1 + CHECKSUM_SIZE);
    out.push(START_MARKER);
    out.extend_from_slice(body);
    out.extend_from_slice(&checksum(body).to_be_bytes());
    out
}

/// Ready-to-write bytes for a command
pub fn encode_frame(command: &Command) -> Vec<u8> {
    frame(&encode(command))
}

/// Decode one frame from the start of `bytes`
///
/// Returns the packet and the number of bytes the frame occupied. Trailing
/// bytes after the frame are ignored.
pub fn decode(bytes: &[u8]) -> Result<(Packet, usize)> {
    let Some(&marker) = bytes.first() else {
        return Err(Error::Truncated {
            expected: MIN_FRAME_SIZE,
            actual: 0,
        });
    };
    if marker != START_MARKER {
        return Err(Error::MissingMarker(marker));
    }
    let Some(&id) = bytes.get(1) else {
        return Err(Error::Truncated {
            expected: MIN_FRAME_SIZE,
            actual: bytes.len(),
        });
    };
    let ty = PacketType::from_id(id).ok_or(Error::UnknownPacketType(id))?;

    let total = ty.frame_size();
    if bytes.len() < total {
        return Err(Error::Truncated {
            expected: total,
            actual: bytes.len(),
        });
    }

    let body = &bytes[1..total - CHECKSUM_SIZE];
    let carried = u16::from_be_bytes([bytes[total - 2], bytes[total - 1]]);
    let computed = checksum(body);
    if computed != carried {
        return Err(Error::Checksum {
            expected: computed,
            actual: carried,
        });
    }

    let packet = decode_payload(ty, &body[1..])?;
    Ok((packet, total))
}

fn decode_payload(ty: PacketType, payload: &[u8]) -> Result<Packet> {
    let mut reader = FieldReader::new(payload);
    match ty {
        PacketType::Telemetry => Ok(Packet::Telemetry(RawTelemetry::read(&mut reader)?.scale())),
        PacketType::GyroSlipAlarm => {
            let gyro_z = &GYRO_SLIP_ALARM_FIELDS[0];
            let motor_rpm = &GYRO_SLIP_ALARM_FIELDS[1];
            Ok(Packet::GyroSlipAlarm(GyroSlipAlarm {
                gyro_z: gyro_z.transfer.apply(reader.read_field(gyro_z)?),
                motor_rpm: motor_rpm.transfer.apply(reader.read_field(motor_rpm)?),
            }))
        }
        _ => {
            let values = ty
                .layout()
                .iter()
                .map(|spec| reader.read_field(spec))
                .collect::<Result<Vec<_>>>()?;
            Ok(Packet::Command(Command::from_wire(ty, &values)?))
        }
    }
}
