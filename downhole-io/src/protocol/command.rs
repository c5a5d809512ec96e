//! Downhole commands
//!
//! A [`Command`] is always ready to encode: its parameters were range-checked
//! when it was built. Out-of-range PWM and RPM requests are clamped to the
//! hardware limits rather than rejected, and the constructor reports the
//! adjustment as a [`ClampNote`].

use super::constants::{PWM_MAX, RPM_MAX};
use super::fields::{FieldSpec, WireType};
use super::packet::PacketType;
use crate::error::{Error, Result};
use std::fmt;

pub const PWM_FIELDS: &[FieldSpec] = &[FieldSpec::raw("pwm", WireType::I16)];
pub const RPM_FIELDS: &[FieldSpec] = &[FieldSpec::raw("rpm", WireType::I16)];
pub const ROTATE_BY_FIELDS: &[FieldSpec] = &[
    FieldSpec::raw("degrees", WireType::I32),
    FieldSpec::raw("pwm", WireType::I16),
];
pub const FLASH_CONFIG_FIELDS: &[FieldSpec] = &[FieldSpec::raw("config", WireType::U8)];
pub const SET_ALARM_FIELDS: &[FieldSpec] = &[
    FieldSpec::raw("alarm", WireType::U8),
    FieldSpec::raw("enabled", WireType::U8),
];
pub const CALIBRATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::raw("direction", WireType::U8),
    FieldSpec::raw("slot", WireType::U8),
];
pub const TACHOMETER_FIELDS: &[FieldSpec] = &[FieldSpec::raw("count", WireType::I32)];

/// Record of a parameter that was pulled back into range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampNote {
    pub field: &'static str,
    pub requested: i64,
    pub applied: i64,
}

impl fmt::Display for ClampNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} clamped to {}",
            self.field, self.requested, self.applied
        )
    }
}

fn clamp_to(field: &'static str, requested: i64, limit: i64) -> (i16, Option<ClampNote>) {
    let applied = requested.clamp(-limit, limit);
    let note = (applied != requested).then_some(ClampNote {
        field,
        requested,
        applied,
    });
    // limit is well inside i16
    (applied as i16, note)
}

/// Motor PWM duty, always within ±PWM_MAX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pwm(i16);

impl Pwm {
    pub fn new(requested: i64) -> (Self, Option<ClampNote>) {
        let (v, note) = clamp_to("pwm", requested, PWM_MAX);
        (Self(v), note)
    }

    pub fn get(self) -> i16 {
        self.0
    }
}

/// Motor speed setpoint, always within ±RPM_MAX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rpm(i16);

impl Rpm {
    pub fn new(requested: i64) -> (Self, Option<ClampNote>) {
        let (v, note) = clamp_to("rpm", requested, RPM_MAX);
        (Self(v), note)
    }

    pub fn get(self) -> i16 {
        self.0
    }
}

/// Motor controller parameter sets stored in the controller's flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorConfig {
    Parvalux,
    Skateboard,
    Hacker,
    Plettenberg,
}

impl MotorConfig {
    pub const ALL: [MotorConfig; 4] = [
        MotorConfig::Parvalux,
        MotorConfig::Skateboard,
        MotorConfig::Hacker,
        MotorConfig::Plettenberg,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            MotorConfig::Parvalux => "parvalux",
            MotorConfig::Skateboard => "skateboard",
            MotorConfig::Hacker => "hacker",
            MotorConfig::Plettenberg => "plettenberg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Alarms the downhole unit can raise on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alarm {
    /// Gyro slip: the tool body spins with the motor
    Gyro,
}

impl Alarm {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Alarm::Gyro),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Alarm::Gyro => "gyro",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gyro" => Some(Alarm::Gyro),
            _ => None,
        }
    }
}

/// BNO055 calibration profile transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationDirection {
    Load,
    Save,
}

impl CalibrationDirection {
    pub fn id(self) -> u8 {
        match self {
            CalibrationDirection::Load => 0,
            CalibrationDirection::Save => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CalibrationDirection::Load),
            1 => Some(CalibrationDirection::Save),
            _ => None,
        }
    }
}

/// Validated downhole command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    MotorStop,
    MotorStartPwm(Pwm),
    MotorStartRpm(Rpm),
    MotorRotateBy { degrees: i32, pwm: Pwm },
    MotorFlashConfig(MotorConfig),
    SetAlarm { alarm: Alarm, enabled: bool },
    Bno055SaveLoadCalibration { direction: CalibrationDirection, slot: u8 },
    MotorSetTachometer(i32),
}

impl Command {
    pub fn motor_pwm(requested: i64) -> (Self, Option<ClampNote>) {
        let (pwm, note) = Pwm::new(requested);
        (Command::MotorStartPwm(pwm), note)
    }

    pub fn motor_rpm(requested: i64) -> (Self, Option<ClampNote>) {
        let (rpm, note) = Rpm::new(requested);
        (Command::MotorStartRpm(rpm), note)
    }

    pub fn rotate_by(degrees: i32, pwm: i64) -> (Self, Option<ClampNote>) {
        let (pwm, note) = Pwm::new(pwm);
        (Command::MotorRotateBy { degrees, pwm }, note)
    }

    pub fn packet_type(&self) -> PacketType {
        match self {
            Command::Ping => PacketType::Ping,
            Command::MotorStop => PacketType::MotorStop,
            Command::MotorStartPwm(_) => PacketType::MotorStartPwm,
            Command::MotorStartRpm(_) => PacketType::MotorStartRpm,
            Command::MotorRotateBy { .. } => PacketType::MotorRotateBy,
            Command::MotorFlashConfig(_) => PacketType::MotorFlashConfig,
            Command::SetAlarm { .. } => PacketType::SetAlarm,
            Command::Bno055SaveLoadCalibration { .. } => PacketType::Bno055SaveLoadCalibration,
            Command::MotorSetTachometer(_) => PacketType::MotorSetTachometer,
        }
    }

    /// Field values in layout order
    pub fn wire_values(&self) -> Vec<i64> {
        match *self {
            Command::Ping | Command::MotorStop => Vec::new(),
            Command::MotorStartPwm(pwm) => vec![pwm.get().into()],
            Command::MotorStartRpm(rpm) => vec![rpm.get().into()],
            Command::MotorRotateBy { degrees, pwm } => vec![degrees.into(), pwm.get().into()],
            Command::MotorFlashConfig(config) => vec![config.id().into()],
            Command::SetAlarm { alarm, enabled } => vec![alarm.id().into(), i64::from(enabled)],
            Command::Bno055SaveLoadCalibration { direction, slot } => {
                vec![direction.id().into(), slot.into()]
            }
            Command::MotorSetTachometer(count) => vec![count.into()],
        }
    }

    /// Rebuild a command from wire values read with its layout
    ///
    /// PWM and RPM go through the same clamping constructors as operator
    /// intents; enumerated bytes outside their table are rejected.
    pub fn from_wire(ty: PacketType, values: &[i64]) -> Result<Self> {
        let at = |i: usize| values.get(i).copied().unwrap_or_default();
        let byte = |i: usize| u8::try_from(at(i)).unwrap_or(u8::MAX);

        let command = match ty {
            PacketType::Ping => Command::Ping,
            PacketType::MotorStop => Command::MotorStop,
            PacketType::MotorStartPwm => Command::motor_pwm(at(0)).0,
            PacketType::MotorStartRpm => Command::motor_rpm(at(0)).0,
            PacketType::MotorRotateBy => {
                let degrees = i32::try_from(at(0)).map_err(|_| Error::InvalidField {
                    field: "degrees",
                    value: at(0),
                })?;
                Command::rotate_by(degrees, at(1)).0
            }
            PacketType::MotorFlashConfig => {
                let config = MotorConfig::from_id(byte(0)).ok_or(Error::InvalidField {
                    field: "config",
                    value: at(0),
                })?;
                Command::MotorFlashConfig(config)
            }
            PacketType::SetAlarm => {
                let alarm = Alarm::from_id(byte(0)).ok_or(Error::InvalidField {
                    field: "alarm",
                    value: at(0),
                })?;
                let enabled = match at(1) {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(Error::InvalidField {
                            field: "enabled",
                            value: other,
                        })
                    }
                };
                Command::SetAlarm { alarm, enabled }
            }
            PacketType::Bno055SaveLoadCalibration => {
                let direction =
                    CalibrationDirection::from_id(byte(0)).ok_or(Error::InvalidField {
                        field: "direction",
                        value: at(0),
                    })?;
                Command::Bno055SaveLoadCalibration {
                    direction,
                    slot: byte(1),
                }
            }
            PacketType::MotorSetTachometer => {
                let count = i32::try_from(at(0)).map_err(|_| Error::InvalidField {
                    field: "count",
                    value: at(0),
                })?;
                Command::MotorSetTachometer(count)
            }
            PacketType::Telemetry | PacketType::GyroSlipAlarm => {
                return Err(Error::Other(format!("{} is not a command", ty.name())))
            }
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pwm_clamping() {
        let (pwm, note) = Pwm::new(9001);
        assert_eq!(pwm.get(), 255);
        assert_eq!(
            note,
            Some(ClampNote {
                field: "pwm",
                requested: 9001,
                applied: 255
            })
        );

        assert_eq!(Pwm::new(-9001).0.get(), -255);
        assert_eq!(Pwm::new(120), (Pwm(120), None));
    }

    #[test]
    fn test_rpm_clamping() {
        assert_eq!(Rpm::new(121).0.get(), 120);
        assert_eq!(Rpm::new(-121).0.get(), -120);
        assert!(Rpm::new(-120).1.is_none());
    }

    #[test]
    fn test_clamp_note_display() {
        let (_, note) = Command::motor_rpm(500);
        assert_eq!(note.unwrap().to_string(), "rpm 500 clamped to 120");
    }

    #[test]
    fn test_motor_config_names() {
        for config in MotorConfig::ALL {
            assert_eq!(MotorConfig::from_name(config.name()), Some(config));
            assert_eq!(MotorConfig::from_id(config.id()), Some(config));
        }
        assert_eq!(MotorConfig::Plettenberg.id(), 3);
        assert_eq!(MotorConfig::from_name("unknown"), None);
        assert_eq!(MotorConfig::from_id(4), None);
    }

    #[test]
    fn test_from_wire_clamps_like_intents() {
        let cmd = Command::from_wire(PacketType::MotorStartPwm, &[1000]).unwrap();
        assert_eq!(cmd, Command::MotorStartPwm(Pwm(255)));
    }

    #[test]
    fn test_from_wire_rejects_unknown_enumerations() {
        assert!(matches!(
            Command::from_wire(PacketType::MotorFlashConfig, &[9]),
            Err(Error::InvalidField {
                field: "config",
                value: 9
            })
        ));
        assert!(Command::from_wire(PacketType::SetAlarm, &[1, 1]).is_err());
        assert!(Command::from_wire(PacketType::SetAlarm, &[0, 2]).is_err());
        assert!(Command::from_wire(PacketType::Bno055SaveLoadCalibration, &[2, 0]).is_err());
        assert!(Command::from_wire(PacketType::Telemetry, &[]).is_err());
    }

    #[test]
    fn test_wire_values_follow_layout() {
        let (cmd, _) = Command::rotate_by(-90, 60);
        assert_eq!(cmd.wire_values(), vec![-90, 60]);
        assert_eq!(
            cmd.wire_values().len(),
            cmd.packet_type().layout().len()
        );
    }
}
