//! Firmware model of the downhole unit
//!
//! Reacts to commands and produces telemetry. Time only advances through
//! [`SimUnit::step`], so tests can drive it deterministically.

use super::noise::NoiseGenerator;
use crate::orientation::Quaternion;
use crate::protocol::constants::{HAMMER_MAX, PWM_MAX, RPM_MAX};
use crate::protocol::{Command, TelemetryReport};

/// Motor speed time constant (s)
const MOTOR_TAU: f64 = 0.5;
const SUPPLY_VOLTAGE: f64 = 24.0;
const DOWNHOLE_VOLTAGE: f64 = 48.0;
const GRAVITY: f64 = 9.81;
/// Hammer blows per motor revolution
const HAMMER_RATIO: f64 = 2.0;
/// Fixed borehole tilt of the simulated tool (rad)
const TOOL_TILT: f64 = 0.05;

pub struct SimUnit {
    noise: NoiseGenerator,
    target_rpm: f64,
    rpm: f64,
    /// Revolutions still to turn for a rotate-by
    rotate_remaining: f64,
    /// Fractional revolution count
    revolutions: f64,
    hammer_phase: f64,
    gyro_alarm: bool,
    motor_temp: f64,
}

impl SimUnit {
    pub fn new(seed: u64) -> Self {
        Self {
            noise: NoiseGenerator::new(seed),
            target_rpm: 0.0,
            rpm: 0.0,
            rotate_remaining: 0.0,
            revolutions: 0.0,
            hammer_phase: 0.0,
            gyro_alarm: false,
            motor_temp: 30.0,
        }
    }

    pub fn rpm(&self) -> f64 {
        self.rpm
    }

    pub fn target_rpm(&self) -> f64 {
        self.target_rpm
    }

    pub fn tachometer(&self) -> i64 {
        self.revolutions.round() as i64
    }

    pub fn gyro_alarm_enabled(&self) -> bool {
        self.gyro_alarm
    }

    pub fn apply(&mut self, command: &Command) {
        log::debug!("Sim unit received {:?}", command);
        match *command {
            Command::Ping => {}
            Command::MotorStop => {
                self.target_rpm = 0.0;
                self.rotate_remaining = 0.0;
            }
            Command::MotorStartPwm(pwm) => {
                self.rotate_remaining = 0.0;
                self.target_rpm = f64::from(pwm.get()) / PWM_MAX as f64 * RPM_MAX as f64;
            }
            Command::MotorStartRpm(rpm) => {
                self.rotate_remaining = 0.0;
                self.target_rpm = f64::from(rpm.get());
            }
            Command::MotorRotateBy { degrees, pwm } => {
                let revs = f64::from(degrees) / 360.0;
                let speed = (f64::from(pwm.get()) / PWM_MAX as f64 * RPM_MAX as f64).abs();
                self.rotate_remaining = revs;
                self.target_rpm = speed.copysign(revs);
            }
            Command::MotorSetTachometer(count) => {
                self.revolutions = f64::from(count);
            }
            Command::SetAlarm { enabled, .. } => {
                self.gyro_alarm = enabled;
            }
            Command::MotorFlashConfig(config) => {
                log::info!("Sim unit flashing motor config {}", config.name());
            }
            Command::Bno055SaveLoadCalibration { direction, slot } => {
                log::info!("Sim unit calibration {:?} slot {}", direction, slot);
            }
        }
    }

    /// Advance the model by `dt` seconds
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let alpha = 1.0 - (-dt / MOTOR_TAU).exp();
        self.rpm += (self.target_rpm - self.rpm) * alpha;

        let mut turned = self.rpm / 60.0 * dt;
        if self.rotate_remaining != 0.0 {
            // Brake exactly at the rotate-by target
            if turned.abs() >= self.rotate_remaining.abs() {
                turned = self.rotate_remaining;
                self.rotate_remaining = 0.0;
                self.target_rpm = 0.0;
                self.rpm = 0.0;
            } else {
                self.rotate_remaining -= turned;
            }
        }
        self.revolutions += turned;
        self.hammer_phase = (self.hammer_phase + turned * HAMMER_RATIO).rem_euclid(1.0);

        let heating = self.rpm.abs() / RPM_MAX as f64 * 2.0;
        self.motor_temp += (30.0 + 20.0 * heating - self.motor_temp) * dt / 60.0;
    }

    /// Attitude: fixed tilt, rolled with the motor shaft
    fn attitude(&self) -> Quaternion {
        let roll = (self.revolutions.fract() * std::f64::consts::TAU).rem_euclid(std::f64::consts::TAU);
        let (s, c) = (TOOL_TILT / 2.0).sin_cos();
        Quaternion::about_z(roll) * Quaternion::new(s, 0.0, 0.0, c)
    }

    /// Current sensor readings with noise
    pub fn telemetry(&mut self) -> TelemetryReport {
        let duty = (self.rpm / RPM_MAX as f64).clamp(-1.0, 1.0);
        let hammer = if self.rpm.abs() > 1.0 {
            0.5 * HAMMER_MAX * (1.0 - (self.hammer_phase * std::f64::consts::TAU).cos())
        } else {
            0.0
        };
        let q = self.attitude();
        let g = q.conjugate().rotate([0.0, 0.0, -GRAVITY]);
        let gyro_z = self.rpm * 6.0;
        let n = &mut self.noise;

        TelemetryReport {
            motor_voltage: n.around(SUPPLY_VOLTAGE - duty.abs() * 0.4, 0.02),
            motor_current: n.around(0.3 + duty.abs() * 8.0, 0.05),
            motor_rpm: self.rpm,
            motor_duty_cycle: duty,
            motor_controller_temp: n.around(self.motor_temp + 5.0, 0.1),
            hammer: hammer.round(),
            pressure_0: n.around(1013.0, 2.0).round(),
            pressure_1: n.around(1015.0, 2.0).round(),
            pressure_2: n.around(1011.0, 2.0).round(),
            pressure_3: n.around(1014.0, 2.0).round(),
            temp_motor: n.around(self.motor_temp, 0.1),
            temp_mosfet: n.around(self.motor_temp + 3.0, 0.1),
            temp_pcb: n.around(32.0, 0.1),
            temp_imu: n.around(31.0, 0.1),
            temp_gear_0: n.around(self.motor_temp - 2.0, 0.5).round(),
            temp_gear_1: n.around(self.motor_temp - 2.5, 0.5).round(),
            temp_top_plug: n.around(28.0, 0.5).round(),
            inclinometer_x: n.around(TOOL_TILT.to_degrees(), 0.02),
            inclinometer_y: n.around(0.0, 0.02),
            accel_x: n.around(g[0], 0.05),
            accel_y: n.around(g[1], 0.05),
            accel_z: n.around(g[2], 0.05),
            gyro_x: n.around(0.0, 0.1),
            gyro_y: n.around(0.0, 0.1),
            gyro_z: n.around(gyro_z, 0.1),
            mag_x: n.around(22.0, 0.3),
            mag_y: n.around(-4.0, 0.3),
            mag_z: n.around(-41.0, 0.3),
            linear_accel_x: n.around(0.0, 0.02),
            linear_accel_y: n.around(0.0, 0.02),
            linear_accel_z: n.around(0.0, 0.02),
            gravity_x: g[0],
            gravity_y: g[1],
            gravity_z: g[2],
            quat_x: q.x,
            quat_y: q.y,
            quat_z: q.z,
            quat_w: q.w,
            tachometer: self.revolutions.round(),
            gyro_alarm: f64::from(u8::from(self.gyro_alarm)),
            downhole_voltage: n.around(DOWNHOLE_VOLTAGE, 0.05),
        }
    }
}
