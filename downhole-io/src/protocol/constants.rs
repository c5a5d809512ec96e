//! Constants for the downhole link protocol

// Frame layout: [MARKER] [TYPE] [PAYLOAD ...] [CSUM_H] [CSUM_L]
pub const START_MARKER: u8 = 0xAA;
pub const HEADER_SIZE: usize = 2; // MARKER(1) + TYPE(1)
pub const CHECKSUM_SIZE: usize = 2;
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

// Uphole packet ids (downhole unit -> surface)
pub const TYPE_TELEMETRY: u8 = 0x10;
pub const TYPE_GYRO_SLIP_ALARM: u8 = 0x11;

// Downhole packet ids (surface -> downhole unit)
pub const TYPE_PING: u8 = 0x20;
pub const TYPE_MOTOR_STOP: u8 = 0x21;
pub const TYPE_MOTOR_START_PWM: u8 = 0x22;
pub const TYPE_MOTOR_START_RPM: u8 = 0x23;
pub const TYPE_MOTOR_ROTATE_BY: u8 = 0x24;
pub const TYPE_MOTOR_FLASH_CONFIG: u8 = 0x25;
pub const TYPE_SET_ALARM: u8 = 0x26;
pub const TYPE_BNO055_SAVE_LOAD_CALIBRATION: u8 = 0x27;
pub const TYPE_MOTOR_SET_TACHOMETER: u8 = 0x28;

// Hardware-safe command limits
pub const PWM_MAX: i64 = 255;
pub const RPM_MAX: i64 = 120;

/// Raw hammer reading at full stroke
pub const HAMMER_MAX: f64 = 255.0;

/// Initial accumulation buffer capacity (several telemetry frames)
pub const FRAMER_BUFFER_CAPACITY: usize = 1024;

/// Bytes requested from the transport per read
pub const READ_CHUNK_SIZE: usize = 256;
