//! Command dispatcher
//!
//! Turns operator intents from the `downhole` topic into validated commands
//! and writes them to the link. Sends are fire-and-forget.
//!
//! # Intent grammar
//!
//! | Intent | Command |
//! |--------|---------|
//! | `ping` | Ping |
//! | `motor-stop` | MotorStop |
//! | `motor-pwm:<int>` | MotorStartPWM, clamped to ±255 |
//! | `motor-rpm:<int>` | MotorStartRPM, clamped to ±120 |
//! | `motor-config:<name>` | MotorFlashConfig (parvalux, skateboard, hacker, plettenberg) |
//! | `set-alarm:<name>,<0\|1>` | SetAlarm (gyro) |
//! | `motor-rotate-by:<degrees>,<pwm>` | MotorRotateBy, pwm clamped |
//! | `bno055-calibrate:<0\|1>,<slot>` | Bno055SaveLoadCalibration (0 = load, 1 = save) |
//! | `motor-set-tachometer:<int>` | MotorSetTachometer |

use crate::error::Result;
use crate::protocol::{
    Alarm, CalibrationDirection, ClampNote, Command, MotorConfig, encode_frame,
};
use crate::store::Subscription;
use crate::transport::Transport;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Why an intent was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown verb '{0}'")]
    UnknownVerb(String),

    #[error("bad arguments for '{verb}': {reason}")]
    BadArguments { verb: String, reason: String },

    #[error("unknown motor config '{0}'")]
    UnknownConfig(String),

    #[error("unknown alarm '{0}'")]
    UnknownAlarm(String),
}

fn bad(verb: &str, reason: impl Into<String>) -> DispatchError {
    DispatchError::BadArguments {
        verb: verb.to_string(),
        reason: reason.into(),
    }
}

/// Split `args` on commas, requiring exactly `N` values
fn split_args<'a, const N: usize>(
    verb: &str,
    args: Option<&'a str>,
) -> std::result::Result<[&'a str; N], DispatchError> {
    let parts: Vec<&str> = match args {
        Some(a) if !a.trim().is_empty() => a.split(',').map(str::trim).collect(),
        _ => Vec::new(),
    };
    let count = parts.len();
    parts
        .try_into()
        .map_err(|_| bad(verb, format!("expected {} argument(s), got {}", N, count)))
}

fn number<T: FromStr>(verb: &str, s: &str) -> std::result::Result<T, DispatchError> {
    s.parse()
        .map_err(|_| bad(verb, format!("'{}' is not a valid number", s)))
}

/// Parse an intent, reporting any clamping applied to its parameters
pub fn parse_intent(
    intent: &str,
) -> std::result::Result<(Command, Option<ClampNote>), DispatchError> {
    let intent = intent.trim();
    let (verb, args) = match intent.split_once(':') {
        Some((verb, args)) => (verb.trim(), Some(args)),
        None => (intent, None),
    };

    let parsed = match verb {
        "ping" => {
            let [] = split_args::<0>(verb, args)?;
            (Command::Ping, None)
        }
        "motor-stop" => {
            let [] = split_args::<0>(verb, args)?;
            (Command::MotorStop, None)
        }
        "motor-pwm" => {
            let [pwm] = split_args::<1>(verb, args)?;
            Command::motor_pwm(number(verb, pwm)?)
        }
        "motor-rpm" => {
            let [rpm] = split_args::<1>(verb, args)?;
            Command::motor_rpm(number(verb, rpm)?)
        }
        "motor-config" => {
            let [name] = split_args::<1>(verb, args)?;
            let config = MotorConfig::from_name(name)
                .ok_or_else(|| DispatchError::UnknownConfig(name.to_string()))?;
            (Command::MotorFlashConfig(config), None)
        }
        "set-alarm" => {
            let [name, enabled] = split_args::<2>(verb, args)?;
            let alarm = Alarm::from_name(name)
                .ok_or_else(|| DispatchError::UnknownAlarm(name.to_string()))?;
            let enabled = match enabled {
                "0" => false,
                "1" => true,
                other => {
                    return Err(bad(verb, format!("enabled must be 0 or 1, got '{}'", other)));
                }
            };
            (Command::SetAlarm { alarm, enabled }, None)
        }
        "motor-rotate-by" => {
            let [degrees, pwm] = split_args::<2>(verb, args)?;
            Command::rotate_by(number(verb, degrees)?, number(verb, pwm)?)
        }
        "bno055-calibrate" => {
            let [direction, slot] = split_args::<2>(verb, args)?;
            let direction = CalibrationDirection::from_id(number(verb, direction)?)
                .ok_or_else(|| bad(verb, "direction must be 0 (load) or 1 (save)"))?;
            let slot = number(verb, slot)?;
            (Command::Bno055SaveLoadCalibration { direction, slot }, None)
        }
        "motor-set-tachometer" => {
            let [count] = split_args::<1>(verb, args)?;
            (Command::MotorSetTachometer(number(verb, count)?), None)
        }
        _ => return Err(DispatchError::UnknownVerb(verb.to_string())),
    };
    Ok(parsed)
}

/// Validate an intent into a command; clamping is logged, not an error
pub fn dispatch(intent: &str) -> std::result::Result<Command, DispatchError> {
    let (command, note) = parse_intent(intent)?;
    if let Some(note) = note {
        log::info!("'{}': {}", intent, note);
    }
    Ok(command)
}

/// Writes dispatched commands to the downhole link
pub struct CommandDispatcher<T: Transport> {
    transport: T,
    sent: u64,
    rejected: u64,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sent: 0,
            rejected: 0,
        }
    }

    /// Write one framed command
    pub fn send(&mut self, command: &Command) -> Result<()> {
        let bytes = encode_frame(command);
        log::trace!("TX {:02X?}", bytes);
        self.transport.send(&bytes)?;
        self.sent += 1;
        Ok(())
    }

    /// Dispatch and send one intent
    ///
    /// Invalid intents are logged and dropped; only link failures are errors.
    pub fn handle_intent(&mut self, intent: &str) -> Result<()> {
        match dispatch(intent) {
            Ok(command) => {
                self.send(&command)?;
                log::info!("Sent '{}'", intent.trim());
            }
            Err(e) => {
                self.rejected += 1;
                log::warn!("Dropping intent '{}': {}", intent.trim(), e);
            }
        }
        Ok(())
    }

    /// Process intents until shutdown, then stop the motor
    ///
    /// `poll` bounds how long a shutdown request can go unnoticed.
    pub fn run(
        &mut self,
        intents: &Subscription,
        shutdown: &AtomicBool,
        poll: Duration,
    ) -> Result<()> {
        log::info!("Command dispatcher started");
        while !shutdown.load(Ordering::Relaxed) {
            if let Some(msg) = intents.recv_timeout(poll)? {
                self.handle_intent(&msg.payload)?;
            }
        }

        if let Err(e) = self.send(&Command::MotorStop) {
            log::warn!("Final motor stop not sent: {}", e);
        }
        log::info!(
            "Command dispatcher stopped (sent={}, rejected={})",
            self.sent,
            self.rejected
        );
        Ok(())
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }
}
