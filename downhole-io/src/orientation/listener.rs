//! Calibration requests from the `oricalib` topic

use super::calibration::{Method, set_offset, zero};
use crate::error::{Error, Result};
use crate::store::{SharedStore, Subscription};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// `zero:<method>` or `clear:<method>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationRequest {
    Zero(Method),
    Clear(Method),
}

impl FromStr for CalibrationRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Other(format!("invalid calibration request '{}'", s));
        let (action, method) = s.trim().split_once(':').ok_or_else(invalid)?;
        let method = Method::from_name(method.trim()).ok_or_else(invalid)?;
        match action.trim() {
            "zero" => Ok(CalibrationRequest::Zero(method)),
            "clear" => Ok(CalibrationRequest::Clear(method)),
            _ => Err(invalid()),
        }
    }
}

pub struct CalibrationListener {
    store: Arc<dyn SharedStore>,
}

impl CalibrationListener {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Apply one request; malformed requests are logged and ignored
    pub fn handle(&self, request: &str) -> Result<()> {
        let request = match request.parse::<CalibrationRequest>() {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{}", e);
                return Ok(());
            }
        };
        match request {
            CalibrationRequest::Zero(method) => {
                zero(self.store.as_ref(), method)?;
            }
            CalibrationRequest::Clear(method) => {
                set_offset(self.store.as_ref(), method, None)?;
            }
        }
        Ok(())
    }

    pub fn run(&self, requests: &Subscription, shutdown: &AtomicBool, poll: Duration) -> Result<()> {
        log::info!("Calibration listener started");
        while !shutdown.load(Ordering::Relaxed) {
            if let Some(msg) = requests.recv_timeout(poll)?
                && let Err(e) = self.handle(&msg.payload)
            {
                log::warn!("Calibration request '{}' failed: {}", msg.payload, e);
            }
        }
        log::info!("Calibration listener stopped");
        Ok(())
    }
}
