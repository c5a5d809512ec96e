//! Loop supervision with reconnect backoff
//!
//! Each long-running loop owns one transport handle. When the handle fails
//! the loop returns an error, the supervisor waits and asks its connector for
//! a new handle. The wait grows ×1.5 per consecutive failure up to a cap and
//! resets after a successful open.

use crate::config::SerialConfig;
use crate::error::Result;
use crate::transport::{Connector, Transport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const BACKOFF_FACTOR: f64 = 1.5;

/// Granularity of shutdown checks while waiting to reconnect
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Exponential reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base.min(max),
            attempts: 0,
        }
    }

    pub fn from_config(config: &SerialConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_backoff_ms),
            Duration::from_millis(config.reconnect_backoff_max_ms),
        )
    }

    /// Delay before the next attempt; grows the following one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.attempts += 1;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * BACKOFF_FACTOR).min(self.max.as_secs_f64()),
        );
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base.min(self.max);
        self.attempts = 0;
    }

    /// Consecutive failures since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Sleep up to `duration`, returning early once `shutdown` is set
pub fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

/// Run `body` on fresh transport handles until it returns `Ok` or shutdown
pub fn supervise<F>(
    name: &str,
    connector: &dyn Connector,
    mut backoff: Backoff,
    shutdown: &AtomicBool,
    mut body: F,
) where
    F: FnMut(Box<dyn Transport>) -> Result<()>,
{
    while !shutdown.load(Ordering::Relaxed) {
        match connector.connect() {
            Ok(transport) => {
                if backoff.attempts() > 0 {
                    log::info!("{}: link {} reopened", name, connector.describe());
                }
                backoff.reset();
                match body(transport) {
                    Ok(()) => break,
                    Err(e) => log::error!("{}: link failed: {}", name, e),
                }
            }
            Err(e) => log::warn!("{}: cannot open {}: {}", name, connector.describe(), e),
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let delay = backoff.next_delay();
        log::info!(
            "{}: reconnecting in {:.1}s (attempt {})",
            name,
            delay.as_secs_f64(),
            backoff.attempts()
        );
        sleep_unless_shutdown(delay, shutdown);
    }
    log::debug!("{}: supervisor exiting", name);
}

/// [`supervise`] on a named thread
pub fn spawn_supervised<F>(
    name: &str,
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    shutdown: Arc<AtomicBool>,
    body: F,
) -> Result<JoinHandle<()>>
where
    F: FnMut(Box<dyn Transport>) -> Result<()> + Send + 'static,
{
    let thread_name = name.to_string();
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            supervise(&thread_name, connector.as_ref(), backoff, &shutdown, body);
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::MockTransport;

    #[test]
    fn test_backoff_growth_and_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(750));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1125));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1500));
        assert_eq!(backoff.attempts(), 5);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_reconnects_after_failure() {
        let mock = MockTransport::new();
        let shutdown = AtomicBool::new(false);
        let mut runs = 0;

        supervise(
            "test",
            &mock,
            Backoff::new(Duration::from_millis(1), Duration::from_millis(2)),
            &shutdown,
            |_transport| {
                runs += 1;
                if runs < 3 {
                    Err(Error::Disconnected)
                } else {
                    Ok(())
                }
            },
        );

        assert_eq!(runs, 3);
        assert_eq!(mock.connect_count(), 3);
    }

    #[test]
    fn test_stops_on_shutdown_while_link_down() {
        let mock = MockTransport::new();
        mock.set_failed(true);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = spawn_supervised(
            "down",
            Arc::new(mock.clone()),
            Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
            Arc::clone(&shutdown),
            |_transport| Ok(()),
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert_eq!(mock.connect_count(), 0);
    }
}
