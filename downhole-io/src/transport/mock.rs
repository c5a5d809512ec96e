//! Mock transport for testing
//!
//! Clones share one pair of buffers, so a test can keep a handle while the
//! loop under test owns another.

use super::{Connector, Transport};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Pause on an empty read, standing in for the serial read timeout
const EMPTY_READ_DELAY: Duration = Duration::from_millis(1);

/// In-memory transport
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    failed: bool,
    connects: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Make every read and write fail with [`Error::Disconnected`], and
    /// refuse new connections, until cleared
    pub fn set_failed(&self, failed: bool) {
        self.inner.lock().failed = failed;
    }

    /// Number of successful [`Connector::connect`] calls
    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let n = {
            let mut inner = self.inner.lock();
            if inner.failed {
                return Err(Error::Disconnected);
            }
            let n = inner.read_buffer.len().min(buffer.len());
            for (slot, b) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
                *slot = b;
            }
            n
        };
        if n == 0 {
            std::thread::sleep(EMPTY_READ_DELAY);
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(Error::Disconnected);
        }
        inner.write_buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }
}

impl Connector for MockTransport {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    fn connect(&self) -> Result<Box<dyn Transport>> {
        let mut inner = self.inner.lock();
        if inner.failed {
            return Err(Error::Disconnected);
        }
        inner.connects += 1;
        Ok(Box::new(self.clone()))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}
