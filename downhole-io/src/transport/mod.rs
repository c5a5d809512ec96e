//! Transport layer for I/O abstraction
//!
//! The ingest loop and the command dispatcher each own a transport handle.
//! A [`Connector`] hands out those handles and is asked again whenever a loop
//! has to reopen its link.

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::{SerialConnector, SerialTransport};

/// Byte transport to the downhole unit
pub trait Transport: Send {
    /// Read available bytes, waiting at most the configured read timeout
    ///
    /// Returns 0 when the timeout elapses without data.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Write a whole frame and flush it
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match self.write(&data[written..])? {
                0 => return Err(crate::error::Error::Disconnected),
                n => written += n,
            }
        }
        self.flush()
    }

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        (**self).read(buffer)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn available(&mut self) -> Result<usize> {
        (**self).available()
    }
}

/// Opens transport handles to the downhole unit
pub trait Connector: Send + Sync {
    /// Human-readable link name for logs
    fn describe(&self) -> String;

    /// Open a new handle; called again after every link failure
    fn connect(&self) -> Result<Box<dyn Transport>>;
}
