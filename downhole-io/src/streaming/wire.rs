//! Length-prefixed JSON framing for the store server
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┐
//! │ Length (4 bytes) │ Payload (variable)       │
//! │ Big-endian u32   │ JSON                     │
//! └──────────────────┴──────────────────────────┘
//! ```
//!
//! - **Maximum message size**: 1 MiB. A larger length prefix closes the
//!   connection.
//! - **Read timeouts**: a timeout in the middle of a frame keeps the partial
//!   bytes, so sockets can use short timeouts to poll a shutdown flag.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, ErrorKind, Read, Write};

pub const LENGTH_PREFIX_SIZE: usize = 4;

pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Serialize `message` and write it as one frame
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Error::Other(format!(
            "Message too large: {} bytes",
            payload.len()
        )));
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame and deserialize it; a read timeout is an error here
pub fn read_message<R: Read, T: DeserializeOwned>(
    reader: &mut FrameReader,
    source: &mut R,
) -> Result<T> {
    match reader.poll(source)? {
        Some(payload) => Ok(serde_json::from_slice(&payload)?),
        None => Err(Error::Io(io::Error::from(ErrorKind::TimedOut))),
    }
}

/// Incremental frame reader that survives read timeouts
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
    /// Payload length once the prefix is complete
    expected: Option<usize>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of the current partial frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Read until a whole frame is buffered or the source times out
    ///
    /// Returns `Ok(None)` on timeout. End of stream and oversized length
    /// prefixes are errors; the connection should be dropped.
    pub fn poll<R: Read>(&mut self, source: &mut R) -> Result<Option<Vec<u8>>> {
        loop {
            let want = LENGTH_PREFIX_SIZE + self.expected.unwrap_or(0);
            if self.buf.len() == want {
                match self.expected {
                    None => {
                        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
                        prefix.copy_from_slice(&self.buf);
                        let len = u32::from_be_bytes(prefix) as usize;
                        if len > MAX_MESSAGE_SIZE {
                            return Err(Error::Other(format!("Message too large: {} bytes", len)));
                        }
                        self.expected = Some(len);
                        continue;
                    }
                    Some(_) => {
                        let payload = self.buf.split_off(LENGTH_PREFIX_SIZE);
                        self.buf.clear();
                        self.expected = None;
                        return Ok(Some(payload));
                    }
                }
            }

            let start = self.buf.len();
            self.buf.resize(want, 0);
            match source.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    return Err(Error::Io(io::Error::from(ErrorKind::UnexpectedEof)));
                }
                Ok(n) => self.buf.truncate(start + n),
                Err(e) => {
                    self.buf.truncate(start);
                    match e.kind() {
                        ErrorKind::WouldBlock | ErrorKind::TimedOut => return Ok(None),
                        ErrorKind::Interrupted => {}
                        _ => return Err(Error::Io(e)),
                    }
                }
            }
        }
    }
}
