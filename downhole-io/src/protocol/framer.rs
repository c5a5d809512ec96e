//! Stream framer
//!
//! Recovers frame boundaries from an unbounded byte stream. Bytes are pushed
//! as they arrive and events are pulled lazily; the framer never blocks and
//! can be resumed after every push.
//!
//! Resynchronization rules:
//! - a byte that cannot start a frame (not the marker, or marker followed by
//!   an unknown type id) is stray
//! - a frame still missing bytes waits; it is never counted as stray
//! - a checksum mismatch discards only the marker byte, so a real frame that
//!   starts inside the corrupted one is still found
//!
//! Pending stray bytes are reported before the next frame and before the
//! framer runs out of bytes.

use super::constants::{FRAMER_BUFFER_CAPACITY, START_MARKER};
use super::packet::{Packet, PacketType, decode};
use super::ring_buffer::RingBuffer;

/// One framing result
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Frame(Packet),
    /// Number of bytes skipped while resynchronizing
    Stray(usize),
}

pub struct StreamFramer {
    buffer: RingBuffer,
    pending_stray: usize,
    frames: u64,
    stray_total: u64,
}

impl StreamFramer {
    pub fn new() -> Self {
        Self {
            buffer: RingBuffer::with_capacity(FRAMER_BUFFER_CAPACITY),
            pending_stray: 0,
            frames: 0,
            stray_total: 0,
        }
    }

    /// Append bytes read from the link
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Bytes waiting for the rest of their frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frames decoded since creation
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Stray bytes skipped since creation
    pub fn stray_count(&self) -> u64 {
        self.stray_total
    }

    /// Next event from the buffered bytes, `None` when more input is needed
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        loop {
            let Some(first) = self.buffer.get(0) else {
                return self.flush_stray();
            };

            if first != START_MARKER {
                // Jump straight to the next marker, or past everything buffered
                let skip = self.buffer.find(START_MARKER).unwrap_or(self.buffer.len());
                self.skip_stray(skip);
                continue;
            }

            let Some(id) = self.buffer.get(1) else {
                return self.flush_stray();
            };
            let Some(ty) = PacketType::from_id(id) else {
                self.skip_stray(1);
                continue;
            };

            let size = ty.frame_size();
            if self.buffer.len() < size {
                return self.flush_stray();
            }

            let Some(bytes) = self.buffer.get_slice(0, size) else {
                return self.flush_stray();
            };
            match decode(bytes) {
                Ok((packet, used)) => {
                    if let Some(stray) = self.flush_stray() {
                        // Frame stays buffered and is returned on the next call
                        return Some(stray);
                    }
                    self.buffer.advance(used);
                    self.frames += 1;
                    log::trace!("Framed {} ({} bytes)", ty, used);
                    return Some(FrameEvent::Frame(packet));
                }
                Err(e) => {
                    log::debug!("Discarding marker: {}", e);
                    self.skip_stray(1);
                }
            }
        }
    }

    /// Drain every event currently available
    pub fn events(&mut self) -> impl Iterator<Item = FrameEvent> + '_ {
        std::iter::from_fn(move || self.next_event())
    }

    fn skip_stray(&mut self, n: usize) {
        self.buffer.advance(n);
        self.pending_stray += n;
    }

    fn flush_stray(&mut self) -> Option<FrameEvent> {
        if self.pending_stray == 0 {
            return None;
        }
        let n = std::mem::take(&mut self.pending_stray);
        self.stray_total += n as u64;
        Some(FrameEvent::Stray(n))
    }
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}
