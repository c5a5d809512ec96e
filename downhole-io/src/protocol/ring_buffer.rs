//! Ring buffer for stream framing
//!
//! O(1) consume instead of O(n) `Vec::drain()`. Capacity doubles when a push
//! would overflow, so bytes are never dropped.

pub struct RingBuffer {
    data: Vec<u8>,
    tail: usize, // Read position (first valid byte)
    len: usize,
    staging: Vec<u8>, // For non-contiguous slice access
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)],
            tail: 0,
            len: 0,
            staging: Vec::new(),
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn head(&self) -> usize {
        (self.tail + self.len) % self.capacity()
    }

    /// Append bytes, growing if needed
    pub fn extend(&mut self, bytes: &[u8]) {
        if self.len + bytes.len() > self.capacity() {
            self.grow(self.len + bytes.len());
        }
        for &b in bytes {
            let head = self.head();
            self.data[head] = b;
            self.len += 1;
        }
    }

    /// Re-linearize into a larger buffer starting at index 0
    fn grow(&mut self, needed: usize) {
        let mut capacity = self.capacity();
        while capacity < needed {
            capacity *= 2;
        }
        let mut data = vec![0u8; capacity];
        for (i, slot) in data.iter_mut().enumerate().take(self.len) {
            *slot = self.data[(self.tail + i) % self.capacity()];
        }
        log::trace!("Ring buffer grew to {} bytes", capacity);
        self.data = data;
        self.tail = 0;
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % self.capacity();
        self.len -= n;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        (index < self.len).then(|| self.data[(self.tail + index) % self.capacity()])
    }

    /// Offset of the first occurrence of `byte`
    pub fn find(&self, byte: u8) -> Option<usize> {
        (0..self.len).find(|&i| self.data[(self.tail + i) % self.capacity()] == byte)
    }

    /// Contiguous view of `len` bytes at `start`
    ///
    /// Borrows the main buffer when the range does not wrap, otherwise copies
    /// into the staging buffer.
    pub fn get_slice(&mut self, start: usize, len: usize) -> Option<&[u8]> {
        if start + len > self.len {
            return None;
        }
        let capacity = self.capacity();
        let real_start = (self.tail + start) % capacity;

        if real_start + len <= capacity {
            Some(&self.data[real_start..real_start + len])
        } else {
            self.staging.clear();
            self.staging.extend_from_slice(&self.data[real_start..]);
            self.staging
                .extend_from_slice(&self.data[..len - (capacity - real_start)]);
            Some(&self.staging)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut rb = RingBuffer::with_capacity(16);
        assert_eq!(rb.len(), 0);

        rb.extend(&[1, 2, 3, 4, 5]);
        assert_eq!(rb.len(), 5);
        assert_eq!(rb.get(0), Some(1));
        assert_eq!(rb.get(4), Some(5));
        assert_eq!(rb.get(5), None);

        rb.advance(2);
        assert_eq!(rb.get(0), Some(3));
        assert_eq!(rb.find(5), Some(2));
        assert_eq!(rb.find(1), None);
    }

    #[test]
    fn test_wrapped_slice() {
        let mut rb = RingBuffer::with_capacity(8);
        rb.extend(&[1, 2, 3, 4, 5, 6]);
        rb.advance(5);
        rb.extend(&[7, 8, 9]);

        assert_eq!(rb.len(), 4);
        assert_eq!(rb.get_slice(0, 4).unwrap(), &[6, 7, 8, 9]);
        assert_eq!(rb.get_slice(1, 2).unwrap(), &[7, 8]);
        assert!(rb.get_slice(2, 3).is_none());
    }

    #[test]
    fn test_grows_without_dropping() {
        let mut rb = RingBuffer::with_capacity(4);
        rb.extend(&[1, 2, 3]);
        rb.advance(2);
        rb.extend(&[4, 5, 6, 7, 8, 9]);

        assert_eq!(rb.len(), 7);
        assert_eq!(rb.get_slice(0, 7).unwrap(), &[3, 4, 5, 6, 7, 8, 9]);
    }
}
