//! Bounded buffer for captured process output.

use std::collections::VecDeque;

/// Maximum bytes kept per captured stream.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Keeps the most recent output of one stream, dropping the oldest bytes
/// once the capacity is reached.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append output, evicting from the front if needed.
    pub fn extend(&mut self, data: &[u8]) {
        if self.capacity == 0 {
            return;
        }

        let data = match data.len().checked_sub(self.capacity) {
            Some(skip) => data.get(skip..).unwrap_or_default(),
            None => data,
        };

        let overflow = (self.bytes.len() + data.len()).saturating_sub(self.capacity);
        self.bytes.drain(..overflow.min(self.bytes.len()));
        self.bytes.extend(data);
    }

    /// Copy out the buffered bytes, oldest first.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new(MAX_CAPTURE_BYTES)
    }
}
