//! Fixed-capacity frame buffers.
//!
//! Each connection owns a receive buffer and a send buffer of fixed size.
//! Valid bytes always sit at the front, `[0, filled)`. Consuming bytes from
//! the front shifts the remainder down (compaction), so a buffer never has
//! to grow as long as frames keep getting consumed.
//!
//! Appending more than the free space is a reported `BufferError::Overflow`
//! rather than a silent reallocation.

use crate::protocols::echo::parser;
use std::fmt;

/// Capacity of the per-connection receive and send buffers.
pub const BUFFER_SIZE: usize = 1024;

/// Size of the transient buffer used for each raw socket read.
pub const READ_CHUNK: usize = 32;

/// Error returned when a buffer operation cannot fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Appending `incoming` bytes would exceed capacity.
    Overflow {
        capacity: usize,
        filled: usize,
        incoming: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::Overflow {
                capacity,
                filled,
                incoming,
            } => write!(
                f,
                "buffer overflow: {incoming} bytes into {filled}/{capacity} used"
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// Cursor-indexed byte region with a fixed capacity.
pub struct FrameBuffer {
    buf: Box<[u8]>,
    filled: usize,
}

impl FrameBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Free space left at the back.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.filled
    }

    /// The valid bytes.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.filled]
    }

    /// Free space for writing in place. Follow with `commit`.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Mark `n` bytes written through `spare_mut` as valid.
    ///
    /// # Panics
    /// Panics if `n` exceeds the free space.
    pub fn commit(&mut self, n: usize) {
        assert!(n <= self.remaining(), "commit past capacity");
        self.filled += n;
    }

    /// Copy `data` in after the existing bytes.
    ///
    /// Leaves the buffer untouched if `data` does not fit.
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        if data.len() > self.remaining() {
            return Err(BufferError::Overflow {
                capacity: self.capacity(),
                filled: self.filled,
                incoming: data.len(),
            });
        }
        self.buf[self.filled..self.filled + data.len()].copy_from_slice(data);
        self.filled += data.len();
        Ok(())
    }

    /// Discard `n` bytes from the front and shift the rest down.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.filled);
        if n < self.filled {
            self.buf.copy_within(n..self.filled, 0);
        }
        self.filled -= n;
    }

    /// Length of the first complete frame, if one is buffered.
    pub fn frame_len(&self) -> Option<usize> {
        parser::find_frame(self.filled())
    }

    pub fn has_frame(&self) -> bool {
        self.frame_len().is_some()
    }

    /// Remove the first complete frame and return its bytes.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        let len = self.frame_len()?;
        let frame = self.buf[..len].to_vec();
        self.consume(len);
        Some(frame)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("capacity", &self.capacity())
            .field("filled", &self.filled)
            .finish()
    }
}
