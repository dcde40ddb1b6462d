//! Growable byte accumulator used by the packet codec.
//!
//! The receive path appends raw socket fragments to a [`ByteBuffer`] and
//! consumes complete packets from its head. The buffer supports appending,
//! head/tail removal and zero-copy hand-off of a prefix, and can enforce a
//! maximum capacity so a misbehaving peer cannot grow it without bound.

use bytes::{Buf, BytesMut};
use halyard_platform::{HalyardError, HalyardResult};

/// Growable byte buffer with head/tail removal.
///
/// # Example
///
/// ```rust
/// use halyard_proto::ssh::buffer::ByteBuffer;
///
/// let mut buf = ByteBuffer::new(16, None);
/// buf.append(b"hello world").unwrap();
/// buf.remove_head(6);
/// assert_eq!(buf.as_slice(), b"world");
/// ```
#[derive(Debug)]
pub struct ByteBuffer {
    buf: BytesMut,
    max_capacity: Option<usize>,
}

impl ByteBuffer {
    /// Creates a new buffer.
    ///
    /// # Arguments
    ///
    /// * `initial_capacity` - bytes to preallocate
    /// * `max_capacity` - maximum number of buffered bytes, or `None` for unlimited
    pub fn new(initial_capacity: usize, max_capacity: Option<usize>) -> Self {
        Self {
            buf: BytesMut::with_capacity(initial_capacity),
            max_capacity,
        }
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends data to the tail of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`HalyardError::Protocol`] if the append would exceed the
    /// maximum capacity.
    pub fn append(&mut self, data: &[u8]) -> HalyardResult<()> {
        if let Some(max) = self.max_capacity {
            let required = self.buf.len() + data.len();
            if required > max {
                return Err(HalyardError::Protocol(format!(
                    "buffer size reached limit ({} bytes), required {} bytes",
                    max, required
                )));
            }
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Removes `length` bytes from the head of the buffer.
    ///
    /// Removing more bytes than are buffered empties the buffer.
    pub fn remove_head(&mut self, length: usize) {
        let length = length.min(self.buf.len());
        self.buf.advance(length);
    }

    /// Removes `length` bytes from the tail of the buffer.
    ///
    /// Removing more bytes than are buffered empties the buffer.
    pub fn remove_tail(&mut self, length: usize) {
        let remaining = self.buf.len().saturating_sub(length);
        self.buf.truncate(remaining);
    }

    /// Splits off the first `length` bytes without copying the remainder.
    ///
    /// # Panics
    ///
    /// Panics if `length` exceeds the buffered length; callers check
    /// [`ByteBuffer::len`] first.
    pub fn split_head(&mut self, length: usize) -> BytesMut {
        self.buf.split_to(length)
    }

    /// Borrows the buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Reads a big-endian `u32` at the head without consuming it.
    ///
    /// Returns `None` if fewer than 4 bytes are buffered.
    pub fn peek_u32_be(&self) -> Option<u32> {
        if self.buf.len() < 4 {
            return None;
        }
        Some(u32::from_be_bytes([
            self.buf[0],
            self.buf[1],
            self.buf[2],
            self.buf[3],
        ]))
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
