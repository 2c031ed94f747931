//! Byte buffer primitive
//!
//! A fixed-capacity, append-only view over byte storage. Keys, tags, versions
//! and values are all carried in `ByteBuffer`s so a caller can hand the
//! engine a buffer of known size and read back how much of it was filled.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{KineticError, Result};

/// Fixed-capacity append-only byte buffer
#[derive(Clone, Default)]
pub struct ByteBuffer {
    data: BytesMut,
    capacity: usize,
}

impl ByteBuffer {
    /// Create an empty buffer able to hold `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a buffer holding exactly `bytes`, with no spare room
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            capacity: bytes.len(),
        }
    }

    /// Create a buffer holding `bytes` with room to grow up to `capacity`
    pub fn with_contents(bytes: &[u8], capacity: usize) -> Result<Self> {
        let mut buffer = Self::with_capacity(capacity);
        buffer.append(bytes)?;
        Ok(buffer)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes used
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copy of the used bytes as an immutable `Bytes`
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    /// Append `bytes`; nothing is written if they do not fit
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(KineticError::BufferOverrun {
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn append_str(&mut self, s: &str) -> Result<()> {
        self.append(s.as_bytes())
    }

    /// Append formatted text, e.g. `buf.append_fmt(format_args!("tag_{:04}", n))`
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        let text = fmt::format(args);
        self.append(text.as_bytes())
    }

    /// Replace the contents with `bytes` (cleared even when they do not fit)
    pub fn fill_from(&mut self, bytes: &[u8]) -> Result<()> {
        self.reset();
        self.append(bytes)
    }

    /// Mark the buffer empty; capacity is unchanged
    pub fn reset(&mut self) {
        self.data.clear();
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteBuffer {}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("data", &String::from_utf8_lossy(&self.data))
            .finish()
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for ByteBuffer {
    fn from(bytes: &[u8; N]) -> Self {
        Self::from_slice(bytes)
    }
}

impl From<&str> for ByteBuffer {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        let capacity = bytes.len();
        Self {
            data: BytesMut::from(&bytes[..]),
            capacity,
        }
    }
}
