//! Entry definitions
//!
//! Caller-owned descriptions of key-value records and key ranges. Request
//! construction reads them; only the completion of an operation writes back
//! into an entry (value, versions, tag).

use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::buffer::ByteBuffer;

/// Largest key accepted by the device
pub const MAX_KEY_LEN: usize = 4096;

/// Largest tag / version accepted by the device
pub const MAX_METADATA_LEN: usize = 1024;

/// Algorithm the caller used to compute an entry's tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Sha1,
    Sha2,
    Sha3,
    Crc32,
    Crc64,
}

impl Algorithm {
    /// Compute a tag for `value`, when the algorithm is available locally
    ///
    /// SHA3 and CRC64 tags must be supplied by the caller.
    pub fn compute_tag(self, value: &[u8]) -> Option<Vec<u8>> {
        match self {
            Algorithm::Sha1 => Some(sha1::Sha1::digest(value).to_vec()),
            Algorithm::Sha2 => Some(sha2::Sha256::digest(value).to_vec()),
            Algorithm::Crc32 => Some(crc32fast::hash(value).to_be_bytes().to_vec()),
            Algorithm::Sha3 | Algorithm::Crc64 => None,
        }
    }
}

/// When the device acknowledges a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Synchronization {
    /// Acknowledge once persisted
    WriteThrough,
    /// Acknowledge once accepted; persist later
    WriteBack,
    /// Persist everything written so far
    Flush,
}

/// A key-value record as seen by the caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub key: ByteBuffer,

    /// Version to assign on Put
    pub new_version: ByteBuffer,

    /// Version currently stored on the device
    pub db_version: ByteBuffer,

    pub tag: ByteBuffer,
    pub algorithm: Option<Algorithm>,
    pub synchronization: Option<Synchronization>,

    /// Ignore version checks on the device
    pub force: bool,

    /// Get metadata without the value
    pub metadata_only: bool,

    /// Value to write, or buffer to receive a value into. `None` on Get
    /// means the engine allocates a buffer of the max value size.
    pub value: Option<ByteBuffer>,
}

impl Entry {
    pub fn new(key: impl Into<ByteBuffer>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<ByteBuffer>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<ByteBuffer>, algorithm: Algorithm) -> Self {
        self.tag = tag.into();
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_new_version(mut self, version: impl Into<ByteBuffer>) -> Self {
        self.new_version = version.into();
        self
    }

    pub fn with_db_version(mut self, version: impl Into<ByteBuffer>) -> Self {
        self.db_version = version.into();
        self
    }

    pub fn with_synchronization(mut self, sync: Synchronization) -> Self {
        self.synchronization = Some(sync);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn metadata_only(mut self, metadata_only: bool) -> Self {
        self.metadata_only = metadata_only;
        self
    }

    /// Bytes of value held (0 when no buffer)
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_ref().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Bounds for a key-range listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyRange {
    pub start_key: ByteBuffer,
    pub end_key: ByteBuffer,
    pub start_key_inclusive: bool,
    pub end_key_inclusive: bool,
    pub max_returned: u32,
    pub reverse: bool,
}

impl KeyRange {
    /// Inclusive range `[start, end]` returning at most `max_returned` keys
    pub fn new(start: impl Into<ByteBuffer>, end: impl Into<ByteBuffer>, max_returned: u32) -> Self {
        Self {
            start_key: start.into(),
            end_key: end.into(),
            start_key_inclusive: true,
            end_key_inclusive: true,
            max_returned,
            reverse: false,
        }
    }
}
