//! Protocol codec
//!
//! Packing and unpacking of frames (PDUs).
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────────┬──────────────┬───────────────────┬─────────────────┐
//! │ Ver (1)  │ MsgLen (4)   │ ValueLen (4) │ Message (MsgLen)  │ Value (ValueLen)│
//! └──────────┴──────────────┴──────────────┴───────────────────┴─────────────────┘
//! ```
//! All integers are big-endian. The version byte is always `'F'`.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{FrameError, Result};

use super::auth::{self, DIGEST_LEN};
use super::message::{Command, Message, MessageType};

/// Header size: version (1) + message length (4) + value length (4)
pub const HEADER_SIZE: usize = 9;

/// Protocol version / magic byte
pub const PROTOCOL_VERSION: u8 = b'F';

/// Maximum serialized message size (1 MB)
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Maximum value size (1 MB)
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

// =============================================================================
// Header
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub message_len: u32,
    pub value_len: u32,
}

impl FrameHeader {
    pub fn new(message_len: u32, value_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_len,
            value_len,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1..5].copy_from_slice(&self.message_len.to_be_bytes());
        bytes[5..9].copy_from_slice(&self.value_len.to_be_bytes());
        bytes
    }

    /// Parse and bound-check a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::IncompleteHeader {
                expected: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(FrameError::BadVersion(version));
        }

        let message_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let value_len = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        if message_len as usize > MAX_MESSAGE_LEN {
            return Err(FrameError::MessageTooLarge {
                len: message_len as usize,
                max: MAX_MESSAGE_LEN,
            });
        }
        if value_len as usize > MAX_VALUE_LEN {
            return Err(FrameError::ValueTooLarge {
                len: value_len as usize,
                max: MAX_VALUE_LEN,
            });
        }

        Ok(Self {
            version,
            message_len,
            value_len,
        })
    }

    /// Total bytes of the frame this header introduces
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.message_len as usize + self.value_len as usize
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One complete protocol unit
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub message: Message,

    /// Decoded form of `message.command`
    pub command: Command,

    pub value: Bytes,
}

impl Frame {
    /// Build a frame and sign it with `key`
    pub fn seal(command: Command, value: Bytes, identity: i64, key: &[u8]) -> Result<Self> {
        if value.len() > MAX_VALUE_LEN {
            return Err(FrameError::ValueTooLarge {
                len: value.len(),
                max: MAX_VALUE_LEN,
            }
            .into());
        }

        // The digest has a fixed length, so the message length is known before signing
        let mut message = Message {
            identity,
            hmac: Some(vec![0u8; DIGEST_LEN]),
            command: command.encode()?,
        };
        let message_len = message.encoded_len()?;
        if message_len > MAX_MESSAGE_LEN {
            return Err(FrameError::MessageTooLarge {
                len: message_len,
                max: MAX_MESSAGE_LEN,
            }
            .into());
        }

        let header = FrameHeader::new(message_len as u32, value.len() as u32);
        let digest = auth::sign(&header.to_bytes(), identity, &message.command, key)?;
        message.hmac = Some(digest.to_vec());

        Ok(Self {
            header,
            message,
            command,
            value,
        })
    }

    pub fn sequence(&self) -> Option<i64> {
        self.command.header.as_ref().map(|h| h.sequence)
    }

    pub fn ack_sequence(&self) -> Option<i64> {
        self.command.header.as_ref().and_then(|h| h.ack_sequence)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.command.header.as_ref().and_then(|h| h.message_type)
    }

    pub fn connection_id(&self) -> Option<i64> {
        self.command.header.as_ref().map(|h| h.connection_id)
    }
}

// =============================================================================
// Pack / Unpack
// =============================================================================

/// Serialize a frame: header ‖ message ‖ value
pub fn pack(frame: &Frame) -> Result<Vec<u8>> {
    let message = frame.message.encode()?;

    if message.len() != frame.header.message_len as usize {
        return Err(FrameError::LengthMismatch {
            declared: frame.header.message_len as usize,
            available: message.len(),
        }
        .into());
    }
    if frame.value.len() != frame.header.value_len as usize {
        return Err(FrameError::LengthMismatch {
            declared: frame.header.value_len as usize,
            available: frame.value.len(),
        }
        .into());
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + message.len() + frame.value.len());
    bytes.extend_from_slice(&frame.header.to_bytes());
    bytes.extend_from_slice(&message);
    bytes.extend_from_slice(&frame.value);

    Ok(bytes)
}

/// Deserialize exactly one frame from `bytes`
pub fn unpack(bytes: &[u8]) -> std::result::Result<Frame, FrameError> {
    decode_frame(Bytes::copy_from_slice(bytes))
}

fn decode_frame(bytes: Bytes) -> std::result::Result<Frame, FrameError> {
    let header = FrameHeader::parse(&bytes)?;

    let total_len = header.frame_len();
    if bytes.len() != total_len {
        return Err(FrameError::LengthMismatch {
            declared: total_len,
            available: bytes.len(),
        });
    }

    let message_end = HEADER_SIZE + header.message_len as usize;
    let message = Message::decode(&bytes[HEADER_SIZE..message_end])?;
    if message.hmac.is_none() {
        return Err(FrameError::MissingField("hmac"));
    }

    let command = Command::decode(&message.command)?;
    if command.header.is_none() {
        return Err(FrameError::MissingField("header"));
    }

    Ok(Frame {
        header,
        message,
        command,
        value: bytes.slice(message_end..),
    })
}

// =============================================================================
// Partial-read assembly
// =============================================================================

/// Accumulates bytes read off the socket until whole frames are available
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,

    /// Bytes of a rejected oversized frame still to be discarded
    skip: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        let skipped = self.skip.min(bytes.len());
        self.skip -= skipped;
        self.buf.extend_from_slice(&bytes[skipped..]);
    }

    /// Bytes buffered but not yet consumed as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes of an oversized frame that will be dropped as they arrive
    pub fn skipping(&self) -> usize {
        self.skip
    }

    /// Whether a whole frame (valid or not) is buffered
    pub fn has_frame(&self) -> bool {
        match FrameHeader::parse(&self.buf) {
            Ok(header) => self.buf.len() >= header.frame_len(),
            Err(FrameError::IncompleteHeader { .. }) => false,
            Err(_) => true,
        }
    }

    /// Take the next complete frame
    ///
    /// Returns `Ok(None)` while the frame is still partial. An oversized frame
    /// is skipped without being buffered and a bad body drops only that frame.
    /// A bad version byte leaves frame boundaries unknowable, so everything
    /// buffered is dropped.
    pub fn next_frame(&mut self) -> std::result::Result<Option<Frame>, FrameError> {
        let header = match FrameHeader::parse(&self.buf) {
            Ok(header) => header,
            Err(FrameError::IncompleteHeader { .. }) => return Ok(None),
            Err(e @ (FrameError::MessageTooLarge { .. } | FrameError::ValueTooLarge { .. })) => {
                self.discard(declared_len(&self.buf));
                return Err(e);
            }
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };

        let total_len = header.frame_len();
        if self.buf.len() < total_len {
            self.buf.reserve(total_len - self.buf.len());
            return Ok(None);
        }

        let bytes = self.buf.split_to(total_len).freeze();
        decode_frame(bytes).map(Some)
    }

    /// Drop `len` bytes now, or as they arrive
    fn discard(&mut self, len: usize) {
        let available = len.min(self.buf.len());
        let _ = self.buf.split_to(available);
        self.skip = len - available;
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.skip = 0;
    }
}

/// Frame length declared by a version-checked header, ignoring the size caps
fn declared_len(header: &[u8]) -> usize {
    let message_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    let value_len = u32::from_be_bytes([header[5], header[6], header[7], header[8]]);
    HEADER_SIZE + message_len as usize + value_len as usize
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a blocking stream
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;
    let header = FrameHeader::parse(&header_bytes)?;

    let mut bytes = BytesMut::zeroed(header.frame_len());
    bytes[..HEADER_SIZE].copy_from_slice(&header_bytes);
    reader.read_exact(&mut bytes[HEADER_SIZE..])?;

    Ok(decode_frame(bytes.freeze())?)
}

/// Write a frame to a stream, retrying partial writes until done
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = pack(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
