//! Command message definitions
//!
//! The structured part of a frame. Outside the fields the engine needs
//! (sequence numbers, message type, key-value metadata, status, HMAC) the
//! message is opaque and is encoded with bincode.
//!
//! ```text
//! Message (envelope)
//! ├── identity
//! ├── hmac              ── digest over frame header + command bytes
//! └── command (bytes)   ── serialized Command
//!       ├── header      ── cluster version, connection id, sequence, ack, type
//!       ├── body        ── key-value metadata or key range
//!       └── status      ── remote status code (responses only)
//! ```

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::entry::{Algorithm, Entry, KeyRange, Synchronization};
use crate::error::{FrameError, Result};
use crate::status::Status;

use super::codec::MAX_MESSAGE_LEN;

/// Encoding shared by every serialized message section
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_big_endian()
        .with_limit(MAX_MESSAGE_LEN as u64)
}

// =============================================================================
// Message Types
// =============================================================================

/// Kind of command carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Get,
    GetResponse,
    Put,
    PutResponse,
    Delete,
    DeleteResponse,
    NoOp,
    NoOpResponse,
    GetKeyRange,
    GetKeyRangeResponse,
}

impl MessageType {
    /// The message type a device answers a request with
    pub fn response(self) -> MessageType {
        match self {
            MessageType::Get | MessageType::GetResponse => MessageType::GetResponse,
            MessageType::Put | MessageType::PutResponse => MessageType::PutResponse,
            MessageType::Delete | MessageType::DeleteResponse => MessageType::DeleteResponse,
            MessageType::NoOp | MessageType::NoOpResponse => MessageType::NoOpResponse,
            MessageType::GetKeyRange | MessageType::GetKeyRangeResponse => {
                MessageType::GetKeyRangeResponse
            }
        }
    }
}

// =============================================================================
// Command Sections
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHeader {
    pub cluster_version: i64,
    pub connection_id: i64,
    pub sequence: i64,

    /// Sequence of the request this frame answers (responses only)
    pub ack_sequence: Option<i64>,

    pub message_type: Option<MessageType>,
}

/// Key-value metadata; only fields the caller actually set are present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Option<Vec<u8>>,
    pub new_version: Option<Vec<u8>>,
    pub db_version: Option<Vec<u8>>,
    pub tag: Option<Vec<u8>>,
    pub algorithm: Option<Algorithm>,
    pub metadata_only: Option<bool>,
    pub force: Option<bool>,
    pub synchronization: Option<Synchronization>,
}

fn non_empty(bytes: &[u8]) -> Option<Vec<u8>> {
    if bytes.is_empty() {
        None
    } else {
        Some(bytes.to_vec())
    }
}

fn flag(set: bool) -> Option<bool> {
    if set {
        Some(true)
    } else {
        None
    }
}

impl KeyValue {
    /// Copy the metadata an entry sets
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            key: non_empty(entry.key.as_slice()),
            new_version: non_empty(entry.new_version.as_slice()),
            db_version: non_empty(entry.db_version.as_slice()),
            tag: non_empty(entry.tag.as_slice()),
            algorithm: entry.algorithm,
            metadata_only: flag(entry.metadata_only),
            force: flag(entry.force),
            synchronization: entry.synchronization,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_key: Option<Vec<u8>>,
    pub end_key: Option<Vec<u8>>,
    pub start_key_inclusive: Option<bool>,
    pub end_key_inclusive: Option<bool>,
    pub max_returned: Option<u32>,
    pub reverse: Option<bool>,

    /// Keys returned by the device
    pub keys: Vec<Vec<u8>>,
}

impl Range {
    pub fn from_key_range(range: &KeyRange) -> Self {
        Self {
            start_key: non_empty(range.start_key.as_slice()),
            end_key: non_empty(range.end_key.as_slice()),
            start_key_inclusive: flag(range.start_key_inclusive),
            end_key_inclusive: flag(range.end_key_inclusive),
            max_returned: Some(range.max_returned),
            reverse: flag(range.reverse),
            keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub key_value: Option<KeyValue>,
    pub range: Option<Range>,
}

/// Status codes as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    HmacFailure,
    NotAuthorized,
    VersionFailure,
    InternalError,
    HeaderRequired,
    NotFound,
    VersionMismatch,
    ServiceBusy,
    Expired,
    DataError,
    PermDataError,
    RemoteConnectionError,
    NoSpace,
    NoSuchHmacAlgorithm,
    InvalidRequest,
}

impl StatusCode {
    pub fn to_status(self) -> Status {
        match self {
            StatusCode::Success => Status::Success,
            StatusCode::HmacFailure => Status::HmacFailure,
            StatusCode::NotAuthorized => Status::NotAuthorized,
            StatusCode::VersionFailure => Status::VersionFailure,
            StatusCode::InternalError => Status::InternalError,
            StatusCode::HeaderRequired => Status::HeaderRequired,
            StatusCode::NotFound => Status::NotFound,
            StatusCode::VersionMismatch => Status::VersionMismatch,
            StatusCode::ServiceBusy => Status::ServiceBusy,
            StatusCode::Expired => Status::Expired,
            StatusCode::DataError => Status::DataError,
            StatusCode::PermDataError => Status::PermDataError,
            StatusCode::RemoteConnectionError => Status::RemoteConnectionError,
            StatusCode::NoSpace => Status::NoSpace,
            StatusCode::NoSuchHmacAlgorithm => Status::NoSuchHmacAlgorithm,
            StatusCode::InvalidRequest => Status::InvalidRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub code: StatusCode,
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(code: StatusCode) -> Self {
        Self { code, message: None }
    }
}

// =============================================================================
// Command + Envelope
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub header: Option<CommandHeader>,
    pub body: Option<Body>,
    pub status: Option<StatusReport>,
}

impl Command {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(wire_options().serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, FrameError> {
        wire_options()
            .deserialize(bytes)
            .map_err(|e| FrameError::Malformed(format!("command: {}", e)))
    }

    pub fn key_value(&self) -> Option<&KeyValue> {
        self.body.as_ref().and_then(|b| b.key_value.as_ref())
    }

    pub fn range(&self) -> Option<&Range> {
        self.body.as_ref().and_then(|b| b.range.as_ref())
    }
}

/// Authenticated envelope around the serialized command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub identity: i64,
    pub hmac: Option<Vec<u8>>,
    pub command: Vec<u8>,
}

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(wire_options().serialize(self)?)
    }

    pub fn encoded_len(&self) -> Result<usize> {
        Ok(wire_options().serialized_size(self)? as usize)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, FrameError> {
        wire_options()
            .deserialize(bytes)
            .map_err(|e| FrameError::Malformed(format!("message: {}", e)))
    }
}
