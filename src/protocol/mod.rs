//! Protocol Module
//!
//! Defines the wire protocol spoken with a Kinetic device.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────────┬──────────────┬─────────────────────┬───────────────┐
//! │ 'F' (1)  │ MsgLen (4)   │ ValueLen (4) │ Message             │ Value         │
//! └──────────┴──────────────┴──────────────┴─────────────────────┴───────────────┘
//! ```
//!
//! ### Message
//! - identity: which user key signed the frame
//! - hmac: HMAC-SHA1 over header + command bytes
//! - command: header (sequence / ack sequence / type), body, status
//!
//! ### Correlation
//! Every request carries a fresh sequence number; the device echoes it back
//! as the response's ack sequence.

mod auth;
mod codec;
mod message;

pub use auth::{sign, verify, verify_digest, Digest, DIGEST_LEN};
pub use codec::{
    pack, read_frame, unpack, write_frame, Frame, FrameBuffer, FrameHeader, HEADER_SIZE,
    MAX_MESSAGE_LEN, MAX_VALUE_LEN, PROTOCOL_VERSION,
};
pub use message::{
    Body, Command, CommandHeader, KeyValue, Message, MessageType, Range, StatusCode, StatusReport,
};
