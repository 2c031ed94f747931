//! # kinetic-client
//!
//! Client engine for Kinetic key-value drives:
//! - Framed binary protocol with HMAC-SHA1 authenticated messages
//! - Many concurrent operations multiplexed over one TCP connection
//! - Out-of-order responses matched to pending operations by sequence number
//! - Internally-threaded or caller-driven completion dispatch
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Session  /  Operation API                    │
//! │          (NoOp, Put, Get, Delete, GetKeyRange)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ submit
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      Connection                              │
//! │   sequence counter · registry · run state · worker           │
//! └──────────┬─────────────────────────────────┬────────────────┘
//!            │ write                            │ run (poll + dispatch)
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │  Codec + HMAC   │                │  FrameBuffer    │
//!   │  (seal / pack)  │                │  (unpack/verify)│
//!   └────────┬────────┘                └────────┬────────┘
//!            │                                  │
//!            └───────────── TCP socket ─────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod status;
pub mod config;
pub mod logging;

pub mod buffer;
pub mod entry;
pub mod protocol;
pub mod network;
pub mod operation;
pub mod session;
pub mod transfer;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use buffer::ByteBuffer;
pub use config::{ExecutionMode, SessionConfig};
pub use entry::{Algorithm, Entry, KeyRange, Synchronization};
pub use error::{KineticError, Result};
pub use network::ConnectionState;
pub use operation::{Completion, Operation, OperationResult, SubmitError};
pub use session::Session;
pub use status::Status;
pub use transfer::Transfer;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the client library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
