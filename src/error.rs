//! Error types for the Kinetic client
//!
//! Provides a unified error type for all operations. Every variant maps onto
//! a [`Status`] via [`KineticError::status`].

use thiserror::Error;

use crate::status::Status;

/// Result type alias using KineticError
pub type Result<T> = std::result::Result<T, KineticError>;

/// Unified error type for client operations
#[derive(Debug, Error)]
pub enum KineticError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors (caught before any I/O)
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session has no connection")]
    SessionEmpty,

    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    // -------------------------------------------------------------------------
    // Connection Errors (terminal for the connection)
    // -------------------------------------------------------------------------
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    // -------------------------------------------------------------------------
    // Frame / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Buffer overrun: need {needed} bytes, {available} available")]
    BufferOverrun { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Operation Errors
    // -------------------------------------------------------------------------
    #[error("Submission rejected: {0}")]
    Submission(Status),

    #[error("HMAC verification failed")]
    Authentication,

    #[error("Device reported {0}")]
    Remote(Status),

    #[error("Operation failed: {0}")]
    Operation(Status),
}

impl KineticError {
    /// The status this error reports to callers
    pub fn status(&self) -> Status {
        match self {
            KineticError::Io(_) => Status::ConnectionError,
            KineticError::Config(e) => e.status(),
            KineticError::SessionEmpty => Status::SessionEmpty,
            KineticError::SessionInvalid(_) => Status::SessionInvalid,
            KineticError::ConnectionClosed => Status::ConnectionError,
            KineticError::Connection(_) => Status::ConnectionError,
            KineticError::Frame(_) => Status::Invalid,
            KineticError::Serialization(_) => Status::Invalid,
            KineticError::BufferOverrun { .. } => Status::BufferOverrun,
            KineticError::Submission(s) => *s,
            KineticError::Authentication => Status::HmacFailure,
            KineticError::Remote(s) => *s,
            KineticError::Operation(s) => *s,
        }
    }

    /// Build the error reported for a non-success completion status
    pub fn from_status(status: Status) -> Self {
        match status {
            Status::ConnectionError => KineticError::ConnectionClosed,
            Status::HmacFailure => KineticError::Authentication,
            Status::SessionEmpty => KineticError::SessionEmpty,
            s if s.is_remote() => KineticError::Remote(s),
            s => KineticError::Operation(s),
        }
    }
}

impl From<bincode::Error> for KineticError {
    fn from(e: bincode::Error) -> Self {
        KineticError::Serialization(e.to_string())
    }
}

/// Session configuration problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("host is empty")]
    HostEmpty,

    #[error("HMAC key is empty")]
    AuthKeyEmpty,

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("pending operation capacity must be non-zero")]
    ZeroCapacity,
}

impl ConfigError {
    pub fn status(&self) -> Status {
        match self {
            ConfigError::HostEmpty => Status::HostEmpty,
            ConfigError::AuthKeyEmpty => Status::AuthKeyEmpty,
            _ => Status::SessionInvalid,
        }
    }
}

/// Malformed or oversized frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("incomplete header: expected {expected} bytes, got {available}")]
    IncompleteHeader { expected: usize, available: usize },

    #[error("unknown protocol version byte: 0x{0:02x}")]
    BadVersion(u8),

    #[error("message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },

    #[error("length mismatch: header declares {declared} bytes, {available} available")]
    LengthMismatch { declared: usize, available: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing mandatory field: {0}")]
    MissingField(&'static str),
}
