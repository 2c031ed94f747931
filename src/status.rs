//! Status codes
//!
//! Every operation finishes with exactly one `Status`. Local failures
//! (configuration, connection, framing, authentication) and statuses reported
//! by the remote device share one taxonomy so callers can match on a single type.

use std::fmt;

/// Outcome of a client call or a completed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,

    // -------------------------------------------------------------------------
    // Session / configuration
    // -------------------------------------------------------------------------
    /// Session has no live connection
    SessionEmpty,
    /// Session is in the wrong state for the request
    SessionInvalid,
    HostEmpty,
    AuthKeyEmpty,

    // -------------------------------------------------------------------------
    // Local engine failures
    // -------------------------------------------------------------------------
    ConnectionError,
    Invalid,
    RegistryFull,
    ValueTooLarge,
    BufferOverrun,
    HmacFailure,
    OperationTimedOut,

    // -------------------------------------------------------------------------
    // Remote device statuses (passed through)
    // -------------------------------------------------------------------------
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

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Whether the status originated on the remote device
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            Status::NotAuthorized
                | Status::VersionFailure
                | Status::InternalError
                | Status::HeaderRequired
                | Status::NotFound
                | Status::VersionMismatch
                | Status::ServiceBusy
                | Status::Expired
                | Status::DataError
                | Status::PermDataError
                | Status::RemoteConnectionError
                | Status::NoSpace
                | Status::NoSuchHmacAlgorithm
                | Status::InvalidRequest
        )
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::SessionEmpty => "SESSION_EMPTY",
            Status::SessionInvalid => "SESSION_INVALID",
            Status::HostEmpty => "HOST_EMPTY",
            Status::AuthKeyEmpty => "AUTH_KEY_EMPTY",
            Status::ConnectionError => "CONNECTION_ERROR",
            Status::Invalid => "INVALID",
            Status::RegistryFull => "REGISTRY_FULL",
            Status::ValueTooLarge => "VALUE_TOO_LARGE",
            Status::BufferOverrun => "BUFFER_OVERRUN",
            Status::HmacFailure => "HMAC_FAILURE",
            Status::OperationTimedOut => "OPERATION_TIMED_OUT",
            Status::NotAuthorized => "NOT_AUTHORIZED",
            Status::VersionFailure => "VERSION_FAILURE",
            Status::InternalError => "INTERNAL_ERROR",
            Status::HeaderRequired => "HEADER_REQUIRED",
            Status::NotFound => "NOT_FOUND",
            Status::VersionMismatch => "VERSION_MISMATCH",
            Status::ServiceBusy => "SERVICE_BUSY",
            Status::Expired => "EXPIRED",
            Status::DataError => "DATA_ERROR",
            Status::PermDataError => "PERM_DATA_ERROR",
            Status::RemoteConnectionError => "REMOTE_CONNECTION_ERROR",
            Status::NoSpace => "NO_SPACE",
            Status::NoSuchHmacAlgorithm => "NO_SUCH_HMAC_ALGORITHM",
            Status::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
