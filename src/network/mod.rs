//! Network Module
//!
//! Connection to a device and the dispatcher built on it.
//!
//! ## Architecture
//! - One TCP connection per session
//! - Any thread may submit; one thread at a time runs the read side
//! - Registry correlates responses to pending operations by sequence number
//! - Optional worker thread drives `run` in threaded mode

mod connection;
mod registry;
mod worker;

pub use connection::{Connection, ConnectionState};
pub use registry::{OperationRegistry, Rejected};
pub use worker::Worker;
