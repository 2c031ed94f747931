//! Session Module
//!
//! Entry point for callers: owns the configuration, the log sink and (once
//! connected) the live connection and its worker.
//!
//! ## Lifecycle
//! ```text
//!   new ──▶ connect ──▶ new_operation / run ──▶ disconnect
//!             │                                    │
//!             ├─ validate config (no I/O on error) ├─ fail every pending op
//!             ├─ TCP connect (+ handshake)         ├─ shut the socket
//!             └─ spawn worker (threaded mode)      └─ stop the worker
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{ExecutionMode, SessionConfig};
use crate::error::{KineticError, Result};
use crate::logging::{LogSink, Logger};
use crate::network::{Connection, ConnectionState, Worker};
use crate::operation::Operation;

/// State that exists only while connected
struct Live {
    connection: Arc<Connection>,
    worker: Option<Worker>,
}

impl Live {
    fn shutdown(mut self) -> usize {
        let failed = self.connection.close();
        if let Some(worker) = self.worker.as_mut() {
            worker.stop();
        }
        failed
    }
}

/// A configured client session for one device
pub struct Session {
    config: SessionConfig,
    log: Logger,
    live: Mutex<Option<Live>>,
}

impl Session {
    /// Create a session that logs through `tracing`
    pub fn new(config: SessionConfig) -> Self {
        Self::with_logger(config, Logger::tracing())
    }

    /// Create a session that logs through `sink`
    pub fn with_sink(config: SessionConfig, sink: Arc<dyn LogSink>) -> Self {
        Self::with_logger(config, Logger::new(sink))
    }

    fn with_logger(config: SessionConfig, log: Logger) -> Self {
        Self {
            config,
            log,
            live: Mutex::new(None),
        }
    }

    // =========================================================================
    // Connect / Disconnect
    // =========================================================================

    /// Validate the configuration and connect to the device
    ///
    /// A configuration error is returned before any socket is opened. The
    /// session lock is not held while connecting, so `state`, `pending` and
    /// `run` stay responsive on other threads.
    pub fn connect(&self) -> Result<()> {
        self.config.validate()?;

        let stale = {
            let mut live = self.live.lock();
            if let Some(existing) = live.as_ref() {
                if existing.connection.state() == ConnectionState::Connected {
                    return Err(already_connected());
                }
            }
            live.take()
        };
        // A previous connection that failed is torn down before reconnecting
        if let Some(stale) = stale {
            stale.shutdown();
        }

        let connection = Arc::new(Connection::open(&self.config, self.log.clone())?);

        let worker = match self.config.execution_mode {
            ExecutionMode::Threaded => {
                match Worker::spawn(Arc::clone(&connection), self.log.clone()) {
                    Ok(worker) => Some(worker),
                    Err(e) => {
                        connection.close();
                        return Err(e);
                    }
                }
            }
            ExecutionMode::CallerDriven => None,
        };
        let fresh = Live { connection, worker };

        let mut live = self.live.lock();
        if live.is_some() {
            // Another thread connected first
            drop(live);
            fresh.shutdown();
            return Err(already_connected());
        }
        *live = Some(fresh);
        Ok(())
    }

    /// Fail every pending operation and close the connection
    ///
    /// Returns how many pending operations were failed.
    pub fn disconnect(&self) -> Result<usize> {
        // Taken out of the lock first; completions fired below may use the session
        let live = self
            .live
            .lock()
            .take()
            .ok_or_else(|| KineticError::SessionInvalid("session is not connected".to_string()))?;

        Ok(live.shutdown())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Handle for issuing operations on the current connection
    pub fn new_operation(&self) -> Result<Operation> {
        Ok(Operation::new(self.connection()?))
    }

    /// One bounded dispatch step on the current connection
    ///
    /// Required in caller-driven mode; returns the number of completions run.
    pub fn run(&self) -> Result<usize> {
        self.connection()?.run()
    }

    fn connection(&self) -> Result<Arc<Connection>> {
        self.live
            .lock()
            .as_ref()
            .map(|live| Arc::clone(&live.connection))
            .ok_or(KineticError::SessionEmpty)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.live
            .lock()
            .as_ref()
            .map(|live| live.connection.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Operations awaiting a response
    pub fn pending(&self) -> usize {
        self.live
            .lock()
            .as_ref()
            .map(|live| live.connection.pending())
            .unwrap_or(0)
    }

    pub fn connection_id(&self) -> Option<i64> {
        self.live
            .lock()
            .as_ref()
            .map(|live| live.connection.connection_id())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }
}

fn already_connected() -> KineticError {
    KineticError::SessionInvalid("session is already connected".to_string())
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(live) = self.live.get_mut().take() {
            live.shutdown();
        }
    }
}
