//! Connection worker
//!
//! In threaded mode each connection gets one background thread that calls
//! `run` in a loop and executes completions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::Result;
use crate::logging::Logger;

use super::connection::{Connection, ConnectionState};

/// Background driver for one connection
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
    shutdown: Arc<AtomicBool>,
    log: Logger,
}

impl Worker {
    pub fn spawn(connection: Arc<Connection>, log: Logger) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let worker_log = log.clone();

        let handle = thread::Builder::new()
            .name(format!("kinetic-worker-{}", connection.connection_id()))
            .spawn(move || Self::drive(&connection, &flag, &worker_log))?;

        Ok(Self {
            thread_id: handle.thread().id(),
            handle: Some(handle),
            shutdown,
            log,
        })
    }

    fn drive(connection: &Connection, shutdown: &AtomicBool, log: &Logger) {
        log.debug("worker started");

        while !shutdown.load(Ordering::Acquire) {
            if let Err(e) = connection.run() {
                match connection.state() {
                    ConnectionState::Disconnecting | ConnectionState::Disconnected => {}
                    _ => log.error(format_args!("worker stopping: {}", e)),
                }
                break;
            }
        }

        log.debug("worker stopped");
    }

    /// Signal the worker and wait for it to exit
    ///
    /// Called from a completion running on the worker itself, this only signals.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            if thread::current().id() == self.thread_id {
                return;
            }
            if handle.join().is_err() {
                self.log.error("worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}
