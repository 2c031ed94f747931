//! Transfer tracking
//!
//! Aggregates many asynchronous sub-operations (typically the chunk Puts of
//! one file) into a single outcome. The first non-success status observed is
//! kept even when later sub-operations fail too.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::config::ExecutionMode;
use crate::entry::{Algorithm, Entry, Synchronization};
use crate::operation::{Completion, Operation};
use crate::protocol::MAX_VALUE_LEN;
use crate::session::Session;
use crate::status::Status;

/// Size of each chunk written by [`Transfer::put_chunks`]
pub const CHUNK_SIZE: usize = MAX_VALUE_LEN;

/// Key prefix shared by every chunk of a transfer started at `unix_secs`
///
/// The low 32 bits are left for the chunk index.
pub fn key_prefix(unix_secs: u64) -> u64 {
    unix_secs << 32
}

/// Big-endian key of chunk `chunk` under `prefix`
pub fn chunk_key(prefix: u64, chunk: u32) -> [u8; 8] {
    prefix.wrapping_add(chunk as u64).to_be_bytes()
}

#[derive(Debug)]
struct Progress {
    in_progress: usize,
    status: Status,
}

#[derive(Debug)]
struct Shared {
    progress: Mutex<Progress>,
    done: Condvar,
}

/// First-error-wins tracker for a group of async operations
#[derive(Debug, Clone)]
pub struct Transfer {
    shared: Arc<Shared>,
}

impl Default for Transfer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transfer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                progress: Mutex::new(Progress {
                    in_progress: 0,
                    status: Status::Success,
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// A completion counted against this transfer
    ///
    /// If the submission it is handed to fails, report that with
    /// [`record_failure`](Self::record_failure).
    pub fn completion(&self) -> Completion {
        self.shared.progress.lock().in_progress += 1;

        let shared = Arc::clone(&self.shared);
        Completion::callback(move |result| shared.finish(result.status))
    }

    /// Account for a completion whose submission was rejected
    pub fn record_failure(&self, status: Status) {
        self.shared.finish(status);
    }

    pub fn in_progress(&self) -> usize {
        self.shared.progress.lock().in_progress
    }

    /// First non-success status seen, or `Success`
    pub fn status(&self) -> Status {
        self.shared.progress.lock().status
    }

    pub fn is_complete(&self) -> bool {
        self.in_progress() == 0
    }

    /// Block until every counted operation has completed
    ///
    /// In caller-driven mode this drives `session.run()` itself.
    pub fn wait(&self, session: &Session) -> Status {
        match session.config().execution_mode {
            ExecutionMode::Threaded => {
                let mut progress = self.shared.progress.lock();
                while progress.in_progress > 0 {
                    self.shared.done.wait(&mut progress);
                }
            }
            ExecutionMode::CallerDriven => {
                while !self.is_complete() {
                    // A failed run has already completed everything pending
                    if session.run().is_err() {
                        break;
                    }
                }
            }
        }
        self.status()
    }

    /// Split `data` into `CHUNK_SIZE` Puts keyed by [`chunk_key`]
    ///
    /// Returns how many chunks were submitted; rejected chunks are recorded
    /// as failures of this transfer.
    pub fn put_chunks(&self, operation: &Operation, data: &[u8], prefix: u64) -> usize {
        let mut submitted = 0;

        for (index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            let index = index as u32;
            let tag = Algorithm::Sha1.compute_tag(chunk).unwrap_or_default();

            let entry = Entry::new(&chunk_key(prefix, index))
                .with_value(chunk)
                .with_tag(tag, Algorithm::Sha1)
                .with_synchronization(Synchronization::WriteThrough);

            match operation.put_async(entry, self.completion()) {
                Ok(_) => submitted += 1,
                Err(e) => {
                    operation.connection().logger().warn(format_args!(
                        "chunk {} rejected: {}",
                        index, e
                    ));
                    self.record_failure(e.status());
                }
            }
        }

        submitted
    }
}

impl Shared {
    fn finish(&self, status: Status) {
        let mut progress = self.progress.lock();
        progress.in_progress = progress.in_progress.saturating_sub(1);
        if progress.status.is_success() {
            progress.status = status;
        }
        if progress.in_progress == 0 {
            self.done.notify_all();
        }
    }
}
