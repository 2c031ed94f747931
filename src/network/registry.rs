//! Operation Registry
//!
//! Tracks operations awaiting a response, keyed by request sequence number.
//!
//! ## Concurrency:
//! - One mutex guards both the pending map and the open flag, so an insert
//!   can never slip in after `close()` has drained the map
//! - Completions are never invoked while the lock is held; callers get the
//!   operation back and complete it themselves

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::KineticError;
use crate::operation::PendingOperation;
use crate::status::Status;

/// An insert that was refused; the operation is handed back uncompleted
#[derive(Debug)]
pub struct Rejected {
    pub error: KineticError,
    pub operation: PendingOperation,
}

struct Inner {
    open: bool,
    pending: HashMap<i64, PendingOperation>,
}

/// Map of sequence number → pending operation
pub struct OperationRegistry {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl OperationRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                open: true,
                pending: HashMap::with_capacity(capacity.min(1024)),
            }),
            capacity,
        }
    }

    /// Register an operation under its assigned sequence number
    pub fn insert(&self, operation: PendingOperation) -> Result<(), Rejected> {
        let mut inner = self.inner.lock();

        if !inner.open {
            return Err(Rejected {
                error: KineticError::ConnectionClosed,
                operation,
            });
        }
        if inner.pending.len() >= self.capacity {
            return Err(Rejected {
                error: KineticError::Submission(Status::RegistryFull),
                operation,
            });
        }
        if inner.pending.contains_key(&operation.sequence()) {
            return Err(Rejected {
                error: KineticError::Submission(Status::Invalid),
                operation,
            });
        }

        inner.pending.insert(operation.sequence(), operation);
        Ok(())
    }

    /// Remove and return the operation for `sequence`, if still pending
    pub fn take(&self, sequence: i64) -> Option<PendingOperation> {
        self.inner.lock().pending.remove(&sequence)
    }

    pub fn contains(&self, sequence: i64) -> bool {
        self.inner.lock().pending.contains_key(&sequence)
    }

    /// Refuse further inserts and hand back everything still pending
    pub fn close(&self) -> Vec<PendingOperation> {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.pending.drain().map(|(_, op)| op).collect()
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// Remove operations submitted more than `timeout` before `now`
    pub fn expire(&self, timeout: Duration, now: Instant) -> Vec<PendingOperation> {
        let mut inner = self.inner.lock();
        let overdue: Vec<i64> = inner
            .pending
            .iter()
            .filter(|(_, op)| now.saturating_duration_since(op.submitted_at()) >= timeout)
            .map(|(seq, _)| *seq)
            .collect();

        overdue
            .into_iter()
            .filter_map(|seq| inner.pending.remove(&seq))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
