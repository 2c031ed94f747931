//! Client operations
//!
//! Builds requests from caller-owned entries, submits them through a
//! connection and applies responses back onto the entries.
//!
//! ## Lifecycle
//! ```text
//!   Operation::put_async(entry, completion)
//!        │  validate (no I/O on failure)
//!        ▼
//!   PendingOperation ──submit──▶ registry[seq]
//!        │                           │ run: response with ack == seq
//!        ▼                           ▼
//!   complete(status, frame) ──▶ Completion::{Callback, Channel}
//! ```
//!
//! A `PendingOperation` owns the entry and the completion until it is
//! completed. Dropping it uncompleted delivers `ConnectionError`, so every
//! completion fires exactly once.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use thiserror::Error;

use crate::buffer::ByteBuffer;
use crate::config::ExecutionMode;
use crate::entry::{Entry, KeyRange, MAX_KEY_LEN, MAX_METADATA_LEN};
use crate::error::{KineticError, Result};
use crate::network::{Connection, Rejected};
use crate::protocol::{Body, Frame, KeyValue, MessageType, Range, MAX_VALUE_LEN};
use crate::status::Status;

// =============================================================================
// Kinds and Requests
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    NoOp,
    Put,
    Get,
    Delete,
    GetKeyRange,
}

impl OperationKind {
    pub fn request_type(self) -> MessageType {
        match self {
            OperationKind::NoOp => MessageType::NoOp,
            OperationKind::Put => MessageType::Put,
            OperationKind::Get => MessageType::Get,
            OperationKind::Delete => MessageType::Delete,
            OperationKind::GetKeyRange => MessageType::GetKeyRange,
        }
    }

    pub fn response_type(self) -> MessageType {
        self.request_type().response()
    }
}

/// What goes on the wire for one operation, minus the header
#[derive(Debug, Clone)]
pub struct Request {
    pub message_type: MessageType,
    pub body: Option<Body>,
    pub value: Bytes,
}

impl Request {
    pub fn noop() -> Self {
        Self {
            message_type: MessageType::NoOp,
            body: None,
            value: Bytes::new(),
        }
    }

    pub fn put(entry: &Entry) -> Self {
        Self {
            message_type: MessageType::Put,
            body: Some(key_value_body(entry)),
            value: entry
                .value
                .as_ref()
                .map(|v| v.to_bytes())
                .unwrap_or_default(),
        }
    }

    pub fn get(entry: &Entry) -> Self {
        Self {
            message_type: MessageType::Get,
            body: Some(key_value_body(entry)),
            value: Bytes::new(),
        }
    }

    pub fn delete(entry: &Entry) -> Self {
        Self {
            message_type: MessageType::Delete,
            body: Some(key_value_body(entry)),
            value: Bytes::new(),
        }
    }

    pub fn key_range(range: &KeyRange) -> Self {
        Self {
            message_type: MessageType::GetKeyRange,
            body: Some(Body {
                key_value: None,
                range: Some(Range::from_key_range(range)),
            }),
            value: Bytes::new(),
        }
    }
}

fn key_value_body(entry: &Entry) -> Body {
    Body {
        key_value: Some(KeyValue::from_entry(entry)),
        range: None,
    }
}

// =============================================================================
// Completion
// =============================================================================

/// Outcome handed to a completion
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub status: Status,
    pub sequence: i64,

    /// The entry given to the operation, updated from the response
    pub entry: Option<Entry>,

    /// Keys returned by GetKeyRange
    pub keys: Vec<Bytes>,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn value_len(&self) -> usize {
        self.entry.as_ref().map(|e| e.value_len()).unwrap_or(0)
    }
}

/// Where an operation's result is delivered
///
/// Completions run on whichever thread dispatched the response (the worker in
/// threaded mode, the `run` caller otherwise). They must not block waiting on
/// another operation of the same session.
pub enum Completion {
    Callback(Box<dyn FnOnce(OperationResult) + Send>),
    Channel(Sender<OperationResult>),
}

impl Completion {
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(OperationResult) + Send + 'static,
    {
        Completion::Callback(Box::new(f))
    }

    pub fn channel(sender: Sender<OperationResult>) -> Self {
        Completion::Channel(sender)
    }

    fn deliver(self, result: OperationResult) {
        match self {
            Completion::Callback(f) => f(result),
            // A dropped receiver means nobody is waiting any more
            Completion::Channel(tx) => {
                let _ = tx.send(result);
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Completion::Callback"),
            Completion::Channel(_) => f.write_str("Completion::Channel"),
        }
    }
}

/// An async submission refused before anything reached the device
///
/// The completion was dropped without firing. `entry` is the entry the call
/// was given, with any caller-owned value buffer intact.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SubmitError {
    pub error: KineticError,
    pub entry: Option<Entry>,
}

impl SubmitError {
    fn new(error: KineticError, entry: Option<Entry>) -> Self {
        Self { error, entry }
    }

    pub fn status(&self) -> Status {
        self.error.status()
    }

    /// Take back the entry handed to the rejected call
    pub fn into_entry(self) -> Option<Entry> {
        self.entry
    }
}

impl From<SubmitError> for KineticError {
    fn from(e: SubmitError) -> Self {
        e.error
    }
}

/// Sequence number of an accepted async submission
pub type SubmitResult = std::result::Result<i64, SubmitError>;

// =============================================================================
// Pending Operation
// =============================================================================

/// An operation submitted and awaiting its response
#[derive(Debug)]
pub struct PendingOperation {
    sequence: i64,
    kind: OperationKind,
    entry: Option<Entry>,
    completion: Option<Completion>,
    submitted_at: Instant,
}

impl PendingOperation {
    pub fn new(kind: OperationKind, entry: Option<Entry>, completion: Completion) -> Self {
        Self {
            sequence: -1,
            kind,
            entry,
            completion: Some(completion),
            submitted_at: Instant::now(),
        }
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn assign_sequence(&mut self, sequence: i64) {
        self.sequence = sequence;
        self.submitted_at = Instant::now();
    }

    /// Drop without delivering; hands back the entry
    pub fn disarm(mut self) -> Option<Entry> {
        self.completion = None;
        self.entry.take()
    }

    /// Apply `response` to the entry and deliver the result
    pub fn complete(mut self, status: Status, response: Option<&Frame>) {
        self.finish(status, response);
    }

    fn finish(&mut self, mut status: Status, response: Option<&Frame>) {
        let Some(completion) = self.completion.take() else {
            return;
        };

        if status.is_success() {
            if let Some(frame) = response {
                if frame.message_type() != Some(self.kind.response_type()) {
                    status = Status::Invalid;
                }
            }
        }

        let mut entry = self.entry.take();
        if let Some(entry) = entry.as_mut() {
            status = apply_response(self.kind, status, entry, response);
        }

        let keys = match (self.kind, response) {
            (OperationKind::GetKeyRange, Some(frame)) if status.is_success() => frame
                .command
                .range()
                .map(|r| r.keys.iter().map(|k| Bytes::copy_from_slice(k)).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        completion.deliver(OperationResult {
            status,
            sequence: self.sequence,
            entry,
            keys,
        });
    }
}

impl Drop for PendingOperation {
    fn drop(&mut self) {
        self.finish(Status::ConnectionError, None);
    }
}

/// Write response data back into the caller's entry; may downgrade the status
fn apply_response(
    kind: OperationKind,
    mut status: Status,
    entry: &mut Entry,
    response: Option<&Frame>,
) -> Status {
    match kind {
        OperationKind::Put => {
            if status.is_success() {
                entry.db_version = std::mem::take(&mut entry.new_version);
            }
        }
        OperationKind::Get => {
            let frame = match response {
                Some(frame) if status.is_success() => frame,
                _ => {
                    reset_value(entry);
                    return status;
                }
            };

            if let Some(kv) = frame.command.key_value() {
                if let Some(version) = &kv.db_version {
                    entry.db_version = ByteBuffer::from_slice(version);
                }
                if let Some(tag) = &kv.tag {
                    entry.tag = ByteBuffer::from_slice(tag);
                }
                if kv.algorithm.is_some() {
                    entry.algorithm = kv.algorithm;
                }
            }

            if entry.metadata_only {
                reset_value(entry);
            } else {
                let buffer = entry
                    .value
                    .get_or_insert_with(|| ByteBuffer::with_capacity(MAX_VALUE_LEN));
                if buffer.fill_from(&frame.value).is_err() {
                    buffer.reset();
                    status = Status::BufferOverrun;
                }
            }
        }
        OperationKind::Delete => reset_value(entry),
        OperationKind::NoOp | OperationKind::GetKeyRange => {}
    }
    status
}

fn reset_value(entry: &mut Entry) {
    if let Some(value) = entry.value.as_mut() {
        value.reset();
    }
}

// =============================================================================
// Validation
// =============================================================================

fn invalid() -> KineticError {
    KineticError::Submission(Status::Invalid)
}

fn validate_entry(entry: &Entry, key_required: bool) -> Result<()> {
    if entry.key.len() > MAX_KEY_LEN || (key_required && entry.key.is_empty()) {
        return Err(invalid());
    }
    if entry.tag.len() > MAX_METADATA_LEN
        || entry.new_version.len() > MAX_METADATA_LEN
        || entry.db_version.len() > MAX_METADATA_LEN
    {
        return Err(invalid());
    }
    Ok(())
}

fn validate_value(entry: &Entry) -> Result<()> {
    if entry.value_len() > MAX_VALUE_LEN {
        return Err(KineticError::Submission(Status::ValueTooLarge));
    }
    Ok(())
}

fn validate_range(range: &KeyRange) -> Result<()> {
    if range.start_key.len() > MAX_KEY_LEN || range.end_key.len() > MAX_KEY_LEN {
        return Err(invalid());
    }
    Ok(())
}

// =============================================================================
// Operation API
// =============================================================================

/// Handle for issuing operations on a connected session
///
/// Blocking calls return once the response (or a failure) arrives. Async
/// calls return the assigned sequence number; their completion fires exactly
/// once, and never when the call itself returns `Err`. A rejected async call
/// hands its entry back in the [`SubmitError`].
#[derive(Clone)]
pub struct Operation {
    connection: Arc<Connection>,
    mode: ExecutionMode,
}

impl Operation {
    pub(crate) fn new(connection: Arc<Connection>) -> Self {
        let mode = connection.config().execution_mode;
        Self { connection, mode }
    }

    // -------------------------------------------------------------------------
    // Blocking
    // -------------------------------------------------------------------------

    pub fn noop(&self) -> Result<()> {
        let result = self.call(OperationKind::NoOp, Request::noop(), None)?;
        check(result.status)
    }

    /// Store `entry`; on success its `db_version` becomes the written version
    pub fn put(&self, entry: &mut Entry) -> Result<()> {
        validate_entry(entry, false)?;
        validate_value(entry)?;

        let request = Request::put(entry);
        let result = self.call(OperationKind::Put, request, Some(entry))?;
        check(result.status)
    }

    /// Fetch `entry.key` into `entry.value`, allocating a buffer when none is set
    pub fn get(&self, entry: &mut Entry) -> Result<()> {
        let outcome = self.fetch(entry);
        if outcome.is_err() {
            reset_value(entry);
        }
        outcome
    }

    fn fetch(&self, entry: &mut Entry) -> Result<()> {
        validate_entry(entry, true)?;

        let request = Request::get(entry);
        let result = self.call(OperationKind::Get, request, Some(entry))?;
        check(result.status)
    }

    pub fn delete(&self, entry: &mut Entry) -> Result<()> {
        reset_value(entry);
        validate_entry(entry, true)?;

        let request = Request::delete(entry);
        let result = self.call(OperationKind::Delete, request, Some(entry))?;
        check(result.status)
    }

    /// List keys within `range`
    pub fn get_key_range(&self, range: &KeyRange) -> Result<Vec<Bytes>> {
        validate_range(range)?;

        let result = self.call(OperationKind::GetKeyRange, Request::key_range(range), None)?;
        check(result.status)?;
        Ok(result.keys)
    }

    fn call(
        &self,
        kind: OperationKind,
        request: Request,
        mut slot: Option<&mut Entry>,
    ) -> Result<OperationResult> {
        let (tx, rx) = channel::bounded(1);
        let entry = slot.as_deref_mut().map(std::mem::take);
        let operation = PendingOperation::new(kind, entry, Completion::Channel(tx));

        if let Err(Rejected { error, operation }) = self.connection.submit(request, operation) {
            if let (Some(slot), Some(entry)) = (slot, operation.disarm()) {
                *slot = entry;
            }
            return Err(error);
        }

        let mut result = self.wait(&rx)?;
        if let (Some(slot), Some(entry)) = (slot, result.entry.take()) {
            *slot = entry;
        }
        Ok(result)
    }

    fn wait(&self, rx: &Receiver<OperationResult>) -> Result<OperationResult> {
        match self.mode {
            ExecutionMode::Threaded => rx.recv().map_err(|_| KineticError::ConnectionClosed),
            ExecutionMode::CallerDriven => loop {
                match rx.try_recv() {
                    Ok(result) => return Ok(result),
                    Err(TryRecvError::Disconnected) => return Err(KineticError::ConnectionClosed),
                    Err(TryRecvError::Empty) => {}
                }
                // A failing run has already completed everything pending
                if let Err(e) = self.connection.run() {
                    return rx.try_recv().map_err(|_| e);
                }
            },
        }
    }

    // -------------------------------------------------------------------------
    // Async
    // -------------------------------------------------------------------------

    pub fn noop_async(&self, completion: Completion) -> SubmitResult {
        self.submit(OperationKind::NoOp, Request::noop(), None, completion)
    }

    pub fn put_async(&self, entry: Entry, completion: Completion) -> SubmitResult {
        if let Err(error) = validate_entry(&entry, false).and_then(|_| validate_value(&entry)) {
            return Err(SubmitError::new(error, Some(entry)));
        }

        let request = Request::put(&entry);
        self.submit(OperationKind::Put, request, Some(entry), completion)
    }

    pub fn get_async(&self, entry: Entry, completion: Completion) -> SubmitResult {
        if let Err(error) = validate_entry(&entry, true) {
            return Err(SubmitError::new(error, Some(entry)));
        }

        let request = Request::get(&entry);
        self.submit(OperationKind::Get, request, Some(entry), completion)
    }

    pub fn delete_async(&self, mut entry: Entry, completion: Completion) -> SubmitResult {
        reset_value(&mut entry);
        if let Err(error) = validate_entry(&entry, true) {
            return Err(SubmitError::new(error, Some(entry)));
        }

        let request = Request::delete(&entry);
        self.submit(OperationKind::Delete, request, Some(entry), completion)
    }

    pub fn get_key_range_async(&self, range: &KeyRange, completion: Completion) -> SubmitResult {
        validate_range(range).map_err(|error| SubmitError::new(error, None))?;
        self.submit(
            OperationKind::GetKeyRange,
            Request::key_range(range),
            None,
            completion,
        )
    }

    fn submit(
        &self,
        kind: OperationKind,
        request: Request,
        entry: Option<Entry>,
        completion: Completion,
    ) -> SubmitResult {
        let operation = PendingOperation::new(kind, entry, completion);
        self.connection
            .submit(request, operation)
            .map_err(|Rejected { error, operation }| SubmitError::new(error, operation.disarm()))
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("peer", &self.connection.peer_addr())
            .field("mode", &self.mode)
            .finish()
    }
}

fn check(status: Status) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(KineticError::from_status(status))
    }
}
