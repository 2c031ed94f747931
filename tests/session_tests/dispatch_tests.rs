//! Tests for the async dispatcher
//!
//! These tests verify:
//! - Sequence numbers are strictly increasing on the wire
//! - N concurrent submitters + one run thread yield exactly N completions
//! - Out-of-order responses are matched by sequence number
//! - Disconnect fails every pending operation exactly once
//! - Unknown acks, bad HMACs and mismatched types are handled per frame
//! - Registry capacity and per-operation timeouts

#[path = "../support/mod.rs"]
mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver};
use kinetic_client::logging::{LogLevel, MemorySink};
use kinetic_client::protocol::StatusCode;
use kinetic_client::{
    Completion, ConnectionState, Entry, ExecutionMode, OperationResult, Session, Status,
};
use support::{Behavior, MockDevice};

// =============================================================================
// Helper Functions
// =============================================================================

fn connect(device: &MockDevice) -> Session {
    let session = Session::new(device.config().build());
    session.connect().unwrap();
    session
}

/// Drive `run` until `n` results arrive or five seconds pass
fn drain(session: &Session, rx: &Receiver<OperationResult>, n: usize) -> Vec<OperationResult> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut results = Vec::new();
    while results.len() < n && Instant::now() < deadline {
        let _ = session.run();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
    }
    results
}

// =============================================================================
// Sequencing Tests
// =============================================================================

#[test]
fn test_sequences_strictly_increasing() {
    let device = MockDevice::start(Behavior::Respond);
    let session = connect(&device);
    let op = session.new_operation().unwrap();

    for _ in 0..20 {
        op.noop().unwrap();
    }

    let received = device.received();
    assert_eq!(received.len(), 20);
    assert!(received.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(op.connection().next_sequence(), received[19] + 1);
}

#[test]
fn test_async_returns_assigned_sequence() {
    let device = MockDevice::start(Behavior::Respond);
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    let first = op.noop_async(Completion::channel(tx.clone())).unwrap();
    let second = op.noop_async(Completion::channel(tx)).unwrap();
    assert!(second > first);

    let results = drain(&session, &rx, 2);
    let sequences: HashSet<i64> = results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, HashSet::from([first, second]));
}

#[test]
fn test_concurrent_submitters_single_runner() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let device = MockDevice::start(Behavior::Respond);
    let session = connect(&device);
    let (tx, rx) = unbounded();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let op = session.new_operation().unwrap();
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let entry = Entry::new(format!("key_{}_{}", t, i).as_str())
                        .with_value(format!("value_{}", i).as_str());
                    op.put_async(entry, Completion::channel(tx.clone())).unwrap();
                }
            })
        })
        .collect();

    let total = THREADS * PER_THREAD;
    let results = drain(&session, &rx, total);
    for handle in handles {
        handle.join().unwrap();
    }

    // Exactly one completion per operation
    assert_eq!(results.len(), total);
    let sequences: HashSet<i64> = results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences.len(), total);
    assert!(results.iter().all(|r| r.status == Status::Success));
    assert!(rx.try_recv().is_err());

    let received = device.received();
    assert!(received.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(device.stored_keys().len(), total);
}

#[test]
fn test_out_of_order_responses_matched() {
    let device = MockDevice::start(Behavior::Reverse(5));
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    let mut sequences = Vec::new();
    for i in 0..5 {
        let entry = Entry::new(format!("k{}", i).as_str()).with_value(format!("v{}", i).as_str());
        sequences.push(op.put_async(entry, Completion::channel(tx.clone())).unwrap());
    }

    let results = drain(&session, &rx, 5);
    assert_eq!(results.len(), 5);

    // Arrived newest first, each matched to its own entry
    let arrival: Vec<i64> = results.iter().map(|r| r.sequence).collect();
    let mut reversed = sequences.clone();
    reversed.reverse();
    assert_eq!(arrival, reversed);

    for result in &results {
        let index = sequences.iter().position(|s| *s == result.sequence).unwrap();
        let entry = result.entry.as_ref().unwrap();
        assert_eq!(entry.key.as_slice(), format!("k{}", index).as_bytes());
    }
}

// =============================================================================
// Disconnect Tests
// =============================================================================

#[test]
fn test_disconnect_fails_every_pending() {
    const K: usize = 7;

    let device = MockDevice::start(Behavior::Silent);
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    for _ in 0..K {
        op.noop_async(Completion::channel(tx.clone())).unwrap();
    }
    assert!(device.wait_for_requests(K));
    assert_eq!(session.pending(), K);

    assert_eq!(session.disconnect().unwrap(), K);

    let results: Vec<OperationResult> = rx.try_iter().collect();
    assert_eq!(results.len(), K);
    assert!(results.iter().all(|r| r.status == Status::ConnectionError));
    let sequences: HashSet<i64> = results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences.len(), K);
}

#[test]
fn test_disconnect_from_threaded_mode() {
    let device = MockDevice::start(Behavior::Silent);
    let session = Session::new(
        device
            .config()
            .execution_mode(ExecutionMode::Threaded)
            .build(),
    );
    session.connect().unwrap();
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    for _ in 0..3 {
        op.noop_async(Completion::channel(tx.clone())).unwrap();
    }
    assert!(device.wait_for_requests(3));
    assert_eq!(session.disconnect().unwrap(), 3);
    assert_eq!(rx.try_iter().count(), 3);
}

#[test]
fn test_peer_close_fails_pending() {
    let device = MockDevice::start(Behavior::CloseAfter(0));
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    // Later writes may already see the closed socket and be rejected outright
    let submitted = (0..3)
        .filter(|_| op.noop_async(Completion::channel(tx.clone())).is_ok())
        .count();
    assert!(submitted >= 1);

    let results = drain(&session, &rx, submitted);
    assert_eq!(results.len(), submitted);
    assert!(results.iter().all(|r| r.status == Status::ConnectionError));
    assert_eq!(session.state(), ConnectionState::Error);
}

// =============================================================================
// Per-frame Failure Tests
// =============================================================================

#[test]
fn test_unknown_ack_logged_and_discarded() {
    let device = MockDevice::start(Behavior::BogusAckFirst);
    let sink = Arc::new(MemorySink::new());
    let session = Session::with_sink(device.config().build(), sink.clone());
    session.connect().unwrap();

    session.new_operation().unwrap().noop().unwrap();

    assert!(sink.contains(LogLevel::Warn, "protocol violation"));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_bad_hmac_fails_only_that_operation() {
    let device = MockDevice::start(Behavior::WrongKey);
    let session = connect(&device);
    let op = session.new_operation().unwrap();

    let err = op.noop().unwrap_err();
    assert_eq!(err.status(), Status::HmacFailure);

    // The connection survives
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(op.noop().unwrap_err().status(), Status::HmacFailure);
}

#[test]
fn test_device_rejects_bad_request_hmac() {
    let device = MockDevice::start(Behavior::Respond);
    let session = Session::new(device.config().hmac_key("not the device key").build());
    session.connect().unwrap();

    // Device answers HMAC_FAILURE signed with its own key, which we cannot verify either
    let err = session.new_operation().unwrap().noop().unwrap_err();
    assert_eq!(err.status(), Status::HmacFailure);
}

#[test]
fn test_oversized_frame_skipped_and_stream_resyncs() {
    let device = MockDevice::start(Behavior::OversizedFirst);
    let sink = Arc::new(MemorySink::new());
    let session = Session::with_sink(device.config().build(), sink.clone());
    session.connect().unwrap();
    let op = session.new_operation().unwrap();

    op.noop().unwrap();
    op.noop().unwrap();

    assert_eq!(session.pending(), 0);
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(sink.contains(LogLevel::Warn, "discarding malformed frame"));
}

#[test]
fn test_oversized_frame_does_not_drop_async_responses() {
    let device = MockDevice::start(Behavior::OversizedFirst);
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    for _ in 0..4 {
        op.noop_async(Completion::channel(tx.clone())).unwrap();
    }

    let results = drain(&session, &rx, 4);
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == Status::Success));
    assert_eq!(session.pending(), 0);
}

#[test]
fn test_mismatched_response_type_is_invalid() {
    let device = MockDevice::start(Behavior::WrongType);
    let session = connect(&device);

    let err = session.new_operation().unwrap().noop().unwrap_err();
    assert_eq!(err.status(), Status::Invalid);
}

#[test]
fn test_remote_status_passed_through() {
    let device = MockDevice::start(Behavior::AlwaysStatus(StatusCode::ServiceBusy));
    let session = connect(&device);

    let err = session.new_operation().unwrap().noop().unwrap_err();
    assert_eq!(err.status(), Status::ServiceBusy);
}

// =============================================================================
// Capacity / Timeout Tests
// =============================================================================

#[test]
fn test_full_registry_rejects_before_io() {
    let device = MockDevice::start(Behavior::Silent);
    let session = Session::new(device.config().max_pending(2).build());
    session.connect().unwrap();
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    op.noop_async(Completion::channel(tx.clone())).unwrap();
    op.noop_async(Completion::channel(tx.clone())).unwrap();
    let err = op.noop_async(Completion::channel(tx)).unwrap_err();
    assert_eq!(err.status(), Status::RegistryFull);

    assert!(device.wait_for_requests(2));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(device.received().len(), 2);

    // The rejected completion never fires
    assert_eq!(session.disconnect().unwrap(), 2);
    assert_eq!(rx.try_iter().count(), 2);
}

#[test]
fn test_operation_timeout() {
    let device = MockDevice::start(Behavior::Silent);
    let session = Session::new(
        device
            .config()
            .operation_timeout(Some(Duration::from_millis(50)))
            .build(),
    );
    session.connect().unwrap();

    let start = Instant::now();
    let err = session.new_operation().unwrap().noop().unwrap_err();
    assert_eq!(err.status(), Status::OperationTimedOut);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(session.pending(), 0);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_no_timeout_by_default() {
    let device = MockDevice::start(Behavior::Silent);
    let session = connect(&device);
    let op = session.new_operation().unwrap();
    let (tx, rx) = unbounded();

    op.noop_async(Completion::channel(tx)).unwrap();
    let results = {
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            session.run().unwrap();
        }
        rx.try_iter().count()
    };
    assert_eq!(results, 0);
    assert_eq!(session.pending(), 1);
}

#[test]
fn test_callback_completion_runs_on_run_caller() {
    let device = MockDevice::start(Behavior::Respond);
    let session = connect(&device);
    let (tx, rx) = unbounded();
    let caller = thread::current().id();

    session
        .new_operation()
        .unwrap()
        .noop_async(Completion::callback(move |result| {
            tx.send((result.status, thread::current().id())).unwrap();
        }))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut got = None;
    while got.is_none() && Instant::now() < deadline {
        session.run().unwrap();
        got = rx.try_recv().ok();
    }
    let (status, thread_id) = got.unwrap();
    assert_eq!(status, Status::Success);
    assert_eq!(thread_id, caller);
}
