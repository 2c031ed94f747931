//! Mock Kinetic device
//!
//! A `TcpListener` thread that speaks the frame protocol, keeps an in-memory
//! key-value store and answers with scripted behaviour.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::ops::Bound;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use kinetic_client::config::{ExecutionMode, SessionConfigBuilder};
use kinetic_client::protocol::{
    read_frame, verify, write_frame, Body, Command, CommandHeader, Frame, FrameHeader, KeyValue,
    MessageType, Range, StatusCode, StatusReport, MAX_VALUE_LEN,
};
use kinetic_client::{Algorithm, SessionConfig};

pub const HMAC_KEY: &[u8] = b"asdfasdf";

/// How the device answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answer every request in order
    Respond,
    /// Read requests, never answer
    Silent,
    /// Hold answers until `n` are queued, then send them newest first
    Reverse(usize),
    /// Sign answers with a different key
    WrongKey,
    /// Precede each answer with one acking a sequence nobody sent
    BogusAckFirst,
    /// Answer `n` requests, then drop the connection on the next
    CloseAfter(usize),
    /// Answer every request with this status
    AlwaysStatus(StatusCode),
    /// Answer with a message type that does not match the request
    WrongType,
    /// Precede each answer with a frame whose value exceeds the size cap
    OversizedFirst,
}

#[derive(Debug, Clone)]
struct Stored {
    value: Vec<u8>,
    version: Option<Vec<u8>>,
    tag: Option<Vec<u8>>,
    algorithm: Option<Algorithm>,
}

type Store = Arc<Mutex<BTreeMap<Vec<u8>, Stored>>>;

pub struct MockDevice {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<i64>>>,
    store: Store,
}

impl MockDevice {
    pub fn start(behavior: Behavior) -> Self {
        Self::start_with(behavior, None)
    }

    /// Start a device that greets each connection with `connection_id`
    pub fn start_with_handshake(behavior: Behavior, connection_id: i64) -> Self {
        Self::start_with(behavior, Some(connection_id))
    }

    fn start_with(behavior: Behavior, handshake: Option<i64>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let store: Store = Arc::new(Mutex::new(BTreeMap::new()));

        let device_received = Arc::clone(&received);
        let device_store = Arc::clone(&store);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let received = Arc::clone(&device_received);
                let store = Arc::clone(&device_store);
                thread::spawn(move || {
                    serve(stream, behavior, handshake, received, store);
                });
            }
        });

        Self {
            addr,
            received,
            store,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Session config aimed at this device, caller-driven
    pub fn config(&self) -> SessionConfigBuilder {
        SessionConfig::builder()
            .host("127.0.0.1")
            .port(self.port())
            .hmac_key(HMAC_KEY)
            .execution_mode(ExecutionMode::CallerDriven)
            .poll_interval(Duration::from_millis(10))
            .connect_timeout(Duration::from_secs(2))
    }

    /// Sequence numbers of every request received, in arrival order
    pub fn received(&self) -> Vec<i64> {
        self.received.lock().clone()
    }

    /// Wait until at least `n` requests have arrived
    pub fn wait_for_requests(&self, n: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if self.received.lock().len() >= n {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    pub fn stored_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.store.lock().get(key).map(|s| s.value.clone())
    }

    pub fn stored_keys(&self) -> Vec<Vec<u8>> {
        self.store.lock().keys().cloned().collect()
    }
}

// =============================================================================
// Connection handling
// =============================================================================

fn serve(
    mut stream: TcpStream,
    behavior: Behavior,
    handshake: Option<i64>,
    received: Arc<Mutex<Vec<i64>>>,
    store: Store,
) {
    let connection_id = handshake.unwrap_or(0);
    let mut device_sequence = 0i64;

    if let Some(id) = handshake {
        let greeting = Command {
            header: Some(CommandHeader {
                connection_id: id,
                ..CommandHeader::default()
            }),
            body: None,
            status: Some(StatusReport::new(StatusCode::Success)),
        };
        let frame = Frame::seal(greeting, Bytes::new(), 1, HMAC_KEY).unwrap();
        if write_frame(&mut stream, &frame).is_err() {
            return;
        }
    }

    let mut held: Vec<Frame> = Vec::new();
    let mut answered = 0usize;

    loop {
        let request = match read_frame(&mut stream) {
            Ok(frame) => frame,
            Err(_) => return,
        };
        let Some(sequence) = request.sequence() else {
            continue;
        };
        received.lock().push(sequence);

        if behavior == Behavior::Silent {
            continue;
        }
        if let Behavior::CloseAfter(n) = behavior {
            if answered >= n {
                return;
            }
        }

        let request_type = request.message_type().unwrap_or(MessageType::NoOp);
        let (status, body, value) = if verify(&request, HMAC_KEY) {
            match behavior {
                Behavior::AlwaysStatus(code) => (code, None, Bytes::new()),
                _ => execute(&request, &store),
            }
        } else {
            (StatusCode::HmacFailure, None, Bytes::new())
        };

        let response_type = match (behavior, request_type) {
            // NoOp has nothing to confuse it with; answer as a Get
            (Behavior::WrongType, MessageType::NoOp) => MessageType::GetResponse,
            (Behavior::WrongType, _) => MessageType::NoOpResponse,
            _ => request_type.response(),
        };

        device_sequence += 1;
        let key: &[u8] = if behavior == Behavior::WrongKey {
            b"not the key"
        } else {
            HMAC_KEY
        };
        let response = respond(
            connection_id,
            device_sequence,
            sequence,
            response_type,
            status,
            body,
            value,
            key,
        );

        if behavior == Behavior::BogusAckFirst {
            device_sequence += 1;
            let bogus = respond(
                connection_id,
                device_sequence,
                sequence + 1_000_000,
                response_type,
                StatusCode::Success,
                None,
                Bytes::new(),
                HMAC_KEY,
            );
            if write_frame(&mut stream, &bogus).is_err() {
                return;
            }
        }

        if behavior == Behavior::OversizedFirst {
            let oversized = MAX_VALUE_LEN + 1;
            let mut junk = FrameHeader::new(0, oversized as u32).to_bytes().to_vec();
            junk.resize(junk.len() + oversized, b'F');
            if stream.write_all(&junk).is_err() {
                return;
            }
        }

        answered += 1;
        match behavior {
            Behavior::Reverse(batch) => {
                held.push(response);
                if held.len() >= batch {
                    while let Some(frame) = held.pop() {
                        if write_frame(&mut stream, &frame).is_err() {
                            return;
                        }
                    }
                }
            }
            _ => {
                if write_frame(&mut stream, &response).is_err() {
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn respond(
    connection_id: i64,
    sequence: i64,
    ack: i64,
    message_type: MessageType,
    status: StatusCode,
    body: Option<Body>,
    value: Bytes,
    key: &[u8],
) -> Frame {
    let command = Command {
        header: Some(CommandHeader {
            cluster_version: 0,
            connection_id,
            sequence,
            ack_sequence: Some(ack),
            message_type: Some(message_type),
        }),
        body,
        status: Some(StatusReport::new(status)),
    };
    Frame::seal(command, value, 1, key).unwrap()
}

// =============================================================================
// Key-value semantics
// =============================================================================

fn execute(request: &Frame, store: &Store) -> (StatusCode, Option<Body>, Bytes) {
    let empty = KeyValue::default();
    let kv = request.command.key_value().unwrap_or(&empty);
    let key = kv.key.clone().unwrap_or_default();
    let force = kv.force.unwrap_or(false);
    let mut store = store.lock();

    match request.message_type() {
        Some(MessageType::NoOp) => (StatusCode::Success, None, Bytes::new()),

        Some(MessageType::Put) => {
            if let Some(existing) = store.get(&key) {
                if !force && existing.version != kv.db_version {
                    return (StatusCode::VersionMismatch, None, Bytes::new());
                }
            } else if !force && kv.db_version.is_some() {
                return (StatusCode::VersionMismatch, None, Bytes::new());
            }
            store.insert(
                key,
                Stored {
                    value: request.value.to_vec(),
                    version: kv.new_version.clone(),
                    tag: kv.tag.clone(),
                    algorithm: kv.algorithm,
                },
            );
            (StatusCode::Success, None, Bytes::new())
        }

        Some(MessageType::Get) => match store.get(&key) {
            None => (StatusCode::NotFound, None, Bytes::new()),
            Some(stored) => {
                let body = Body {
                    key_value: Some(KeyValue {
                        key: Some(key.clone()),
                        db_version: stored.version.clone(),
                        tag: stored.tag.clone(),
                        algorithm: stored.algorithm,
                        ..KeyValue::default()
                    }),
                    range: None,
                };
                let value = if kv.metadata_only.unwrap_or(false) {
                    Bytes::new()
                } else {
                    Bytes::from(stored.value.clone())
                };
                (StatusCode::Success, Some(body), value)
            }
        },

        Some(MessageType::Delete) => match store.get(&key) {
            None => (StatusCode::NotFound, None, Bytes::new()),
            Some(existing) => {
                if !force && existing.version != kv.db_version {
                    return (StatusCode::VersionMismatch, None, Bytes::new());
                }
                store.remove(&key);
                (StatusCode::Success, None, Bytes::new())
            }
        },

        Some(MessageType::GetKeyRange) => {
            let empty_range = Range::default();
            let range = request.command.range().unwrap_or(&empty_range);
            let keys = list_keys(&store, range);
            let body = Body {
                key_value: None,
                range: Some(Range {
                    keys,
                    ..Range::default()
                }),
            };
            (StatusCode::Success, Some(body), Bytes::new())
        }

        _ => (StatusCode::InvalidRequest, None, Bytes::new()),
    }
}

fn list_keys(store: &BTreeMap<Vec<u8>, Stored>, range: &Range) -> Vec<Vec<u8>> {
    let bound = |key: &Option<Vec<u8>>, inclusive: Option<bool>| match key {
        None => Bound::Unbounded,
        Some(k) if inclusive.unwrap_or(false) => Bound::Included(k.clone()),
        Some(k) => Bound::Excluded(k.clone()),
    };
    if let (Some(s), Some(e)) = (&range.start_key, &range.end_key) {
        let both_inclusive =
            range.start_key_inclusive.unwrap_or(false) && range.end_key_inclusive.unwrap_or(false);
        if s > e || (s == e && !both_inclusive) {
            return Vec::new();
        }
    }

    let start = bound(&range.start_key, range.start_key_inclusive);
    let end = bound(&range.end_key, range.end_key_inclusive);
    let max = range.max_returned.unwrap_or(200) as usize;

    let keys = store.range((start, end)).map(|(k, _)| k.clone());
    if range.reverse.unwrap_or(false) {
        keys.rev().take(max).collect()
    } else {
        keys.take(max).collect()
    }
}
