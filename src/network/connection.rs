//! Connection
//!
//! Owns the socket to one device, the sequence counter and the registry of
//! pending operations, and implements the two halves of the dispatcher:
//! `submit` (write side) and `run` (read side).
//!
//! ## Locks
//! - `writer`: sequence assignment, signing and the socket write happen under
//!   one lock, so sequence numbers hit the wire strictly increasing
//! - `reader`: serializes `run` steps and owns the partial-read buffer
//! - `state`: the run-state flag
//!
//! Order is always writer → state → registry, or reader → state → registry.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::error::{FrameError, KineticError, Result};
use crate::logging::Logger;
use crate::operation::{PendingOperation, Request};
use crate::protocol::{self, Command, CommandHeader, Frame, FrameBuffer};
use crate::status::Status;

use super::registry::{OperationRegistry, Rejected};

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 64 * 1024;

/// Connection run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

/// Write half, guarded as one unit so sequences hit the wire in order
struct Writer {
    /// TCP stream writer
    stream: TcpStream,

    /// Sequence number the next request will carry
    next_sequence: i64,

    /// Connection id stamped on every request header
    connection_id: i64,
}

/// Read half, owned by whichever thread is inside `run`
struct Reader {
    /// TCP stream reader (cloned from the writer's socket)
    stream: TcpStream,

    /// Partial frames carried between reads
    frames: FrameBuffer,

    /// Socket read target, reused across reads
    scratch: Box<[u8]>,
}

impl Reader {
    /// One bounded read into the frame buffer
    fn fill(&mut self) -> io::Result<usize> {
        let n = self.stream.read(&mut self.scratch)?;
        self.frames.extend(&self.scratch[..n]);
        Ok(n)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// A live, ordered byte stream to one device
pub struct Connection {
    /// Validated session configuration
    config: SessionConfig,

    /// Injected log sink
    log: Logger,

    /// Peer address for logging
    peer_addr: String,

    /// Run state
    state: Mutex<ConnectionState>,

    /// Write half: sequence counter and socket
    writer: Mutex<Writer>,

    /// Read half: socket and frame assembly
    reader: Mutex<Reader>,

    /// Operations awaiting a response, by sequence number
    registry: OperationRegistry,
}

impl Connection {
    /// Connect to the device described by `config`
    ///
    /// The config must already be validated. Performs the handshake when enabled.
    pub fn open(config: &SessionConfig, log: Logger) -> Result<Self> {
        let address = config.address();
        log.debug(format_args!("connecting to {}", address));

        let stream = Self::connect_stream(config, &address)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(config.write_timeout))?;
        stream.set_read_timeout(Some(config.poll_interval))?;

        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| address.clone());
        let read_stream = stream.try_clone()?;

        // Without a handshake the device accepts any id; wall-clock seconds keep it unique-ish
        let connection_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let connection = Self {
            config: config.clone(),
            log,
            peer_addr,
            state: Mutex::new(ConnectionState::Connecting),
            writer: Mutex::new(Writer {
                stream,
                next_sequence: 0,
                connection_id,
            }),
            reader: Mutex::new(Reader {
                stream: read_stream,
                frames: FrameBuffer::new(),
                scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
            }),
            registry: OperationRegistry::new(config.max_pending),
        };

        if config.handshake {
            connection.handshake()?;
        }

        *connection.state.lock() = ConnectionState::Connected;
        connection.log.info(format_args!(
            "connected to {} (connection id {})",
            connection.peer_addr,
            connection.connection_id()
        ));

        Ok(connection)
    }

    fn connect_stream(config: &SessionConfig, address: &str) -> Result<TcpStream> {
        let addrs = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| KineticError::Connection(format!("resolving {}: {}", address, e)))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(KineticError::Connection(match last_error {
            Some(e) => format!("connecting to {}: {}", address, e),
            None => format!("{} resolved to no addresses", address),
        }))
    }

    /// Wait for the device's unsolicited status frame and adopt its connection id
    fn handshake(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        reader
            .stream
            .set_read_timeout(Some(self.config.connect_timeout))?;
        let deadline = Instant::now() + self.config.connect_timeout;

        let frame = loop {
            if let Some(frame) = reader.frames.next_frame()? {
                break frame;
            }
            if Instant::now() >= deadline {
                return Err(KineticError::Connection("handshake timed out".to_string()));
            }
            match reader.fill() {
                Ok(0) => return Err(KineticError::ConnectionClosed),
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(e) => return Err(e.into()),
            }
        };

        if !protocol::verify(&frame, &self.config.hmac_key) {
            return Err(KineticError::Authentication);
        }
        let connection_id = frame
            .connection_id()
            .ok_or(FrameError::MissingField("header"))?;
        self.writer.lock().connection_id = connection_id;

        reader
            .stream
            .set_read_timeout(Some(self.config.poll_interval))?;
        Ok(())
    }

    // =========================================================================
    // Submit (write side)
    // =========================================================================

    /// Assign a sequence number, register `operation` and write the request
    ///
    /// On `Err` the operation was never registered (or has been taken back)
    /// and its completion has not fired.
    pub fn submit(
        &self,
        request: Request,
        mut operation: PendingOperation,
    ) -> std::result::Result<i64, Rejected> {
        let mut writer = self.writer.lock();

        if self.state() != ConnectionState::Connected {
            return Err(Rejected {
                error: KineticError::ConnectionClosed,
                operation,
            });
        }

        let sequence = writer.next_sequence;
        let header = CommandHeader {
            cluster_version: self.config.cluster_version,
            connection_id: writer.connection_id,
            sequence,
            ack_sequence: None,
            message_type: Some(request.message_type),
        };
        let command = Command {
            header: Some(header),
            body: request.body,
            status: None,
        };

        let sealed = Frame::seal(
            command,
            request.value,
            self.config.identity,
            &self.config.hmac_key,
        )
        .and_then(|frame| protocol::pack(&frame));
        let bytes = match sealed {
            Ok(bytes) => bytes,
            Err(error) => return Err(Rejected { error, operation }),
        };

        operation.assign_sequence(sequence);
        self.registry.insert(operation)?;
        writer.next_sequence += 1;

        if let Err(e) = writer.stream.write_all(&bytes) {
            drop(writer);
            let operation = self.registry.take(sequence);
            self.fail(&format!("write failed: {}", e));
            return match operation {
                Some(operation) => Err(Rejected {
                    error: e.into(),
                    operation,
                }),
                // Already completed by a concurrent disconnect
                None => Ok(sequence),
            };
        }

        self.log.trace(format_args!(
            "sent {:?} sequence {} ({} bytes)",
            request.message_type,
            sequence,
            bytes.len()
        ));
        Ok(sequence)
    }

    // =========================================================================
    // Run (read side)
    // =========================================================================

    /// One bounded step: read what is available and dispatch complete frames
    ///
    /// Returns the number of operations completed. Completions execute on the
    /// calling thread and must not call `run` themselves.
    pub fn run(&self) -> Result<usize> {
        let mut reader = self.reader.lock();
        self.ensure_connected()?;

        let mut dispatched = self.expire_overdue();

        if !reader.frames.has_frame() {
            match reader.fill() {
                Ok(0) => {
                    drop(reader);
                    self.fail("peer closed the connection");
                    return Err(KineticError::ConnectionClosed);
                }
                Ok(_) => {}
                Err(e) if is_timeout(&e) => return Ok(dispatched),
                Err(e) => {
                    drop(reader);
                    self.fail(&format!("read failed: {}", e));
                    return Err(e.into());
                }
            }
        }

        loop {
            match reader.frames.next_frame() {
                Ok(Some(frame)) => dispatched += self.dispatch(frame),
                Ok(None) => break,
                Err(e) => self.log.warn(format_args!(
                    "discarding malformed frame from {}: {}",
                    self.peer_addr, e
                )),
            }
        }

        Ok(dispatched)
    }

    fn dispatch(&self, frame: Frame) -> usize {
        let Some(ack) = frame.ack_sequence() else {
            self.log.debug(format_args!(
                "ignoring unsolicited frame from {} (sequence {:?})",
                self.peer_addr,
                frame.sequence()
            ));
            return 0;
        };

        let authentic = protocol::verify(&frame, &self.config.hmac_key);

        let Some(operation) = self.registry.take(ack) else {
            self.log.warn(format_args!(
                "protocol violation: response for unknown sequence {} from {}",
                ack, self.peer_addr
            ));
            return 0;
        };

        let status = if authentic {
            frame
                .command
                .status
                .as_ref()
                .map(|s| s.code.to_status())
                .unwrap_or(Status::Invalid)
        } else {
            self.log.warn(format_args!(
                "HMAC mismatch on response to sequence {}",
                ack
            ));
            Status::HmacFailure
        };

        operation.complete(status, Some(&frame));
        1
    }

    fn expire_overdue(&self) -> usize {
        let Some(timeout) = self.config.operation_timeout else {
            return 0;
        };

        let expired = self.registry.expire(timeout, Instant::now());
        let count = expired.len();
        for operation in expired {
            self.log.warn(format_args!(
                "sequence {} timed out after {:?}",
                operation.sequence(),
                timeout
            ));
            operation.complete(Status::OperationTimedOut, None);
        }
        count
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Unrecoverable socket failure: move to Error and fail everything pending
    fn fail(&self, reason: &str) -> usize {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    *state = ConnectionState::Error;
                }
                // Already failed, or a disconnect owns the teardown
                _ => return 0,
            }
        }

        let operations = self.registry.close();
        let failed = operations.len();
        self.log.error(format_args!(
            "connection to {} failed: {} ({} pending operations failed)",
            self.peer_addr, reason, failed
        ));

        for operation in operations {
            operation.complete(Status::ConnectionError, None);
        }
        failed
    }

    /// Fail every pending operation, then release the socket
    ///
    /// Returns how many operations were failed.
    pub fn close(&self) -> usize {
        *self.state.lock() = ConnectionState::Disconnecting;

        let operations = self.registry.close();
        let failed = operations.len();
        for operation in operations {
            operation.complete(Status::ConnectionError, None);
        }

        {
            let writer = self.writer.lock();
            if let Err(e) = writer.stream.shutdown(Shutdown::Both) {
                self.log.debug(format_args!("socket shutdown: {}", e));
            }
        }

        *self.state.lock() = ConnectionState::Disconnected;
        self.log.info(format_args!(
            "disconnected from {} ({} pending operations failed)",
            self.peer_addr, failed
        ));
        failed
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn ensure_connected(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Error => Err(KineticError::Connection(
                "connection is in error state".to_string(),
            )),
            _ => Err(KineticError::ConnectionClosed),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Operations awaiting a response
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    pub fn connection_id(&self) -> i64 {
        self.writer.lock().connection_id
    }

    /// Sequence number the next request will carry
    pub fn next_sequence(&self) -> i64 {
        self.writer.lock().next_sequence
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }
}
