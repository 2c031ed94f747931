//! Configuration for a Kinetic session
//!
//! Centralized configuration with sensible defaults. A `SessionConfig` is
//! immutable once handed to a [`crate::Session`].

use std::time::Duration;

use crate::error::ConfigError;

/// Default Kinetic device port
pub const DEFAULT_PORT: u16 = 8123;

/// How completions are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A background worker per connection drives `run` and executes completions
    Threaded,

    /// The caller drives `run`; completions execute on the calling thread
    CallerDriven,
}

/// Main configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // -------------------------------------------------------------------------
    // Device Addressing
    // -------------------------------------------------------------------------
    /// Device host name or address
    pub host: String,

    /// Device TCP port
    pub port: u16,

    // -------------------------------------------------------------------------
    // Identity / Authentication
    // -------------------------------------------------------------------------
    /// Cluster version expected by the device
    pub cluster_version: i64,

    /// User identity the HMAC key belongs to
    pub identity: i64,

    /// Shared secret used to sign and verify every frame
    pub hmac_key: Vec<u8>,

    // -------------------------------------------------------------------------
    // Engine Behaviour
    // -------------------------------------------------------------------------
    pub execution_mode: ExecutionMode,

    /// Upper bound on how long a single `run` step waits for data
    pub poll_interval: Duration,

    pub connect_timeout: Duration,

    pub write_timeout: Duration,

    /// Max operations awaiting a response on one connection
    pub max_pending: usize,

    /// Fail operations that wait longer than this (None = never)
    pub operation_timeout: Option<Duration>,

    /// Wait for the device's unsolicited status frame after connecting
    pub handshake: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            cluster_version: 0,
            identity: 1,
            hmac_key: Vec::new(),
            execution_mode: ExecutionMode::Threaded,
            poll_interval: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            max_pending: 1024,
            operation_timeout: None,
            handshake: false,
        }
    }
}

impl SessionConfig {
    /// Create a new config builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Check the fields that must be valid before any socket is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::HostEmpty);
        }
        if self.hmac_key.is_empty() {
            return Err(ConfigError::AuthKeyEmpty);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_pending == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// `host:port` string used for connecting and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for SessionConfig
#[derive(Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn cluster_version(mut self, version: i64) -> Self {
        self.config.cluster_version = version;
        self
    }

    pub fn identity(mut self, identity: i64) -> Self {
        self.config.identity = identity;
        self
    }

    /// Set the HMAC key shared with the device
    pub fn hmac_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.config.hmac_key = key.into();
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.execution_mode = mode;
        self
    }

    /// Set the bounded wait used by each `run` step
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the max number of in-flight operations
    pub fn max_pending(mut self, count: usize) -> Self {
        self.config.max_pending = count;
        self
    }

    pub fn operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    pub fn handshake(mut self, enabled: bool) -> Self {
        self.config.handshake = enabled;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
