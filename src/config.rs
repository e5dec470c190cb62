//! Configuration for rcmd
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::executor::TouchMode;
use crate::session::ConnAttribute;

/// Main configuration shared by the client and server drivers
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// Confinement root: every command path resolves beneath this directory
    pub root_dir: PathBuf,

    /// Address the TCP transport binds to
    pub listen_addr: String,

    /// What Touch does to a file that already exists
    pub touch_mode: TouchMode,

    /// fsync file data after every Write
    pub sync_writes: bool,

    /// Echo Raw payloads back to the sender prefixed with `data:`
    pub echo_raw: bool,

    /// Accept incoming connect requests (false rejects all of them)
    pub accept_connections: bool,

    /// Max concurrently connected sessions; further requests are rejected
    pub max_sessions: usize,

    /// Stop the server loop once the first session has closed
    pub exit_after_session: bool,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Target URI (`tcp://host:port`, `host:port`, or a loopback endpoint name)
    pub server_uri: String,

    /// Requested connection attribute
    pub attribute: ConnAttribute,

    /// Use blocking sends (completion is reported by the send call itself)
    pub blocking: bool,

    /// Number of payload messages in the burst phase
    pub iterations: usize,

    /// Expect the server to echo every Raw payload
    pub expect_echo: bool,

    /// Connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// User payload carried with the connect request
    pub connect_payload: Vec<u8>,

    // -------------------------------------------------------------------------
    // Shared Configuration
    // -------------------------------------------------------------------------
    /// How long a driver waits for an event before re-checking its phases (milliseconds)
    pub poll_interval_ms: u64,

    /// Max message body size accepted by the codec (in bytes)
    pub max_payload_size: u32,

    /// How long a socket write may block before the send fails (milliseconds, 0 = no limit)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./rcmd_root"),
            listen_addr: "127.0.0.1:7070".to_string(),
            touch_mode: TouchMode::Create,
            sync_writes: false,
            echo_raw: true,
            accept_connections: true,
            max_sessions: 64,
            exit_after_session: false,
            server_uri: "tcp://127.0.0.1:7070".to_string(),
            attribute: ConnAttribute::ReliableOrdered,
            blocking: false,
            iterations: 10,
            expect_echo: true,
            connect_timeout_ms: 30_000,
            connect_payload: b"Hello World!".to_vec(),
            poll_interval_ms: 10,
            max_payload_size: crate::protocol::MAX_PAYLOAD_SIZE,
            write_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `None` when writes are unbounded
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the confinement root directory
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the Touch behaviour for existing files
    pub fn touch_mode(mut self, mode: TouchMode) -> Self {
        self.config.touch_mode = mode;
        self
    }

    /// Enable or disable fsync after each Write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Enable or disable echoing Raw payloads
    pub fn echo_raw(mut self, echo: bool) -> Self {
        self.config.echo_raw = echo;
        self
    }

    /// Accept or reject all incoming connect requests
    pub fn accept_connections(mut self, accept: bool) -> Self {
        self.config.accept_connections = accept;
        self
    }

    /// Set the maximum number of concurrently connected sessions
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = count;
        self
    }

    /// Stop serving after the first session closes
    pub fn exit_after_session(mut self, once: bool) -> Self {
        self.config.exit_after_session = once;
        self
    }

    /// Set the server URI the client connects to
    pub fn server_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.server_uri = uri.into();
        self
    }

    /// Set the requested connection attribute
    pub fn attribute(mut self, attribute: ConnAttribute) -> Self {
        self.config.attribute = attribute;
        self
    }

    /// Use blocking sends
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.config.blocking = blocking;
        self
    }

    /// Set the number of burst iterations
    pub fn iterations(mut self, count: usize) -> Self {
        self.config.iterations = count;
        self
    }

    /// Expect (or not) an echo for every Raw payload
    pub fn expect_echo(mut self, expect: bool) -> Self {
        self.config.expect_echo = expect;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the payload carried by the connect request
    pub fn connect_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.config.connect_payload = payload.into();
        self
    }

    /// Set the idle wait between polls (in milliseconds)
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the maximum message body size (in bytes)
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the socket write timeout (in milliseconds, 0 disables it)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
