//! Transport Module
//!
//! The message transport the drivers run on top of.
//!
//! ## Contract
//! - `connect` / `listen` / `accept` / `reject` / `send` / `disconnect`
//!   submit work and return immediately
//! - Results come back as [`TransportEvent`]s through `poll` (non-blocking)
//!   or `wait` (blocks up to a timeout)
//! - Every connection event carries the [`SessionToken`] handed over at
//!   connect/accept time
//!
//! ## Implementations
//! - [`LoopbackTransport`]: in-memory hub of named endpoints
//! - [`TcpTransport`]: TCP with background reader threads

mod loopback;
mod frame;
mod tcp;

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::session::{ConnAttribute, SessionToken};

pub use loopback::{LoopbackHub, LoopbackTransport};
pub use frame::{read_frame, write_frame, Frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use tcp::TcpTransport;

/// Transport-assigned handle for an established connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle for a connect request awaiting accept/reject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Per-send options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendFlags {
    /// Return only once the send has completed; no completion event follows
    pub blocking: bool,
}

impl SendFlags {
    pub fn blocking(blocking: bool) -> Self {
        Self { blocking }
    }
}

/// What a successful `send` call means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A `SendCompleted` event will follow
    Pending,

    /// Already complete (blocking send)
    Completed,
}

/// Result carried by a send completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Ok,
    Failed(String),
}

/// Events delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Our connect was accepted
    ConnectAccepted {
        connection: ConnectionId,
        token: SessionToken,
    },

    /// Our connect was rejected or timed out
    ConnectRejected { token: SessionToken, reason: String },

    /// A peer wants to connect to our listener
    ConnectRequest {
        request: RequestId,
        attribute: ConnAttribute,
        payload: Bytes,
    },

    /// An accept we issued has completed
    AcceptCompleted {
        connection: ConnectionId,
        token: SessionToken,
    },

    SendCompleted {
        connection: ConnectionId,
        token: SessionToken,
        context: u64,
        status: SendStatus,
    },

    DataReceived {
        connection: ConnectionId,
        token: SessionToken,
        data: Bytes,
    },

    /// The connection went away (peer close or transport failure)
    Closed {
        connection: ConnectionId,
        token: SessionToken,
        reason: Option<String>,
    },

    /// Anything the transport could not classify
    Unrecognized { code: u32 },
}

impl TransportEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::ConnectAccepted { .. } => "connect-accepted",
            TransportEvent::ConnectRejected { .. } => "connect-rejected",
            TransportEvent::ConnectRequest { .. } => "connect-request",
            TransportEvent::AcceptCompleted { .. } => "accept-completed",
            TransportEvent::SendCompleted { .. } => "send-completed",
            TransportEvent::DataReceived { .. } => "data-received",
            TransportEvent::Closed { .. } => "closed",
            TransportEvent::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// A connection-oriented, message-based transport
pub trait Transport {
    /// Start connecting to `target`; the outcome arrives as an event
    fn connect(
        &mut self,
        target: &str,
        attribute: ConnAttribute,
        payload: &[u8],
        token: SessionToken,
        timeout: Duration,
    ) -> Result<()>;

    /// Start accepting connect requests; returns the URI peers can use
    fn listen(&mut self) -> Result<String>;

    fn accept(&mut self, request: RequestId, token: SessionToken) -> Result<()>;

    fn reject(&mut self, request: RequestId) -> Result<()>;

    /// Send one message; `context` is echoed back in the completion
    fn send(
        &mut self,
        connection: ConnectionId,
        data: Bytes,
        context: u64,
        flags: SendFlags,
    ) -> Result<SendOutcome>;

    /// Close a connection; the peer sees a `Closed` event
    fn disconnect(&mut self, connection: ConnectionId) -> Result<()>;

    /// Next event, or `None` if nothing is ready
    fn poll(&mut self) -> Result<Option<TransportEvent>>;

    /// Wait up to `timeout` for the next event
    fn wait(&mut self, timeout: Duration) -> Result<Option<TransportEvent>> {
        match self.poll()? {
            Some(event) => Ok(Some(event)),
            None => {
                std::thread::sleep(timeout);
                self.poll()
            }
        }
    }
}
