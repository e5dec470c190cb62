//! TCP Transport
//!
//! ## Architecture
//! - Acceptor thread polls a non-blocking listener and reads each Hello
//! - One reader thread per connection turns frames into events
//! - All events funnel through one crossbeam channel drained by `poll`/`wait`
//! - Writes happen on the caller's thread under the connection table lock,
//!   bounded by a socket write timeout so a peer that stops reading fails
//!   its own sends instead of stalling the caller
//!
//! Every connection attribute is carried over TCP, which is reliable and
//! ordered; the requested attribute is recorded and logged only.

use std::collections::HashMap;
use std::io::{BufReader, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::frame::{read_frame, write_frame, Frame};
use super::{
    ConnectionId, RequestId, SendFlags, SendOutcome, SendStatus, Transport, TransportEvent,
};
use crate::error::{RcmdError, Result};
use crate::session::{ConnAttribute, SessionToken};

/// URI scheme accepted (and stripped) by `connect`
const SCHEME: &str = "tcp://";

/// Sleep between accept attempts on the non-blocking listener
const ACCEPT_BACKOFF: Duration = Duration::from_millis(5);

/// How long a new inbound connection has to send its Hello
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single blocking socket write
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP-backed transport
pub struct TcpTransport {
    /// Address `listen` binds to
    bind_addr: String,

    /// Bound address once listening
    local_addr: Option<SocketAddr>,

    /// Applied to every established stream
    write_timeout: Option<Duration>,

    events_tx: Sender<TransportEvent>,
    events_rx: Receiver<TransportEvent>,

    shared: Arc<Shared>,
}

/// State shared with the background threads
struct Shared {
    connections: Mutex<HashMap<ConnectionId, TcpConnection>>,
    requests: Mutex<HashMap<RequestId, TcpStream>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

struct TcpConnection {
    /// Write half; the reader thread owns a clone of the same socket
    stream: TcpStream,
    token: SessionToken,
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl TcpTransport {
    /// Create a transport that listens on `bind_addr` when asked to
    pub fn new(bind_addr: impl Into<String>) -> Self {
        let (events_tx, events_rx) = channel::unbounded();
        Self {
            bind_addr: bind_addr.into(),
            local_addr: None,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            events_tx,
            events_rx,
            shared: Arc::new(Shared {
                connections: Mutex::new(HashMap::new()),
                requests: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Create a transport for outbound connections only
    pub fn client() -> Self {
        Self::new("127.0.0.1:0")
    }

    /// Bound every socket write; `None` lets writes block indefinitely
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Address the listener is bound to, once `listen` has run
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }
}

impl Transport for TcpTransport {
    fn connect(
        &mut self,
        target: &str,
        attribute: ConnAttribute,
        payload: &[u8],
        token: SessionToken,
        timeout: Duration,
    ) -> Result<()> {
        let addr = target.strip_prefix(SCHEME).unwrap_or(target).to_string();
        let payload = payload.to_vec();
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        let write_timeout = self.write_timeout;

        tracing::debug!("Connecting to {} ({}, token {})", addr, attribute, token);

        thread::Builder::new()
            .name("rcmd-connect".to_string())
            .spawn(move || match dial(&addr, attribute, payload, timeout) {
                Ok(stream) => {
                    let established = establish(
                        &shared,
                        &events,
                        stream,
                        token,
                        write_timeout,
                        |connection| TransportEvent::ConnectAccepted { connection, token },
                    );
                    if let Err(e) = established {
                        let _ = events.send(TransportEvent::ConnectRejected {
                            token,
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    let _ = events.send(TransportEvent::ConnectRejected {
                        token,
                        reason: e.to_string(),
                    });
                }
            })?;

        Ok(())
    }

    fn listen(&mut self) -> Result<String> {
        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        thread::Builder::new()
            .name("rcmd-acceptor".to_string())
            .spawn(move || accept_loop(listener, shared, events))?;

        Ok(format!("{}{}", SCHEME, local_addr))
    }

    fn accept(&mut self, request: RequestId, token: SessionToken) -> Result<()> {
        let mut stream = self.shared.requests.lock().remove(&request).ok_or_else(|| {
            RcmdError::Transport(format!("unknown connect request {:?}", request))
        })?;

        stream.set_write_timeout(self.write_timeout)?;
        write_frame(&mut stream, &Frame::Welcome)?;
        establish(
            &self.shared,
            &self.events_tx,
            stream,
            token,
            self.write_timeout,
            |connection| TransportEvent::AcceptCompleted { connection, token },
        )?;
        Ok(())
    }

    fn reject(&mut self, request: RequestId) -> Result<()> {
        let mut stream = self.shared.requests.lock().remove(&request).ok_or_else(|| {
            RcmdError::Transport(format!("unknown connect request {:?}", request))
        })?;

        let refused = Frame::Refused {
            reason: "rejected by server".to_string(),
        };
        if let Err(e) = write_frame(&mut stream, &refused) {
            tracing::debug!("Could not deliver rejection: {}", e);
        }
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        data: Bytes,
        context: u64,
        flags: SendFlags,
    ) -> Result<SendOutcome> {
        let token = {
            let mut connections = self.shared.connections.lock();
            let conn = connections.get_mut(&connection).ok_or_else(|| {
                RcmdError::Transport(format!("send on unknown connection {}", connection))
            })?;
            write_frame(&mut conn.stream, &Frame::Data(data.to_vec())).map_err(|e| {
                RcmdError::Transport(format!("send on {} failed: {}", connection, e))
            })?;
            conn.token
        };

        if flags.blocking {
            return Ok(SendOutcome::Completed);
        }

        self.events_tx
            .send(TransportEvent::SendCompleted {
                connection,
                token,
                context,
                status: SendStatus::Ok,
            })
            .map_err(|e| RcmdError::Transport(e.to_string()))?;
        Ok(SendOutcome::Pending)
    }

    fn disconnect(&mut self, connection: ConnectionId) -> Result<()> {
        // Removing the entry first tells the reader thread the close was local
        let removed = self.shared.connections.lock().remove(&connection);
        if let Some(mut conn) = removed {
            let _ = write_frame(&mut conn.stream, &Frame::Bye);
            let _ = conn.stream.shutdown(Shutdown::Both);
            tracing::debug!("Disconnected {}", connection);
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TransportEvent>> {
        match self.events_rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(RcmdError::Transport("event queue closed".to_string()))
            }
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<Option<TransportEvent>> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RcmdError::Transport("event queue closed".to_string()))
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        for (_, mut conn) in self.shared.connections.lock().drain() {
            let _ = write_frame(&mut conn.stream, &Frame::Bye);
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
    }
}

// =============================================================================
// Background work
// =============================================================================

/// Open a TCP stream and run the Hello/Welcome handshake
fn dial(
    addr: &str,
    attribute: ConnAttribute,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<TcpStream> {
    let socket_addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| RcmdError::Transport(format!("cannot resolve {}", addr)))?;

    let mut stream = TcpStream::connect_timeout(&socket_addr, timeout)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;

    write_frame(&mut stream, &Frame::Hello { attribute, payload })?;
    match read_frame(&mut stream)? {
        Frame::Welcome => {
            stream.set_read_timeout(None)?;
            Ok(stream)
        }
        Frame::Refused { reason } => Err(RcmdError::Transport(format!(
            "rejected by peer: {}",
            reason
        ))),
        other => Err(RcmdError::Transport(format!(
            "unexpected handshake frame: {:?}",
            other
        ))),
    }
}

/// Register an established stream, announce it, then start its reader
fn establish<F>(
    shared: &Arc<Shared>,
    events: &Sender<TransportEvent>,
    stream: TcpStream,
    token: SessionToken,
    write_timeout: Option<Duration>,
    announce: F,
) -> Result<ConnectionId>
where
    F: FnOnce(ConnectionId) -> TransportEvent,
{
    stream.set_nodelay(true)?;
    stream.set_write_timeout(write_timeout)?;
    let reader = stream.try_clone()?;
    let connection = ConnectionId(shared.next_id());

    shared
        .connections
        .lock()
        .insert(connection, TcpConnection { stream, token });
    events
        .send(announce(connection))
        .map_err(|e| RcmdError::Transport(e.to_string()))?;

    let shared = Arc::clone(shared);
    let events = events.clone();
    thread::Builder::new()
        .name(format!("rcmd-reader-{}", connection.0))
        .spawn(move || read_loop(shared, events, reader, connection, token))?;

    Ok(connection)
}

fn read_loop(
    shared: Arc<Shared>,
    events: Sender<TransportEvent>,
    stream: TcpStream,
    connection: ConnectionId,
    token: SessionToken,
) {
    let mut reader = BufReader::new(stream);

    let reason = loop {
        match read_frame(&mut reader) {
            Ok(Frame::Data(data)) => {
                let event = TransportEvent::DataReceived {
                    connection,
                    token,
                    data: Bytes::from(data),
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            Ok(Frame::Bye) => break None,
            Ok(other) => break Some(format!("unexpected frame: {:?}", other)),
            Err(RcmdError::Io(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break None,
            Err(e) => break Some(e.to_string()),
        }
    };

    // A local disconnect has already removed the entry and needs no event
    let remote_close = shared.connections.lock().remove(&connection).is_some();
    if remote_close {
        tracing::debug!("Connection {} closed by peer ({:?})", connection, reason);
        let _ = events.send(TransportEvent::Closed {
            connection,
            token,
            reason,
        });
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, events: Sender<TransportEvent>) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = Arc::clone(&shared);
                let events = events.clone();
                let spawned = thread::Builder::new()
                    .name("rcmd-hello".to_string())
                    .spawn(move || {
                        if let Err(e) = receive_hello(&shared, &events, stream) {
                            tracing::warn!("Dropping connection from {}: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    tracing::warn!("Could not spawn handshake thread: {}", e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_BACKOFF),
            Err(e) => {
                tracing::warn!("Accept failed: {}", e);
                thread::sleep(ACCEPT_BACKOFF);
            }
        }
    }
    tracing::debug!("Acceptor stopped");
}

/// Read the Hello from a new inbound stream and queue a connect request
fn receive_hello(
    shared: &Shared,
    events: &Sender<TransportEvent>,
    mut stream: TcpStream,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HELLO_TIMEOUT))?;

    let (attribute, payload) = match read_frame(&mut stream)? {
        Frame::Hello { attribute, payload } => (attribute, payload),
        other => {
            return Err(RcmdError::Transport(format!(
                "expected Hello, got {:?}",
                other
            )))
        }
    };
    stream.set_read_timeout(None)?;

    let request = RequestId(shared.next_id());
    shared.requests.lock().insert(request, stream);
    events
        .send(TransportEvent::ConnectRequest {
            request,
            attribute,
            payload: Bytes::from(payload),
        })
        .map_err(|e| RcmdError::Transport(e.to_string()))?;
    Ok(())
}
