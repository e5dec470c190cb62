//! Server Driver
//!
//! Accepts sessions, executes commands against the [`CommandExecutor`] and
//! echoes raw payloads back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::Config;
use crate::error::{RcmdError, Result};
use crate::executor::CommandExecutor;
use crate::protocol::{decode_message_with_limit, encode_message, Message};
use crate::session::{ConnAttribute, Session, SessionState, SessionToken};
use crate::transport::{
    ConnectionId, RequestId, SendFlags, SendStatus, Transport, TransportEvent,
};

/// Prefix the server puts in front of echoed raw payloads
pub const ECHO_PREFIX: &[u8] = b"data:";

/// Server counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: usize,
    pub rejected: usize,
    pub closed: usize,
    pub commands_executed: usize,
    pub raw_echoed: usize,
    pub malformed: usize,
    pub integrity_faults: usize,
    pub invalid_state: usize,
}

/// Owns every server-side session and dispatches transport events to them
pub struct ServerDriver<T: Transport> {
    transport: T,
    executor: CommandExecutor,
    config: Config,

    /// Sessions accepted but not yet completed, keyed by token
    pending: HashMap<SessionToken, Session>,

    /// Established sessions, keyed by connection
    sessions: HashMap<ConnectionId, Session>,

    stats: ServerStats,
    shutdown: Arc<AtomicBool>,
    next_context: u64,
}

impl<T: Transport> ServerDriver<T> {
    pub fn new(transport: T, executor: CommandExecutor, config: Config) -> Self {
        Self {
            transport,
            executor,
            config,
            pending: HashMap::new(),
            sessions: HashMap::new(),
            stats: ServerStats::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            next_context: 0,
        }
    }

    /// Start listening; returns the URI clients connect to
    pub fn listen(&mut self) -> Result<String> {
        let uri = self.transport.listen()?;
        tracing::info!("Opened {}", uri);
        Ok(uri)
    }

    /// Flag that stops `run` at the next poll interval
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Dispatch every event that is ready now
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        while let Some(event) = self.transport.poll()? {
            self.dispatch(event);
            handled += 1;
        }
        Ok(handled)
    }

    /// Serve until shut down
    ///
    /// With `exit_after_session` set, also returns once a session has closed
    /// and none remain.
    pub fn run(&mut self) -> Result<ServerStats> {
        let interval = self.config.poll_interval();

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Some(event) = self.transport.wait(interval)? {
                self.dispatch(event);
            }

            if self.config.exit_after_session
                && self.stats.closed > 0
                && self.sessions.is_empty()
                && self.pending.is_empty()
            {
                tracing::info!("Session finished, exiting");
                break;
            }
        }

        tracing::info!(
            "Server stopped: {} accepted, {} rejected, {} commands",
            self.stats.accepted,
            self.stats.rejected,
            self.stats.commands_executed
        );
        Ok(self.stats.clone())
    }

    fn dispatch(&mut self, event: TransportEvent) {
        let name = event.name();
        if let Err(e) = self.handle_event(event) {
            if matches!(e, RcmdError::InvalidState { .. }) {
                self.stats.invalid_state += 1;
            }
            if e.is_session_fatal() {
                tracing::warn!("Session dropped while handling {}: {}", name, e);
            } else {
                tracing::warn!("Error handling {}: {}", name, e);
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        tracing::trace!("Server event: {}", event.name());

        match event {
            TransportEvent::ConnectRequest {
                request,
                attribute,
                payload,
            } => self.on_connect_request(request, attribute, &payload),
            TransportEvent::AcceptCompleted { connection, token } => {
                self.on_accept_completed(connection, token)
            }
            TransportEvent::DataReceived {
                connection,
                token,
                data,
            } => self.on_data(connection, token, &data),
            TransportEvent::SendCompleted {
                connection,
                token,
                context,
                status,
            } => {
                let Some(session) = self.sessions.get(&connection) else {
                    tracing::debug!("Send completion for closed {}", connection);
                    return Ok(());
                };
                if let Err(e) = session.verify_token(token) {
                    self.stats.integrity_faults += 1;
                    self.close_session(connection);
                    return Err(e);
                }
                if let SendStatus::Failed(reason) = status {
                    tracing::warn!("send {} on {} failed: {}", context, connection, reason);
                    self.close_session(connection);
                }
                Ok(())
            }
            TransportEvent::Closed {
                connection,
                token,
                reason,
            } => {
                let Some(mut session) = self.sessions.remove(&connection) else {
                    tracing::debug!("Closed event for unknown {}", connection);
                    return Ok(());
                };
                if session.verify_token(token).is_err() {
                    self.stats.integrity_faults += 1;
                }
                session.close();
                self.stats.closed += 1;
                tracing::info!(
                    "Session {} closed by peer{}",
                    session.token(),
                    reason.map(|r| format!(": {}", r)).unwrap_or_default()
                );
                Ok(())
            }
            other => {
                tracing::debug!("Ignoring event {}", other.name());
                Ok(())
            }
        }
    }

    // =========================================================================
    // Connection setup
    // =========================================================================

    fn admits_new_session(&self) -> bool {
        self.config.accept_connections
            && self.sessions.len() + self.pending.len() < self.config.max_sessions
    }

    fn on_connect_request(
        &mut self,
        request: RequestId,
        attribute: ConnAttribute,
        payload: &[u8],
    ) -> Result<()> {
        let token = SessionToken::allocate();
        let mut session = Session::new_server(token, attribute);
        session.transition_to(SessionState::AcceptPending)?;

        tracing::info!(
            "Connect request ({}) with payload {:?}",
            attribute,
            String::from_utf8_lossy(payload)
        );

        if !self.admits_new_session() {
            self.transport.reject(request)?;
            session.transition_to(SessionState::Listening)?;
            self.stats.rejected += 1;
            tracing::info!("Rejected connect request {:?}", request);
            return Ok(());
        }

        self.transport.accept(request, token)?;
        self.pending.insert(token, session);
        Ok(())
    }

    fn on_accept_completed(&mut self, connection: ConnectionId, token: SessionToken) -> Result<()> {
        let Some(mut session) = self.pending.remove(&token) else {
            self.stats.integrity_faults += 1;
            if let Err(e) = self.transport.disconnect(connection) {
                tracing::debug!("Disconnect of {} failed: {}", connection, e);
            }
            return Err(RcmdError::Integrity(format!(
                "accept completion for unknown session {}",
                token
            )));
        };

        session.bind(connection);
        session.transition_to(SessionState::Connected)?;
        self.sessions.insert(connection, session);
        self.stats.accepted += 1;

        tracing::info!("Session {} connected on {}", token, connection);
        Ok(())
    }

    // =========================================================================
    // Data
    // =========================================================================

    fn on_data(&mut self, connection: ConnectionId, token: SessionToken, data: &[u8]) -> Result<()> {
        let Some(session) = self.sessions.get(&connection) else {
            tracing::debug!("Dropping data for closed {}", connection);
            return Ok(());
        };
        if let Err(e) = session.verify_token(token) {
            self.stats.integrity_faults += 1;
            self.close_session(connection);
            return Err(e);
        }

        let message = match decode_message_with_limit(data, self.config.max_payload_size) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                self.close_session(connection);
                return Err(e);
            }
        };

        match message {
            Message::Command(command) => {
                let reply = self.executor.execute(&command);
                self.stats.commands_executed += 1;
                tracing::info!(
                    "{:?} {:?} -> status {}",
                    command.command_type(),
                    command.path(),
                    reply.status
                );
                self.reply(connection, Message::Reply(reply))
            }
            Message::Raw(payload) => {
                tracing::debug!("received {:?}", String::from_utf8_lossy(&payload));
                if !self.config.echo_raw {
                    return Ok(());
                }
                let mut echo = BytesMut::with_capacity(ECHO_PREFIX.len() + payload.len());
                echo.put_slice(ECHO_PREFIX);
                echo.put_slice(&payload);
                self.stats.raw_echoed += 1;
                self.reply(connection, Message::Raw(echo.freeze()))
            }
            Message::Quit => {
                tracing::info!("Quit received on {}", connection);
                self.close_session(connection);
                Ok(())
            }
            Message::Reply(reply) => {
                self.stats.malformed += 1;
                self.close_session(connection);
                Err(RcmdError::Malformed(format!(
                    "unexpected {:?} reply from client",
                    reply.kind
                )))
            }
        }
    }

    fn reply(&mut self, connection: ConnectionId, message: Message) -> Result<()> {
        let kind = message.kind();
        let sendable = match self.sessions.get(&connection) {
            Some(session) => session.require_sendable(kind),
            None => return Ok(()),
        };
        let connection = sendable?;

        let context = self.next_context;
        self.next_context += 1;

        let data: Bytes = encode_message(&message);
        if let Err(e) = self
            .transport
            .send(connection, data, context, SendFlags::default())
        {
            self.close_session(connection);
            return Err(e);
        }
        Ok(())
    }

    /// Close and forget a session, telling the transport to disconnect
    fn close_session(&mut self, connection: ConnectionId) {
        let Some(mut session) = self.sessions.remove(&connection) else {
            return;
        };

        session.close();
        if let Err(e) = self.transport.disconnect(connection) {
            tracing::debug!("Disconnect of {} failed: {}", connection, e);
        }
        self.stats.closed += 1;
        tracing::info!("Session {} closed", session.token());
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Connections of every established session
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
