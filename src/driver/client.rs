//! Client Driver
//!
//! Runs one client session through connect, burst, drain and terminate.

use bytes::Bytes;

use super::outbox::{Outbound, Outbox, OutboxPoll};
use crate::config::Config;
use crate::error::{RcmdError, Result};
use crate::protocol::{decode_message_with_limit, encode_message, Message, MessageKind, Reply};
use crate::session::{BurstCounters, Session, SessionState, SessionToken};
use crate::transport::{ConnectionId, SendFlags, SendOutcome, SendStatus, Transport, TransportEvent};

/// Send context reserved for the Quit sentinel
pub const QUIT_CONTEXT: u64 = u64::MAX;

/// Payload of the `index`-th burst message
pub fn burst_payload(index: usize) -> Bytes {
    Bytes::from(format!("{:4}Hello World!", index))
}

/// What a finished client run observed
#[derive(Debug, Clone)]
pub struct ClientReport {
    /// Every lifecycle state the session passed through
    pub transitions: Vec<SessionState>,

    pub counters: BurstCounters,

    /// Replies to submitted commands, in arrival order
    pub replies: Vec<Reply>,

    /// Raw payloads echoed back by the server
    pub echoes: Vec<Bytes>,
}

impl ClientReport {
    /// True if the session went through the full terminate phase
    pub fn completed(&self) -> bool {
        self.transitions.contains(&SessionState::Terminating)
            && self.transitions.last() == Some(&SessionState::Closed)
    }
}

/// Drives a single client session over a transport
pub struct ClientDriver<T: Transport> {
    transport: T,
    config: Config,
    session: Session,
    counters: BurstCounters,

    /// `None` once there is no producer left to hear from
    outbox: Option<Outbox>,

    replies: Vec<Reply>,
    echoes: Vec<Bytes>,
    next_context: u64,
}

impl<T: Transport> ClientDriver<T> {
    pub fn new(transport: T, config: Config) -> Self {
        let session = Session::new_client(SessionToken::allocate(), config.attribute);
        let counters = BurstCounters::new(config.iterations);

        Self {
            transport,
            config,
            session,
            counters,
            outbox: None,
            replies: Vec::new(),
            echoes: Vec::new(),
            next_context: 0,
        }
    }

    /// Take outbound work from a producer thread as well as the burst
    ///
    /// The drain phase does not start until every sender has been dropped.
    pub fn with_outbox(mut self, outbox: Outbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Start connecting (`Idle -> Connecting`)
    pub fn connect(&mut self) -> Result<()> {
        self.session.transition_to(SessionState::Connecting)?;

        tracing::info!(
            "Connecting to {} ({})",
            self.config.server_uri,
            self.config.attribute
        );

        let result = self.transport.connect(
            &self.config.server_uri,
            self.config.attribute,
            &self.config.connect_payload,
            self.session.token(),
            self.config.connect_timeout(),
        );
        if let Err(e) = result {
            self.session.close();
            return Err(RcmdError::Transport(format!(
                "connect to {} failed: {}",
                self.config.server_uri, e
            )));
        }
        Ok(())
    }

    /// Handle every event that is ready now, advancing phases as it goes
    ///
    /// Returns the number of events handled.
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        while !self.session.is_closed() {
            let Some(event) = self.transport.poll()? else {
                break;
            };
            self.handle_event(event)?;
            self.advance()?;
            handled += 1;
        }
        self.advance()?;
        Ok(handled)
    }

    /// Connect (if still idle) and run until the session is closed
    pub fn run(&mut self) -> Result<ClientReport> {
        if self.session.state() == SessionState::Idle {
            self.connect()?;
        }

        let interval = self.config.poll_interval();
        while !self.session.is_closed() {
            if let Some(event) = self.transport.wait(interval)? {
                self.handle_event(event)?;
            }
            self.advance()?;
        }

        let report = self.report();
        if !report.completed() {
            tracing::warn!("Session ended before the terminate phase");
        }
        Ok(report)
    }

    /// Send a message on the session
    ///
    /// Fails with `InvalidState`, without touching the transport, unless the
    /// session is connected (or draining, for Quit).
    pub fn submit(&mut self, message: Message) -> Result<SendOutcome> {
        let kind = message.kind();
        let connection = self.session.require_sendable(kind)?;

        let context = if kind == MessageKind::Quit {
            QUIT_CONTEXT
        } else {
            let context = self.next_context;
            self.next_context += 1;
            context
        };

        let flags = SendFlags::blocking(self.config.blocking);
        let outcome = match self
            .transport
            .send(connection, encode_message(&message), context, flags)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Send of {:?} failed: {}", kind, e);
                self.abort(connection);
                return Err(e);
            }
        };

        let completed = outcome == SendOutcome::Completed;
        if kind == MessageKind::Quit {
            self.counters.quit_sent = true;
            self.counters.quit_acknowledged |= completed;
        } else {
            let expects_reply = match kind {
                MessageKind::Raw => self.config.expect_echo,
                MessageKind::Touch | MessageKind::Write => true,
                _ => false,
            };
            self.counters.record_send(expects_reply);
            if completed {
                tracing::debug!("send {} completed (blocking)", context);
                self.counters.record_completion();
            }
        }

        Ok(outcome)
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        tracing::trace!("Client event: {}", event.name());

        match event {
            TransportEvent::ConnectAccepted { connection, token } => {
                self.on_connect_accepted(connection, token)
            }
            TransportEvent::ConnectRejected { token, reason } => {
                self.check_token(token)?;
                if self.session.state() != SessionState::Connecting {
                    tracing::warn!(
                        "Ignoring connect-rejected while {}",
                        self.session.state()
                    );
                    return Ok(());
                }
                self.session.transition_to(SessionState::Closed)?;
                Err(RcmdError::Transport(format!(
                    "connect to {} failed: {}",
                    self.config.server_uri, reason
                )))
            }
            TransportEvent::SendCompleted {
                token,
                context,
                status,
                ..
            } => {
                self.check_token(token)?;
                if let SendStatus::Failed(reason) = status {
                    tracing::warn!("send {} failed: {}", context, reason);
                    self.abort_session();
                    return Err(RcmdError::Transport(format!(
                        "send {} failed: {}",
                        context, reason
                    )));
                }

                tracing::debug!("send {} completed", context);
                if context == QUIT_CONTEXT {
                    self.counters.quit_acknowledged = true;
                } else {
                    self.counters.record_completion();
                }
                Ok(())
            }
            TransportEvent::DataReceived { token, data, .. } => {
                self.check_token(token)?;
                self.on_data(&data)
            }
            TransportEvent::Closed { token, reason, .. } => {
                self.check_token(token)?;
                match reason {
                    Some(reason) => tracing::info!("Connection closed: {}", reason),
                    None => tracing::info!("Connection closed by peer"),
                }
                self.session.close();
                Ok(())
            }
            other => {
                tracing::debug!("Ignoring event {}", other.name());
                Ok(())
            }
        }
    }

    fn on_connect_accepted(&mut self, connection: ConnectionId, token: SessionToken) -> Result<()> {
        self.check_token(token)?;
        if self.session.state() != SessionState::Connecting {
            tracing::warn!(
                "Ignoring connect-accepted for {} while {}",
                connection,
                self.session.state()
            );
            return Ok(());
        }

        self.session.bind(connection);
        self.session.transition_to(SessionState::Connected)?;
        tracing::info!("Connected on {} (session {})", connection, token);
        Ok(())
    }

    fn on_data(&mut self, data: &[u8]) -> Result<()> {
        let message = match decode_message_with_limit(data, self.config.max_payload_size) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Malformed message from server: {}", e);
                self.abort_session();
                return Err(e);
            }
        };

        match message {
            Message::Raw(payload) => {
                tracing::debug!("received {:?}", String::from_utf8_lossy(&payload));
                self.counters.record_receive();
                self.echoes.push(payload);
            }
            Message::Reply(reply) => {
                tracing::info!("{:?} reply: status {}", reply.kind, reply.status);
                self.counters.record_receive();
                self.replies.push(reply);
            }
            Message::Quit => {
                tracing::info!("Server asked to quit");
                self.abort_session();
            }
            Message::Command(command) => {
                self.abort_session();
                return Err(RcmdError::Malformed(format!(
                    "unexpected {:?} command from server",
                    command.command_type()
                )));
            }
        }
        Ok(())
    }

    /// Fail the session if an event carries somebody else's token
    fn check_token(&mut self, token: SessionToken) -> Result<()> {
        if let Err(e) = self.session.verify_token(token) {
            tracing::warn!("{}", e);
            self.abort_session();
            return Err(e);
        }
        Ok(())
    }

    // =========================================================================
    // Phases
    // =========================================================================

    fn advance(&mut self) -> Result<()> {
        if self.session.state() == SessionState::Connected {
            while self.counters.burst_remaining() > 0 {
                let payload = burst_payload(self.counters.payloads_issued);
                self.submit(Message::Raw(payload))?;
                self.counters.payloads_issued += 1;
            }

            self.drain_outbox()?;

            if self.outbox.is_none() && self.counters.reconciled() {
                self.session.transition_to(SessionState::Draining)?;
                tracing::info!(
                    "Burst complete: {} sent, {} received; sending quit",
                    self.counters.sends_completed,
                    self.counters.receives
                );
                self.submit(Message::Quit)?;
            }
        }

        if self.session.state() == SessionState::Draining && self.counters.quit_acknowledged {
            self.terminate()?;
        }
        Ok(())
    }

    fn drain_outbox(&mut self) -> Result<()> {
        loop {
            let next = match &self.outbox {
                Some(outbox) => outbox.try_next(),
                None => return Ok(()),
            };

            match next {
                OutboxPoll::Item(Outbound::Command(command)) => {
                    self.submit(Message::Command(command))?;
                }
                OutboxPoll::Item(Outbound::Raw(payload)) => {
                    self.submit(Message::Raw(payload))?;
                }
                OutboxPoll::Empty => return Ok(()),
                OutboxPoll::Closed => {
                    tracing::debug!("Outbox closed");
                    self.outbox = None;
                    return Ok(());
                }
            }
        }
    }

    /// `Draining -> Terminating -> Closed`, draining queued events on the way
    fn terminate(&mut self) -> Result<()> {
        self.session.transition_to(SessionState::Terminating)?;

        if let Some(connection) = self.session.connection() {
            if let Err(e) = self.transport.disconnect(connection) {
                tracing::warn!("Disconnect failed: {}", e);
            }
        }

        // Completions already queued still get accounted for
        while let Some(event) = self.transport.poll()? {
            if let Err(e) = self.handle_event(event) {
                tracing::debug!("Ignoring error while draining: {}", e);
            }
        }

        if !self.session.is_closed() {
            self.session.transition_to(SessionState::Closed)?;
        }

        tracing::info!(
            "Session closed: {} sends completed, {} received",
            self.counters.sends_completed,
            self.counters.receives
        );
        Ok(())
    }

    fn abort_session(&mut self) {
        if let Some(connection) = self.session.connection() {
            self.abort(connection);
        } else {
            self.session.close();
        }
    }

    fn abort(&mut self, connection: ConnectionId) {
        self.session.close();
        if let Err(e) = self.transport.disconnect(connection) {
            tracing::debug!("Disconnect during abort failed: {}", e);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn counters(&self) -> &BurstCounters {
        &self.counters
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn report(&self) -> ClientReport {
        ClientReport {
            transitions: self.session.history().to_vec(),
            counters: self.counters.clone(),
            replies: self.replies.clone(),
            echoes: self.echoes.clone(),
        }
    }
}
