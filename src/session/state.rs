//! Session state machine

use std::fmt;

use super::{ConnAttribute, Role, SessionToken};
use crate::error::{RcmdError, Result};
use crate::protocol::MessageKind;
use crate::transport::ConnectionId;

/// Lifecycle states for both roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    // Client only
    Idle,
    Connecting,
    Draining,
    Terminating,

    // Server only
    Listening,
    AcceptPending,

    // Both
    Connected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Draining => "draining",
            SessionState::Terminating => "terminating",
            SessionState::Listening => "listening",
            SessionState::AcceptPending => "accept-pending",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One logical connection between client and server
#[derive(Debug)]
pub struct Session {
    role: Role,
    state: SessionState,
    token: SessionToken,

    /// Transport handle, bound once the connection is established
    connection: Option<ConnectionId>,

    attribute: ConnAttribute,

    /// Every state this session has been in, oldest first
    history: Vec<SessionState>,
}

impl Session {
    /// Create a client session in `Idle`
    pub fn new_client(token: SessionToken, attribute: ConnAttribute) -> Self {
        Self::with_state(Role::Client, SessionState::Idle, token, attribute)
    }

    /// Create a server session in `Listening`
    pub fn new_server(token: SessionToken, attribute: ConnAttribute) -> Self {
        Self::with_state(Role::Server, SessionState::Listening, token, attribute)
    }

    fn with_state(
        role: Role,
        state: SessionState,
        token: SessionToken,
        attribute: ConnAttribute,
    ) -> Self {
        Self {
            role,
            state,
            token,
            connection: None,
            attribute,
            history: vec![state],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn attribute(&self) -> ConnAttribute {
        self.attribute
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Check if a state transition is valid for this session's role
    pub fn can_transition(&self, to: SessionState) -> bool {
        use SessionState::*;

        match (self.role, self.state, to) {
            (_, Closed, _) => false,

            // Client lifecycle
            (Role::Client, Idle, Connecting | Closed) => true,
            (Role::Client, Connecting, Connected | Closed) => true,
            (Role::Client, Connected, Draining | Closed) => true,
            (Role::Client, Draining, Terminating | Closed) => true,
            (Role::Client, Terminating, Closed) => true,

            // Server lifecycle
            (Role::Server, Listening, AcceptPending | Closed) => true,
            (Role::Server, AcceptPending, Connected | Listening | Closed) => true,
            (Role::Server, Connected, Closed) => true,

            _ => false,
        }
    }

    /// Transition to a new state
    ///
    /// Returns `InvalidState` if the transition is not allowed from the
    /// current state.
    pub fn transition_to(&mut self, to: SessionState) -> Result<()> {
        if !self.can_transition(to) {
            return Err(RcmdError::invalid_state(
                format!("transition to {}", to),
                self.state,
            ));
        }

        tracing::debug!(
            "Session {} ({:?}) transition: {} -> {}",
            self.token,
            self.role,
            self.state,
            to
        );

        self.state = to;
        self.history.push(to);
        if to == SessionState::Closed {
            self.connection = None;
        }
        Ok(())
    }

    /// Bind the transport handle delivered by connect/accept completion
    pub fn bind(&mut self, connection: ConnectionId) {
        self.connection = Some(connection);
    }

    /// Check that an event's token belongs to this session
    pub fn verify_token(&self, token: SessionToken) -> Result<()> {
        if token != self.token {
            return Err(RcmdError::Integrity(format!(
                "event token {} does not match session token {}",
                token, self.token
            )));
        }
        Ok(())
    }

    /// Check that a message of `kind` may be sent now
    ///
    /// Sends require `Connected`; the Quit sentinel is additionally allowed
    /// while `Draining`. Returns the connection to send on.
    pub fn require_sendable(&self, kind: MessageKind) -> Result<ConnectionId> {
        let allowed = match self.state {
            SessionState::Connected => true,
            SessionState::Draining => kind == MessageKind::Quit,
            _ => false,
        };

        match (allowed, self.connection) {
            (true, Some(connection)) => Ok(connection),
            _ => Err(RcmdError::invalid_state(
                format!("send {:?}", kind),
                self.state,
            )),
        }
    }

    /// Move to `Closed` from whatever state the session is in
    ///
    /// Returns the connection that was bound, if any. Idempotent.
    pub fn close(&mut self) -> Option<ConnectionId> {
        if self.is_closed() {
            return None;
        }
        let connection = self.connection.take();
        self.state = SessionState::Closed;
        self.history.push(SessionState::Closed);
        tracing::debug!("Session {} ({:?}) closed", self.token, self.role);
        connection
    }
}
