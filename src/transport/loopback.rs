//! Loopback Transport
//!
//! In-memory transport: endpoints registered on a shared hub exchange
//! events through per-endpoint queues. Deterministic, so drivers can be
//! pumped side by side on one thread.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{
    ConnectionId, RequestId, SendFlags, SendOutcome, SendStatus, Transport, TransportEvent,
};
use crate::error::{RcmdError, Result};
use crate::session::{ConnAttribute, SessionToken};

/// URI scheme accepted (and stripped) by `connect`
const SCHEME: &str = "loop://";

/// Shared registry of loopback endpoints
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    queues: HashMap<String, VecDeque<TransportEvent>>,
    listening: HashSet<String>,
    requests: HashMap<RequestId, PendingConnect>,
    halves: HashMap<ConnectionId, Half>,
    next_id: u64,
}

struct PendingConnect {
    client: String,
    token: SessionToken,
    deadline: Instant,
}

/// One side of an established connection
struct Half {
    owner: String,
    token: SessionToken,
    peer: ConnectionId,
}

impl HubState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn push(&mut self, owner: &str, event: TransportEvent) {
        self.queues.entry(owner.to_string()).or_default().push_back(event);
    }

    /// Turn expired connect attempts by `client` into rejections
    fn expire(&mut self, client: &str, now: Instant) {
        let expired: Vec<RequestId> = self
            .requests
            .iter()
            .filter(|(_, pending)| pending.client == client && pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(pending) = self.requests.remove(&id) {
                self.push(
                    client,
                    TransportEvent::ConnectRejected {
                        token: pending.token,
                        reason: "connect timed out".to_string(),
                    },
                );
            }
        }
    }
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint called `name`
    pub fn endpoint(&self, name: impl Into<String>) -> LoopbackTransport {
        let name = name.into();
        self.state.lock().queues.entry(name.clone()).or_default();
        LoopbackTransport {
            name,
            state: Arc::clone(&self.state),
        }
    }
}

/// One endpoint on a [`LoopbackHub`]
pub struct LoopbackTransport {
    name: String,
    state: Arc<Mutex<HubState>>,
}

impl LoopbackTransport {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an event for this endpoint as if the hub had produced it
    pub fn inject(&self, event: TransportEvent) {
        self.state.lock().push(&self.name, event);
    }

    /// Number of events waiting for this endpoint
    pub fn pending_events(&self) -> usize {
        self.state
            .lock()
            .queues
            .get(&self.name)
            .map_or(0, VecDeque::len)
    }
}

impl Transport for LoopbackTransport {
    fn connect(
        &mut self,
        target: &str,
        attribute: ConnAttribute,
        payload: &[u8],
        token: SessionToken,
        timeout: Duration,
    ) -> Result<()> {
        let target = target.strip_prefix(SCHEME).unwrap_or(target);
        let mut state = self.state.lock();

        if !state.listening.contains(target) {
            state.push(
                &self.name,
                TransportEvent::ConnectRejected {
                    token,
                    reason: format!("no listener at {}", target),
                },
            );
            return Ok(());
        }

        let request = RequestId(state.next_id());
        state.requests.insert(
            request,
            PendingConnect {
                client: self.name.clone(),
                token,
                deadline: Instant::now() + timeout,
            },
        );
        state.push(
            target,
            TransportEvent::ConnectRequest {
                request,
                attribute,
                payload: Bytes::copy_from_slice(payload),
            },
        );
        Ok(())
    }

    fn listen(&mut self) -> Result<String> {
        self.state.lock().listening.insert(self.name.clone());
        Ok(format!("{}{}", SCHEME, self.name))
    }

    fn accept(&mut self, request: RequestId, token: SessionToken) -> Result<()> {
        let mut state = self.state.lock();
        let pending = state.requests.remove(&request).ok_or_else(|| {
            RcmdError::Transport(format!("unknown connect request {:?}", request))
        })?;

        let client_side = ConnectionId(state.next_id());
        let server_side = ConnectionId(state.next_id());
        state.halves.insert(
            client_side,
            Half {
                owner: pending.client.clone(),
                token: pending.token,
                peer: server_side,
            },
        );
        state.halves.insert(
            server_side,
            Half {
                owner: self.name.clone(),
                token,
                peer: client_side,
            },
        );

        state.push(
            &self.name,
            TransportEvent::AcceptCompleted {
                connection: server_side,
                token,
            },
        );
        state.push(
            &pending.client,
            TransportEvent::ConnectAccepted {
                connection: client_side,
                token: pending.token,
            },
        );
        Ok(())
    }

    fn reject(&mut self, request: RequestId) -> Result<()> {
        let mut state = self.state.lock();
        let pending = state.requests.remove(&request).ok_or_else(|| {
            RcmdError::Transport(format!("unknown connect request {:?}", request))
        })?;

        state.push(
            &pending.client,
            TransportEvent::ConnectRejected {
                token: pending.token,
                reason: "rejected by peer".to_string(),
            },
        );
        Ok(())
    }

    fn send(
        &mut self,
        connection: ConnectionId,
        data: Bytes,
        context: u64,
        flags: SendFlags,
    ) -> Result<SendOutcome> {
        let mut state = self.state.lock();
        let (token, peer) = match state.halves.get(&connection) {
            Some(half) => (half.token, half.peer),
            None => {
                return Err(RcmdError::Transport(format!(
                    "send on unknown connection {}",
                    connection
                )))
            }
        };

        if let Some(peer_half) = state.halves.get(&peer) {
            let (owner, peer_token) = (peer_half.owner.clone(), peer_half.token);
            state.push(
                &owner,
                TransportEvent::DataReceived {
                    connection: peer,
                    token: peer_token,
                    data,
                },
            );
        }

        if flags.blocking {
            return Ok(SendOutcome::Completed);
        }

        state.push(
            &self.name,
            TransportEvent::SendCompleted {
                connection,
                token,
                context,
                status: SendStatus::Ok,
            },
        );
        Ok(SendOutcome::Pending)
    }

    fn disconnect(&mut self, connection: ConnectionId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(half) = state.halves.remove(&connection) else {
            return Ok(());
        };

        if let Some(peer_half) = state.halves.remove(&half.peer) {
            state.push(
                &peer_half.owner,
                TransportEvent::Closed {
                    connection: half.peer,
                    token: peer_half.token,
                    reason: None,
                },
            );
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TransportEvent>> {
        let mut state = self.state.lock();
        state.expire(&self.name, Instant::now());
        Ok(state
            .queues
            .get_mut(&self.name)
            .and_then(VecDeque::pop_front))
    }
}
