//! Session Module
//!
//! Per-connection lifecycle tracking.
//!
//! ## Lifecycles
//! ```text
//! Client: Idle → Connecting → Connected → Draining → Terminating → Closed
//! Server: Listening → AcceptPending → Connected → Closed
//!                        └──(reject)──→ Listening
//! ```
//!
//! Every session carries a [`SessionToken`] handed to the transport at
//! connect/accept time. Events that come back with a different token are
//! integrity faults.

mod state;
mod counters;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::RcmdError;

pub use state::{Session, SessionState};
pub use counters::BurstCounters;

/// Which end of the connection a session represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Delivery guarantees requested for a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnAttribute {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    UnreliableUnordered,
}

impl ConnAttribute {
    /// Short selector used on the command line
    pub fn selector(&self) -> &'static str {
        match self {
            ConnAttribute::ReliableOrdered => "ro",
            ConnAttribute::ReliableUnordered => "ru",
            ConnAttribute::UnreliableUnordered => "uu",
        }
    }
}

impl FromStr for ConnAttribute {
    type Err = RcmdError;

    /// Case-insensitive; only the first two characters are significant
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selector = s.get(..2).unwrap_or(s).to_ascii_lowercase();
        match selector.as_str() {
            "ro" => Ok(ConnAttribute::ReliableOrdered),
            "ru" => Ok(ConnAttribute::ReliableUnordered),
            "uu" => Ok(ConnAttribute::UnreliableUnordered),
            _ => Err(RcmdError::Config(format!(
                "unknown connection type '{}' (expected RO, RU or UU)",
                s
            ))),
        }
    }
}

impl fmt::Display for ConnAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.selector().to_ascii_uppercase())
    }
}

/// Opaque per-session context token, compared by value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl SessionToken {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Allocate a process-unique token
    pub fn allocate() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
