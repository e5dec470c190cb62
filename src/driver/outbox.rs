//! Outbound submission queue
//!
//! Lets a producer thread hand messages to the polling thread without
//! touching session state. The polling thread drains the queue between events.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::error::{RcmdError, Result};
use crate::protocol::Command;

/// Work a producer can submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Command(Command),
    Raw(Bytes),
}

/// Result of checking the queue
#[derive(Debug, PartialEq, Eq)]
pub enum OutboxPoll {
    Item(Outbound),
    Empty,

    /// Every sender has been dropped and the queue is empty
    Closed,
}

/// Producer half; cheap to clone and `Send`
#[derive(Clone)]
pub struct OutboxSender {
    tx: Sender<Outbound>,
}

impl OutboxSender {
    pub fn submit(&self, item: Outbound) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| RcmdError::Transport("driver is no longer accepting submissions".to_string()))
    }

    pub fn touch(&self, path: impl Into<String>) -> Result<()> {
        self.submit(Outbound::Command(Command::touch(path)))
    }

    pub fn write(&self, path: impl Into<String>, offset: u64, data: impl Into<Bytes>) -> Result<()> {
        self.submit(Outbound::Command(Command::write(path, offset, data)))
    }
}

/// Consumer half, owned by the polling thread
pub struct Outbox {
    rx: Receiver<Outbound>,
}

impl Outbox {
    pub fn try_next(&self) -> OutboxPoll {
        match self.rx.try_recv() {
            Ok(item) => OutboxPoll::Item(item),
            Err(TryRecvError::Empty) => OutboxPoll::Empty,
            Err(TryRecvError::Disconnected) => OutboxPoll::Closed,
        }
    }
}

/// Create a connected sender/outbox pair
pub fn outbox() -> (OutboxSender, Outbox) {
    let (tx, rx) = channel::unbounded();
    (OutboxSender { tx }, Outbox { rx })
}
