//! Message definitions
//!
//! A message is one framed unit on the wire, tagged by kind.

use bytes::Bytes;

use super::{Command, Reply, ReplyKind};

/// Body of every Quit message
pub const QUIT_SENTINEL: [u8; 4] = *b"QUIT";

/// Message kind tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Touch = 0x00,
    TouchReply = 0x01,
    Write = 0x02,
    WriteReply = 0x03,
    Quit = 0x04,
    Raw = 0x05,
}

impl MessageKind {
    /// Map a tag byte back to its kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(MessageKind::Touch),
            0x01 => Some(MessageKind::TouchReply),
            0x02 => Some(MessageKind::Write),
            0x03 => Some(MessageKind::WriteReply),
            0x04 => Some(MessageKind::Quit),
            0x05 => Some(MessageKind::Raw),
            _ => None,
        }
    }
}

/// A framed protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Touch or Write request
    Command(Command),

    /// Result of a Touch or Write
    Reply(Reply),

    /// Termination sentinel
    Quit,

    /// Opaque payload (burst traffic and its echo)
    Raw(Bytes),
}

impl Message {
    /// Get the message kind
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Command(Command::Touch { .. }) => MessageKind::Touch,
            Message::Command(Command::Write { .. }) => MessageKind::Write,
            Message::Reply(reply) => match reply.kind {
                ReplyKind::Touch => MessageKind::TouchReply,
                ReplyKind::Write => MessageKind::WriteReply,
            },
            Message::Quit => MessageKind::Quit,
            Message::Raw(_) => MessageKind::Raw,
        }
    }

    /// Build a Raw message
    pub fn raw(payload: impl Into<Bytes>) -> Self {
        Message::Raw(payload.into())
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}
