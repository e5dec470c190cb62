//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (1)  │ Len (4)  │            Body             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Body by Message Kind
//! - TOUCH:        path_len (4) + path
//! - WRITE:        path_len (4) + path + offset (8) + length (8) + data
//! - TOUCH_REPLY:  status (8)
//! - WRITE_REPLY:  status (8)
//! - QUIT:         "QUIT"
//! - RAW:          opaque bytes
//!
//! The declared body length must match the buffer exactly, and every body
//! must be consumed exactly by its fields.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Command, Message, MessageKind, Reply, QUIT_SENTINEL};
use crate::error::{RcmdError, Result};

/// Header size: 1 byte tag + 4 bytes body length
pub const HEADER_SIZE: usize = 5;

/// Maximum body size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum path length in bytes
pub const MAX_PATH_LEN: usize = 4095;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a message to bytes
///
/// Format: tag (1) + body_len (4) + body
pub fn encode_message(message: &Message) -> Bytes {
    let mut body = BytesMut::new();

    match message {
        Message::Command(command) => put_command(&mut body, command),
        Message::Reply(reply) => body.put_i64(reply.status),
        Message::Quit => body.put_slice(&QUIT_SENTINEL),
        Message::Raw(payload) => body.put_slice(payload),
    }

    frame(message.kind(), &body)
}

/// Encode a command to bytes
pub fn encode_command(command: &Command) -> Bytes {
    let mut body = BytesMut::new();
    put_command(&mut body, command);

    let kind = match command {
        Command::Touch { .. } => MessageKind::Touch,
        Command::Write { .. } => MessageKind::Write,
    };
    frame(kind, &body)
}

fn put_command(body: &mut BytesMut, command: &Command) {
    match command {
        Command::Touch { path } => put_path(body, path),
        Command::Write {
            path,
            offset,
            length,
            data,
        } => {
            body.reserve(4 + path.len() + 16 + data.len());
            put_path(body, path);
            body.put_u64(*offset);
            body.put_u64(*length);
            body.put_slice(data);
        }
    }
}

fn put_path(body: &mut BytesMut, path: &str) {
    body.put_u32(path.len() as u32);
    body.put_slice(path.as_bytes());
}

fn frame(kind: MessageKind, body: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(HEADER_SIZE + body.len());
    message.put_u8(kind as u8);
    message.put_u32(body.len() as u32);
    message.put_slice(body);
    message.freeze()
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a message from bytes using the default body limit
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    decode_message_with_limit(bytes, MAX_PAYLOAD_SIZE)
}

/// Decode a message from bytes, rejecting bodies larger than `max_payload`
///
/// `bytes` must hold exactly one message.
pub fn decode_message_with_limit(bytes: &[u8], max_payload: u32) -> Result<Message> {
    if bytes.len() < HEADER_SIZE {
        return Err(RcmdError::Malformed(format!(
            "Incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    // Parse header
    let mut header = &bytes[..HEADER_SIZE];
    let tag = header.get_u8();
    let body_len = header.get_u32() as usize;

    let kind = MessageKind::from_tag(tag).ok_or_else(|| {
        RcmdError::Malformed(format!("Unknown message tag: 0x{:02x}", tag))
    })?;

    if body_len > max_payload as usize {
        return Err(RcmdError::Malformed(format!(
            "Body too large: {} bytes (max {})",
            body_len, max_payload
        )));
    }

    let body = &bytes[HEADER_SIZE..];
    if body.len() < body_len {
        return Err(RcmdError::Malformed(format!(
            "Incomplete body: declared {} bytes, got {}",
            body_len,
            body.len()
        )));
    }
    if body.len() > body_len {
        return Err(RcmdError::Malformed(format!(
            "Trailing bytes: declared {} bytes, got {}",
            body_len,
            body.len()
        )));
    }

    let mut fields = FieldReader::new(kind, body);
    let message = match kind {
        MessageKind::Touch => {
            let path = fields.path()?;
            Message::Command(Command::Touch { path })
        }
        MessageKind::Write => decode_write(&mut fields)?,
        MessageKind::TouchReply => Message::Reply(Reply::touch(fields.i64("status")?)),
        MessageKind::WriteReply => Message::Reply(Reply::write(fields.i64("status")?)),
        MessageKind::Quit => {
            let sentinel = fields.take(QUIT_SENTINEL.len(), "sentinel")?;
            if sentinel != QUIT_SENTINEL {
                return Err(RcmdError::Malformed(format!(
                    "QUIT: bad sentinel {:02x?}",
                    sentinel
                )));
            }
            Message::Quit
        }
        MessageKind::Raw => Message::Raw(Bytes::copy_from_slice(fields.rest())),
    };
    fields.finish()?;

    Ok(message)
}

/// Decode a WRITE body
fn decode_write(fields: &mut FieldReader<'_>) -> Result<Message> {
    let path = fields.path()?;
    let offset = fields.u64("offset")?;
    let length = fields.u64("length")?;
    let data = fields.rest();

    if data.len() as u64 != length {
        return Err(RcmdError::Malformed(format!(
            "WRITE: declared length {} but carries {} bytes",
            length,
            data.len()
        )));
    }

    Ok(Message::Command(Command::Write {
        path,
        offset,
        length,
        data: Bytes::copy_from_slice(data),
    }))
}

/// Decode a command from bytes
///
/// Fails if the bytes hold a well-formed message that is not a command.
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    match decode_message(bytes)? {
        Message::Command(command) => Ok(command),
        other => Err(RcmdError::Malformed(format!(
            "Expected a command, got {:?}",
            other.kind()
        ))),
    }
}

/// Bounds-checked reader over one message body
struct FieldReader<'a> {
    kind: MessageKind,
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn new(kind: MessageKind, buf: &'a [u8]) -> Self {
        Self { kind, buf }
    }

    fn need(&self, n: usize, field: &str) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(RcmdError::Malformed(format!(
                "{:?}: truncated {} (need {} bytes, have {})",
                self.kind,
                field,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        self.need(4, field)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        self.need(8, field)?;
        Ok(self.buf.get_u64())
    }

    fn i64(&mut self, field: &str) -> Result<i64> {
        self.need(8, field)?;
        Ok(self.buf.get_i64())
    }

    fn take(&mut self, n: usize, field: &str) -> Result<&'a [u8]> {
        self.need(n, field)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Length-prefixed UTF-8 path of at most MAX_PATH_LEN bytes
    fn path(&mut self) -> Result<String> {
        let len = self.u32("path length")? as usize;
        if len > MAX_PATH_LEN {
            return Err(RcmdError::Malformed(format!(
                "{:?}: path length {} exceeds {}",
                self.kind, len, MAX_PATH_LEN
            )));
        }

        let raw = self.take(len, "path")?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| RcmdError::Malformed(format!("{:?}: path is not UTF-8: {}", self.kind, e)))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn finish(&self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(RcmdError::Malformed(format!(
                "{:?}: {} unexpected trailing bytes",
                self.kind,
                self.buf.len()
            )));
        }
        Ok(())
    }
}
