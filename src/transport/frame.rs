//! TCP transport framing
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Len (4)  │ CRC (4)  │   bincode(Frame) body       │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//! CRC32 covers the body only. Protocol messages travel opaquely inside
//! `Frame::Data`.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{RcmdError, Result};
use crate::protocol::{HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::session::ConnAttribute;

/// Frame header size: 4 bytes length + 4 bytes CRC32
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest frame body accepted: a maximal message plus serialization overhead
pub const MAX_FRAME_SIZE: u32 = MAX_PAYLOAD_SIZE + HEADER_SIZE as u32 + 64;

/// Transport-level frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame from a connecting client
    Hello {
        attribute: ConnAttribute,
        payload: Vec<u8>,
    },

    /// Server accepted the Hello
    Welcome,

    /// Server rejected the Hello
    Refused { reason: String },

    /// One protocol message
    Data(Vec<u8>),

    /// Orderly close
    Bye,
}

/// Serialize a frame and write it with its header
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let body = bincode::serialize(frame).map_err(|e| RcmdError::Serialization(e.to_string()))?;
    let checksum = crc32fast::hash(&body);

    let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&checksum.to_be_bytes());
    bytes.extend_from_slice(&body);

    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, verifying its size and checksum
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let body_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    if body_len > MAX_FRAME_SIZE {
        return Err(RcmdError::Transport(format!(
            "Frame too large: {} bytes (max {})",
            body_len, MAX_FRAME_SIZE
        )));
    }

    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body)?;

    let actual = crc32fast::hash(&body);
    if actual != checksum {
        return Err(RcmdError::Transport(format!(
            "Frame checksum mismatch: expected {:08x}, got {:08x}",
            checksum, actual
        )));
    }

    bincode::deserialize(&body).map_err(|e| RcmdError::Serialization(e.to_string()))
}
