//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Message Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Tag (1)  │ Len (4)  │            Body             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Tags
//! - 0x00: TOUCH       - Body: path_len (4) + path
//! - 0x01: TOUCH_REPLY - Body: status (8, signed)
//! - 0x02: WRITE       - Body: path_len (4) + path + offset (8) + length (8) + data
//! - 0x03: WRITE_REPLY - Body: status (8, signed)
//! - 0x04: QUIT        - Body: "QUIT"
//! - 0x05: RAW         - Body: opaque bytes
//!
//! All integers are big-endian. Nothing is NUL-terminated.

mod command;
mod reply;
mod message;
mod codec;

pub use command::{Command, CommandType};
pub use reply::{Reply, ReplyKind, TOUCH_EXISTED};
pub use message::{Message, MessageKind, QUIT_SENTINEL};
pub use codec::{
    decode_command, decode_message, decode_message_with_limit, encode_command, encode_message,
    HEADER_SIZE, MAX_PATH_LEN, MAX_PAYLOAD_SIZE,
};
