//! Reply definitions
//!
//! Represents the result of executing a command.

use super::CommandType;

/// Touch status for a file that already existed and was left untouched
pub const TOUCH_EXISTED: i64 = 1;

/// Which command a reply answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Touch,
    Write,
}

impl From<CommandType> for ReplyKind {
    fn from(command_type: CommandType) -> Self {
        match command_type {
            CommandType::Touch => ReplyKind::Touch,
            CommandType::Write => ReplyKind::Write,
        }
    }
}

/// A reply sent back to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,

    /// 0 = success, negative = OS error code, bytes written for Write
    pub status: i64,
}

impl Reply {
    /// Create a Touch reply
    pub fn touch(status: i64) -> Self {
        Self {
            kind: ReplyKind::Touch,
            status,
        }
    }

    /// Create a Write reply
    pub fn write(status: i64) -> Self {
        Self {
            kind: ReplyKind::Write,
            status,
        }
    }

    /// True when the status is not an error code
    pub fn is_success(&self) -> bool {
        self.status >= 0
    }
}
