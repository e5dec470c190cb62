//! Command definitions
//!
//! Represents the file-manipulation commands a client asks the server to run.

use bytes::Bytes;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Touch,
    Write,
}

/// A decoded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create (or truncate) a file relative to the server root
    Touch { path: String },

    /// Write `length` bytes of `data` at `offset`
    ///
    /// `length` travels on the wire separately from `data`; a value where the
    /// two disagree still encodes, and the decoder rejects it.
    Write {
        path: String,
        offset: u64,
        length: u64,
        data: Bytes,
    },
}

impl Command {
    /// Build a Touch command
    pub fn touch(path: impl Into<String>) -> Self {
        Command::Touch { path: path.into() }
    }

    /// Build a Write command whose declared length matches `data`
    pub fn write(path: impl Into<String>, offset: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Command::Write {
            path: path.into(),
            offset,
            length: data.len() as u64,
            data,
        }
    }

    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Touch { .. } => CommandType::Touch,
            Command::Write { .. } => CommandType::Write,
        }
    }

    /// The path this command operates on
    pub fn path(&self) -> &str {
        match self {
            Command::Touch { path } | Command::Write { path, .. } => path,
        }
    }
}
