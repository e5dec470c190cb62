//! Executor Module
//!
//! Server-side interpreter that turns decoded commands into filesystem effects.
//!
//! ## Responsibilities
//! - Confine every command path to the configured root
//! - Touch: create (or truncate) files
//! - Write: positional writes that preserve existing content
//! - Report results as reply status codes; failures never escape as errors
//!
//! ## Write Semantics
//! The target is opened without truncation. Writing at an offset beyond the
//! current end of file leaves a hole that reads back as zero bytes.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::error::{RcmdError, Result};
use crate::protocol::{Command, Reply, ReplyKind, TOUCH_EXISTED};

/// What Touch does when the file already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TouchMode {
    /// Leave the file alone and reply with `TOUCH_EXISTED`
    #[default]
    Create,

    /// Truncate the file to zero length and reply with 0
    Truncate,
}

/// Executes commands beneath a fixed root directory
pub struct CommandExecutor {
    /// Canonical confinement root
    root: PathBuf,

    touch_mode: TouchMode,

    sync_writes: bool,
}

impl CommandExecutor {
    /// Open an executor for the root in `config`, creating the root if needed
    pub fn open(config: &Config) -> Result<Self> {
        fs::create_dir_all(&config.root_dir)?;
        let root = fs::canonicalize(&config.root_dir)?;

        tracing::info!("Executor root: {}", root.display());

        Ok(Self {
            root,
            touch_mode: config.touch_mode,
            sync_writes: config.sync_writes,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified root directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().root_dir(path).build();
        Self::open(&config)
    }

    /// Execute a command
    ///
    /// Always produces a reply; errors become negative status codes.
    pub fn execute(&self, command: &Command) -> Reply {
        let kind = ReplyKind::from(command.command_type());

        let result = match command {
            Command::Touch { path } => self.touch(path),
            Command::Write {
                path,
                offset,
                length,
                data,
            } => self.write(path, *offset, *length, data),
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("{:?} on {:?} failed: {}", kind, command.path(), e);
                e.os_code()
            }
        };

        Reply { kind, status }
    }

    /// Create an empty file, or handle an existing one per `TouchMode`
    pub fn touch(&self, path: &str) -> Result<i64> {
        let target = self.resolve(path)?;

        match self.touch_mode {
            TouchMode::Create => {
                match OpenOptions::new().write(true).create_new(true).open(&target) {
                    Ok(_) => {
                        tracing::debug!("Created {}", target.display());
                        Ok(0)
                    }
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(TOUCH_EXISTED),
                    Err(e) => Err(e.into()),
                }
            }
            TouchMode::Truncate => {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&target)?;
                tracing::debug!("Truncated {}", target.display());
                Ok(0)
            }
        }
    }

    /// Write `data` at `offset`, returning the number of bytes written
    pub fn write(&self, path: &str, offset: u64, length: u64, data: &[u8]) -> Result<i64> {
        // Nothing touches the filesystem unless the whole command is consistent
        if length != data.len() as u64 {
            return Err(RcmdError::Malformed(format!(
                "write length {} does not match {} data bytes",
                length,
                data.len()
            )));
        }
        if offset.checked_add(length).map_or(true, |end| end > i64::MAX as u64) {
            return Err(RcmdError::Malformed(format!(
                "write range {}+{} out of bounds",
                offset, length
            )));
        }

        let target = self.resolve(path)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&target)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.flush()?;
        if self.sync_writes {
            file.sync_data()?;
        }

        tracing::debug!(
            "Wrote {} bytes at offset {} to {}",
            data.len(),
            offset,
            target.display()
        );
        Ok(data.len() as i64)
    }

    /// Resolve a client-supplied path to a location inside the root
    ///
    /// Rejects empty paths, NUL bytes, absolute paths and `..` components
    /// syntactically, then checks that symlinks along the way do not lead
    /// outside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(RcmdError::PathRefused("empty path".to_string()));
        }
        if path.contains('\0') {
            return Err(RcmdError::PathRefused(format!(
                "path contains NUL byte: {}",
                path.replace('\0', "\\0")
            )));
        }

        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(RcmdError::PathRefused(format!(
                        "path escapes root: {}",
                        path
                    )));
                }
            }
        }

        let parent = match resolved.parent() {
            Some(parent) if resolved != self.root => parent,
            _ => {
                return Err(RcmdError::PathRefused(format!(
                    "path names the root itself: {}",
                    path
                )))
            }
        };

        // The directory must really live under the root once symlinks are followed
        let real_parent = fs::canonicalize(parent)?;
        if !real_parent.starts_with(&self.root) {
            return Err(RcmdError::PathRefused(format!(
                "path escapes root through a symlink: {}",
                path
            )));
        }

        if let Ok(meta) = fs::symlink_metadata(&resolved) {
            if meta.file_type().is_symlink() {
                match fs::canonicalize(&resolved) {
                    Ok(real) if real.starts_with(&self.root) => {}
                    _ => {
                        return Err(RcmdError::PathRefused(format!(
                            "symlink leads outside root: {}",
                            path
                        )))
                    }
                }
            }
        }

        Ok(resolved)
    }

    /// Get the canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn touch_mode(&self) -> TouchMode {
        self.touch_mode
    }
}
