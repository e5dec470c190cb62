//! # rcmd
//!
//! A remote file-command service over a connection-oriented message transport:
//! - Binary wire protocol for Touch/Write commands, replies, Quit and raw payloads
//! - Per-connection session state machines with token-checked events
//! - Server-side executor confined to a root directory
//! - Client burst/drain/terminate driver
//! - Loopback (in-memory) and TCP transports
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐                 ┌──────────────────────┐
//! │     ClientDriver     │                 │     ServerDriver     │
//! │  burst/drain/quit    │                 │  accept/dispatch     │
//! └──────────┬───────────┘                 └──────────┬───────────┘
//!            │  Session (client)          Session (server)  │
//!            │                                              │
//! ┌──────────▼───────────┐   Message bytes  ┌───────────────▼──────┐
//! │      Transport       │◄────────────────►│      Transport       │
//! │  (Loopback / TCP)    │                  │  (Loopback / TCP)    │
//! └──────────────────────┘                  └───────────────┬──────┘
//!                                                           │
//!                                                           ▼
//!                                                 ┌──────────────────┐
//!                                                 │ CommandExecutor  │
//!                                                 │  (confined root) │
//!                                                 └──────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod session;
pub mod executor;
pub mod transport;
pub mod driver;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RcmdError, Result};
pub use config::Config;
pub use executor::CommandExecutor;
pub use driver::{ClientDriver, ServerDriver};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of rcmd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
