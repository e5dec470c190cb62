//! Driver Module
//!
//! Event dispatch loops that own the sessions.
//!
//! ## Architecture
//! - One driver per endpoint; the driver is the only code that mutates
//!   session state
//! - `pump` handles every event available right now (single-threaded polling)
//! - `run` waits on the transport between polls until the work is done
//! - Producers on other threads go through the [`Outbox`]
//!
//! ## Client Phases
//! ```text
//! burst:     send N Raw payloads (and anything submitted to the outbox)
//! drain:     wait until every send completed and every echo/reply arrived
//! terminate: send Quit, wait for its completion, disconnect, drain events
//! ```

mod client;
mod server;
mod outbox;

pub use client::{burst_payload, ClientDriver, ClientReport, QUIT_CONTEXT};
pub use server::{ServerDriver, ServerStats, ECHO_PREFIX};
pub use outbox::{outbox, Outbound, Outbox, OutboxPoll, OutboxSender};
