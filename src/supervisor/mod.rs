//! Supervision of the single live connection to the server.
//!
//! The supervisor owns the session opened through a [`Connector`] and is
//! the only component allowed to write to it. It provides:
//! - Single-flight connect (a concurrent caller skips instead of waiting)
//! - Explicit disable/enable of automatic reconnects
//! - Retry with backoff around transient I/O failures
//! - Re-registration of inbound event callbacks and status after each
//!   connect

mod connection;
mod service;
mod transport;

pub use connection::{ConnectOutcome, ConnectionState, ConnectionSupervisor, SessionEvent};
pub use service::ServiceSlot;
pub use transport::{Connector, EventCallback, Session};
