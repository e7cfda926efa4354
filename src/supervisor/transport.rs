//! Capability surface of the protocol client the supervisor drives.
//!
//! The protocol client (handshake, framing, stanza semantics) lives
//! outside this crate. The supervisor only needs to open a session,
//! authenticate it, push opaque payloads through it and hear about
//! inbound events.

use crate::types::{Credential, EventKind};
use std::io;

/// Callback the session invokes for each decoded inbound event.
pub type EventCallback<E> = Box<dyn Fn(E) + Send + Sync>;

/// One live protocol connection.
pub trait Session: Send + Sync + 'static {
    /// Decoded inbound event handed to observers.
    type Event: Send + Sync + 'static;

    fn authenticate(&self, credential: &Credential) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    /// Write one already-framed payload.
    fn send(&self, payload: &[u8]) -> io::Result<()>;

    fn close(&self) -> io::Result<()>;

    /// Register the handler for one kind of inbound event, replacing any
    /// previous handler for that kind.
    fn on_event(&self, kind: EventKind, handler: EventCallback<Self::Event>);

    /// Whether `destination` has agreed to receive from us.
    fn is_peer_ready(&self, _destination: &str) -> bool {
        true
    }
}

/// Opens sessions.
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    fn connect(&self, host: &str, port: u16) -> io::Result<Self::Session>;
}
