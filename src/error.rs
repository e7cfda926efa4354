//! Error types for the resilience layer.

use std::io;
use thiserror::Error;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid observer: {0}")]
    InvalidObserver(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Connections are disabled, call reconnect() to enable them again")]
    ConnectionDisabled,

    #[error("Connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("Authentication failed: {0}")]
    Auth(#[source] io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Already set: {0}")]
    AlreadySet(String),

    #[error("Not attached")]
    NotAttached,

    #[error("No service bound")]
    NoService,

    #[error("Transient I/O error after {attempts} attempts: {source}")]
    TransientIo {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    PermanentIo(#[source] io::Error),

    #[error("Observer failed: {0}")]
    Handler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Class of a recoverable I/O failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransientKind {
    /// Write side went away (broken pipe, EOF, no live session).
    BrokenPipe,
    /// Peer reset the connection.
    ConnectionReset,
}

impl TransientKind {
    /// Classify an I/O error. `None` means the error is permanent.
    pub fn classify(err: &io::Error) -> Option<Self> {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected => Some(TransientKind::BrokenPipe),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                Some(TransientKind::ConnectionReset)
            }
            _ => None,
        }
    }
}
