//! Error taxonomy for the wire-protocol engine.

use std::fmt;

/// The kind of failure that produced a [`RedisError`], independent of its
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// TCP connect failed: DNS failure, refused, timed out.
    ConnectError,
    /// The peer closed the socket, or a local I/O error tore it down.
    ConnectionClosed,
    /// The parser could not make sense of the byte stream.
    ProtocolError,
    /// The server replied with a RESP `-` error.
    ServerError,
    /// A reply's type was incompatible with the caller's requested return kind.
    ProjectionError,
    /// The caller misused a command (e.g. `SUBSCRIBE` with no arguments).
    UsageError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConnectError => "connect error",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::ProtocolError => "protocol error",
            ErrorKind::ServerError => "server error",
            ErrorKind::ProjectionError => "projection error",
            ErrorKind::UsageError => "usage error",
        };
        f.write_str(s)
    }
}

/// An error surfaced to a command's sink or to `Client::start`/`Client::stop`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RedisError {
    kind: ErrorKind,
    message: String,
}

impl RedisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RedisError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_connection_closed(&self) -> bool {
        self.kind == ErrorKind::ConnectionClosed
    }
}

impl From<std::io::Error> for RedisError {
    fn from(err: std::io::Error) -> Self {
        RedisError::new(ErrorKind::ConnectionClosed, err.to_string())
    }
}

pub type RedisResult<T> = Result<T, RedisError>;
