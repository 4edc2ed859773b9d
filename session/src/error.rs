//! Session error types.

use fq_wire::WireError;
use thiserror::Error;

/// Errors raised by the session engines and the public API.
///
/// `Io`, `Wire`, `Protocol`, `Auth`, and `Heartbeat` are fatal to the current
/// connection: the engine stores the error text, invokes the error-log hook,
/// and tears down; the supervisor then reconnects. `Usage` errors are
/// returned synchronously to the caller and touch no connection.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Socket failure
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Framing failure
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Unexpected or mismatched reply, oversized session key
    #[error("{0}")]
    Protocol(String),

    /// Authentication rejected or unintelligible
    #[error("auth: {0}")]
    Auth(String),

    /// No heartbeat within the configured maximum age
    #[error("dead: missing heartbeat")]
    Heartbeat,

    /// API misuse, reported to the caller without touching the connection
    #[error("usage: {0}")]
    Usage(String),
}
