//! Wire protocol error types.

use thiserror::Error;

/// Errors produced while encoding or decoding fq wire traffic.
#[derive(Error, Debug)]
pub enum WireError {
    /// Peer closed the connection mid-frame
    #[error("truncated frame")]
    Truncated,

    /// Unknown command opcode
    #[error("protocol violation: {0:x}")]
    UnknownOpcode(u16),

    /// Unknown connection mode word
    #[error("unknown mode word {0:#010x}")]
    UnknownMode(u32),

    /// Session key longer than a routing key can hold
    #[error("session key too long: {0}")]
    KeyTooLong(usize),

    /// Bind program too long for a u16 length prefix
    #[error("program too long")]
    ProgramTooLong(usize),

    /// Payload length beyond the frame ceiling
    #[error("payload size limit exceeded: {0}")]
    PayloadSize(usize),

    /// Malformed frame structure
    #[error("malformed frame")]
    Malformed,
}
