//! Command-channel codec: mode words, opcodes, client request encoders, and
//! the incremental server reply decoder.

use crate::buf::{get_exact, get_short_block, put_short_block, MAX_SHORT_BLOCK};
use crate::error::WireError;
use crate::rk::{Rk, MAX_RK_LEN};
use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};

/// Route id returned when the broker refuses a bind.
pub const ROUTE_REFUSED: u32 = 0xFFFF_FFFF;

/// Connection mode selector, written as the first four bytes of every
/// connection.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Command channel
    Command = 0xCC50_CAFE,
    /// Data channel (client)
    Data = 0xCC50_FACE,
    /// Data channel (inter-broker peering)
    Peer = 0xCC50_FEED,
    /// Legacy peering mode; accepted on decode, never selected by the client
    OldPeer = 0xCC50_FADE,
}

impl TryFrom<u32> for Mode {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0xCC50_CAFE => Ok(Mode::Command),
            0xCC50_FACE => Ok(Mode::Data),
            0xCC50_FEED => Ok(Mode::Peer),
            0xCC50_FADE => Ok(Mode::OldPeer),
            other => Err(WireError::UnknownMode(other)),
        }
    }
}

/// Command-channel opcodes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Fatal server-side error
    Error = 0xEEEE,
    /// Start of the authentication exchange
    AuthCmd = 0xAAAA,
    /// Plain-credential auth method
    AuthPlain = 0x0000,
    /// Successful auth reply carrying the session key
    AuthResp = 0xAA00,
    /// Heartbeat interval request
    HbReq = 0x4848,
    /// Heartbeat tick
    Hb = 0xBEA7,
    /// Bind request
    BindReq = 0xB170,
    /// Bind reply
    Bind = 0xB171,
    /// Unbind request
    UnbindReq = 0x071B,
    /// Unbind reply
    Unbind = 0x171B,
    /// Status reply
    Status = 0x57A7,
    /// Status request
    StatusReq = 0xC7A7,
}

bitflags! {
    /// Flags carried on a bind request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BindFlags: u16 {
        /// Bind on behalf of a peer broker
        const PEER = 0x0001;
        /// Transient binding, dropped with the session
        const TRANS = 0x0100;
        /// Permanent binding
        const PERM = 0x0110;
    }
}

/// Write a connection mode word.
pub fn put_mode(buf: &mut BytesMut, mode: Mode) {
    buf.put_u32(mode as u32);
}

/// Write the plain-credential authentication sequence.
///
/// The queue blob composes `queue`, a literal zero byte, and `queue_type`.
pub fn put_auth_plain(buf: &mut BytesMut, user: &[u8], queue: &[u8], queue_type: &[u8], pass: &[u8]) {
    buf.put_u16(Opcode::AuthCmd as u16);
    buf.put_u16(Opcode::AuthPlain as u16);
    put_short_block(buf, user);
    let mut composed = Vec::with_capacity(queue.len() + 1 + queue_type.len());
    composed.extend_from_slice(queue);
    composed.push(0);
    composed.extend_from_slice(queue_type);
    put_short_block(buf, &composed);
    put_short_block(buf, pass);
}

/// Write a heartbeat interval request.
pub fn put_hbreq(buf: &mut BytesMut, interval_ms: u16) {
    buf.put_u16(Opcode::HbReq as u16);
    buf.put_u16(interval_ms);
}

/// Write a heartbeat tick.
pub fn put_hb(buf: &mut BytesMut) {
    buf.put_u16(Opcode::Hb as u16);
}

/// Write a bind request. Fails before any bytes are written if the program
/// does not fit a `u16` length prefix.
pub fn put_bindreq(
    buf: &mut BytesMut,
    flags: BindFlags,
    exchange: &Rk,
    program: &[u8],
) -> Result<(), WireError> {
    if program.len() > MAX_SHORT_BLOCK {
        return Err(WireError::ProgramTooLong(program.len()));
    }
    buf.put_u16(Opcode::BindReq as u16);
    buf.put_u16(flags.bits());
    put_short_block(buf, exchange.as_bytes());
    put_short_block(buf, program);
    Ok(())
}

/// Write an unbind request.
pub fn put_unbindreq(buf: &mut BytesMut, route_id: u32, exchange: &Rk) {
    buf.put_u16(Opcode::UnbindReq as u16);
    buf.put_u32(route_id);
    put_short_block(buf, exchange.as_bytes());
}

/// Write a status request.
pub fn put_statusreq(buf: &mut BytesMut) {
    buf.put_u16(Opcode::StatusReq as u16);
}

/// Write the session key echo that joins a data connection to its
/// authenticated session.
pub fn put_session_key(buf: &mut BytesMut, key: &Rk) {
    put_short_block(buf, key.as_bytes());
}

/// One parsed server-to-client command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCmd {
    /// Inbound liveness tick
    Heartbeat,
    /// Bind reply carrying the assigned route id
    Bind(u32),
    /// Unbind reply carrying the success word
    Unbind(u32),
    /// Status reply: key/value pairs
    Status(Vec<(String, u32)>),
    /// Fatal server error
    Error,
}

/// Incremental decoder for server command frames.
///
/// `decode` returns `Ok(None)` until the buffer holds a complete frame; the
/// buffer is only advanced when a frame parses.
#[derive(Debug, Default)]
pub struct CmdDecoder;

impl CmdDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self
    }

    /// Decode one command from the front of `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ServerCmd>, WireError> {
        let total = buf.len();
        let mut cur: &[u8] = &buf[..];
        if cur.remaining() < 2 {
            return Ok(None);
        }
        let opcode = cur.get_u16();

        let cmd = match opcode {
            op if op == Opcode::Hb as u16 => ServerCmd::Heartbeat,
            op if op == Opcode::Bind as u16 => {
                if cur.remaining() < 4 {
                    return Ok(None);
                }
                ServerCmd::Bind(cur.get_u32())
            }
            op if op == Opcode::Unbind as u16 => {
                if cur.remaining() < 4 {
                    return Ok(None);
                }
                ServerCmd::Unbind(cur.get_u32())
            }
            op if op == Opcode::Status as u16 => {
                let mut vals = Vec::new();
                loop {
                    let Some(key) = get_short_block(&mut cur) else {
                        return Ok(None);
                    };
                    if key.is_empty() {
                        break;
                    }
                    if cur.remaining() < 4 {
                        return Ok(None);
                    }
                    let value = cur.get_u32();
                    vals.push((String::from_utf8_lossy(&key).into_owned(), value));
                }
                ServerCmd::Status(vals)
            }
            op if op == Opcode::Error as u16 => ServerCmd::Error,
            other => return Err(WireError::UnknownOpcode(other)),
        };

        buf.advance(total - cur.remaining());
        Ok(Some(cmd))
    }
}

/// Outcome of the authentication exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// Auth accepted; the broker issued this session key.
    Key(Vec<u8>),
    /// Auth refused with an error frame.
    Refused,
}

/// Incrementally decode the server's authentication reply.
pub fn decode_auth_reply(buf: &mut BytesMut) -> Result<Option<AuthReply>, WireError> {
    let total = buf.len();
    let mut cur: &[u8] = &buf[..];
    if cur.remaining() < 2 {
        return Ok(None);
    }
    let opcode = cur.get_u16();

    let reply = match opcode {
        op if op == Opcode::Error as u16 => AuthReply::Refused,
        op if op == Opcode::AuthResp as u16 => {
            if cur.remaining() < 2 {
                return Ok(None);
            }
            let klen = u16::from_be_bytes([cur[0], cur[1]]) as usize;
            if klen > MAX_RK_LEN {
                return Err(WireError::KeyTooLong(klen));
            }
            cur.advance(2);
            let Some(key) = get_exact(&mut cur, klen) else {
                return Ok(None);
            };
            AuthReply::Key(key)
        }
        other => return Err(WireError::UnknownOpcode(other)),
    };

    buf.advance(total - cur.remaining());
    Ok(Some(reply))
}
