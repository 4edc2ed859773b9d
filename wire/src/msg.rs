//! The message model and the data-channel frame codec.

use crate::buf::{get_exact, get_short_block, put_short_block};
use crate::error::WireError;
use crate::rk::{Rk, MAX_RK_LEN};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of hop slots carried by every peer-mode frame.
pub const MAX_HOPS: usize = 32;

/// Ceiling on a single payload the decoder will accept (64 MiB).
pub const HARD_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// A 16-byte opaque message identifier.
///
/// The blob is stored in native byte order and never interpreted by the
/// client beyond random initialization; the broker rewrites the full value
/// on receipt. Word-sized views are host-local.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct MsgId(pub [u8; 16]);

impl MsgId {
    /// Set the low 8 bytes from two native-order words.
    pub fn set_u32(&mut self, u1: u32, u2: u32) {
        self.0[0..4].copy_from_slice(&u1.to_ne_bytes());
        self.0[4..8].copy_from_slice(&u2.to_ne_bytes());
    }

    /// Set the low 8 bytes from one native-order word.
    pub fn set_u64(&mut self, u1: u64) {
        self.0[0..8].copy_from_slice(&u1.to_ne_bytes());
    }

    /// View the id as four native-order 32-bit words.
    pub fn get_u32(&self) -> (u32, u32, u32, u32) {
        let w = |i: usize| u32::from_ne_bytes(self.0[i..i + 4].try_into().unwrap());
        (w(0), w(4), w(8), w(12))
    }

    /// View the id as two native-order 64-bit words.
    pub fn get_u64(&self) -> (u64, u64) {
        let w = |i: usize| u64::from_ne_bytes(self.0[i..i + 8].try_into().unwrap());
        (w(0), w(8))
    }
}

impl fmt::Debug for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgId(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

/// A single fq message.
///
/// Immutable after construction by the publisher and after receipt by the
/// consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Broker path, one 32-bit slot per hop. Zeroed on client-built messages.
    pub hops: [u32; MAX_HOPS],
    /// Routing key the broker matched.
    pub route: Rk,
    /// Originating sender.
    pub sender: Rk,
    /// Exchange the message was published to.
    pub exchange: Rk,
    /// Opaque message identifier; low 8 bytes randomized at construction.
    pub sender_msgid: MsgId,
    /// Opaque payload bytes.
    pub payload: Bytes,
    /// Ingest timestamp; carried on the wire in peer mode only.
    pub arrival_time: u64,
}

impl Message {
    /// Build a new message for publishing, randomizing the low 8 bytes of
    /// its id from OS entropy.
    pub fn new(exchange: &str, route: &str, payload: Bytes) -> Self {
        let mut sender_msgid = MsgId::default();
        rand::thread_rng().fill_bytes(&mut sender_msgid.0[..8]);
        Self {
            hops: [0u32; MAX_HOPS],
            route: Rk::new(route),
            sender: Rk::default(),
            exchange: Rk::new(exchange),
            sender_msgid,
            payload,
            arrival_time: 0,
        }
    }
}

/// Encode one message frame.
///
/// Peer mode prepends the hop array and arrival timestamp; both modes carry
/// the exchange/sender/route keys, the raw message id, and the
/// length-prefixed payload.
pub fn encode_msg(buf: &mut BytesMut, msg: &Message, peer_mode: bool) {
    if peer_mode {
        buf.put_u16(MAX_HOPS as u16);
        for hop in &msg.hops {
            buf.put_u32(*hop);
        }
        buf.put_u64(msg.arrival_time);
    }
    put_short_block(buf, msg.exchange.as_bytes());
    put_short_block(buf, msg.sender.as_bytes());
    put_short_block(buf, msg.route.as_bytes());
    buf.put_slice(&msg.sender_msgid.0);
    buf.put_u32(msg.payload.len() as u32);
    buf.put_slice(&msg.payload);
}

/// Incremental decoder for inbound message frames.
///
/// `decode` returns `Ok(None)` until the buffer holds a complete frame; the
/// buffer is only advanced when a whole message parses. EOF with a non-empty
/// buffer is the caller's signal for [`WireError::Truncated`].
#[derive(Debug)]
pub struct MsgDecoder {
    peer_mode: bool,
}

impl MsgDecoder {
    /// Create a decoder for the given data-channel mode.
    pub fn new(peer_mode: bool) -> Self {
        Self { peer_mode }
    }

    /// Decode one message from the front of `buf`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, WireError> {
        let total = buf.len();
        let mut cur: &[u8] = &buf[..];

        let mut hops = [0u32; MAX_HOPS];
        let mut arrival_time = 0u64;
        if self.peer_mode {
            if cur.remaining() < 2 {
                return Ok(None);
            }
            let nhops = u16::from_be_bytes([cur[0], cur[1]]) as usize;
            if nhops > MAX_HOPS {
                return Err(WireError::Malformed);
            }
            if cur.remaining() < 2 + nhops * 4 + 8 {
                return Ok(None);
            }
            cur.advance(2);
            for slot in hops.iter_mut().take(nhops) {
                *slot = cur.get_u32();
            }
            arrival_time = cur.get_u64();
        }

        let Some(exchange) = get_short_block(&mut cur) else {
            return Ok(None);
        };
        let Some(sender) = get_short_block(&mut cur) else {
            return Ok(None);
        };
        let Some(route) = get_short_block(&mut cur) else {
            return Ok(None);
        };
        for rk in [&exchange, &sender, &route] {
            if rk.len() > MAX_RK_LEN {
                return Err(WireError::Malformed);
            }
        }

        let Some(id_bytes) = get_exact(&mut cur, 16) else {
            return Ok(None);
        };
        if cur.remaining() < 4 {
            return Ok(None);
        }
        let payload_len = cur.get_u32() as usize;
        if payload_len > HARD_MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadSize(payload_len));
        }
        if cur.remaining() < payload_len {
            return Ok(None);
        }

        // Commit: split the consumed prefix off the buffer and hand the
        // payload out zero-copy.
        let consumed_header = total - cur.remaining();
        buf.advance(consumed_header);
        let payload = buf.split_to(payload_len).freeze();

        let mut sender_msgid = MsgId::default();
        sender_msgid.0.copy_from_slice(&id_bytes);

        if !self.peer_mode {
            arrival_time = unix_nanos();
        }

        Ok(Some(Message {
            hops,
            route: Rk::from_bytes(&route),
            sender: Rk::from_bytes(&sender),
            exchange: Rk::from_bytes(&exchange),
            sender_msgid,
            payload,
            arrival_time,
        }))
    }
}

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
