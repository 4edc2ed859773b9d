//! Wire framing, message model, and command codec for the fq broker protocol.
//!
//! This crate provides the codec layer shared by both halves of an fq client
//! session: the command channel (authentication, bind/unbind/status RPCs,
//! heartbeats) and the data channel (message frames). It operates purely on
//! in-memory buffers; socket I/O lives in `fq-session`.
//!
//! ## Wire format
//!
//! All length prefixes, opcodes, route ids, flags, mode words, and counters
//! are big-endian. The single exception is the 16-byte message id, which is
//! an opaque blob stored in native byte order and never interpreted on the
//! wire.
//!
//! Data-channel message frame (client mode):
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 exchange_len     | exchange routing key       |
//! +----------------------+----------------------------+
//! | u16 sender_len       | sender routing key         |
//! +----------------------+----------------------------+
//! | u16 route_len        | route routing key          |
//! +----------------------+----------------------------+
//! | message id (16B)     | opaque, native byte order  |
//! +----------------------+----------------------------+
//! | u32 payload_len      | payload bytes              |
//! +----------------------+----------------------------+
//! ```
//!
//! Peer mode prepends `u16 hop_count`, a fixed 32-slot hop array, and a
//! `u64` arrival timestamp.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buf;
pub mod cmd;
pub mod error;
pub mod msg;
pub mod rk;

pub use buf::{get_exact, get_short_block, put_short_block, MAX_SHORT_BLOCK};
pub use cmd::{
    decode_auth_reply, put_auth_plain, put_bindreq, put_hb, put_hbreq, put_mode, put_session_key,
    put_statusreq, put_unbindreq, AuthReply, BindFlags, CmdDecoder, Mode, Opcode, ServerCmd,
    ROUTE_REFUSED,
};
pub use error::WireError;
pub use msg::{encode_msg, Message, MsgDecoder, MsgId, HARD_MAX_PAYLOAD_SIZE, MAX_HOPS};
pub use rk::{Rk, MAX_RK_LEN};
