//! Big-endian framing primitives shared by the command and data channels.
//!
//! Decoding helpers work on a `&[u8]` cursor and return `None` until the
//! buffer holds the complete field, so callers can accumulate bytes and
//! re-attempt without ever observing a partial read. The cursor is only
//! advanced on success.

use bytes::{Buf, BufMut, BytesMut};

/// Maximum length of a `u16`-prefixed short block.
pub const MAX_SHORT_BLOCK: usize = u16::MAX as usize;

/// Write a `u16` length prefix followed by the bytes themselves.
pub fn put_short_block(buf: &mut BytesMut, bytes: &[u8]) {
    debug_assert!(bytes.len() <= MAX_SHORT_BLOCK);
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

/// Incremental mirror of [`put_short_block`].
///
/// Returns `None` until the cursor holds both the prefix and the full block.
pub fn get_short_block(cur: &mut &[u8]) -> Option<Vec<u8>> {
    if cur.remaining() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([cur[0], cur[1]]) as usize;
    if cur.remaining() < 2 + len {
        return None;
    }
    cur.advance(2);
    let mut out = vec![0u8; len];
    cur.copy_to_slice(&mut out);
    Some(out)
}

/// Take exactly `n` bytes from the cursor, or `None` if fewer are buffered.
pub fn get_exact(cur: &mut &[u8], n: usize) -> Option<Vec<u8>> {
    if cur.remaining() < n {
        return None;
    }
    let mut out = vec![0u8; n];
    cur.copy_to_slice(&mut out);
    Some(out)
}
