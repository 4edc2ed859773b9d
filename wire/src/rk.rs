//! Routing keys: short length-prefixed identifiers for exchanges, routes,
//! and senders.

use std::fmt;

/// Maximum routing key length in bytes.
pub const MAX_RK_LEN: usize = 127;

/// A routing key of at most 127 bytes.
///
/// Constructed from a string or byte slice; longer inputs are silently
/// truncated to the first 127 bytes. Immutable once constructed.
#[derive(Clone, Copy)]
pub struct Rk {
    name: [u8; MAX_RK_LEN],
    len: u8,
}

impl Rk {
    /// Build a routing key from a string, truncating to 127 bytes.
    pub fn new(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }

    /// Build a routing key from raw bytes, truncating to 127 bytes.
    pub fn from_bytes(input: &[u8]) -> Self {
        let len = input.len().min(MAX_RK_LEN);
        let mut name = [0u8; MAX_RK_LEN];
        name[..len].copy_from_slice(&input[..len]);
        Self {
            name,
            len: len as u8,
        }
    }

    /// The key's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.name[..self.len as usize]
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for the zero-length key.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Rk {
    fn default() -> Self {
        Self {
            name: [0u8; MAX_RK_LEN],
            len: 0,
        }
    }
}

impl PartialEq for Rk {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Rk {}

impl fmt::Display for Rk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for Rk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rk({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl From<&str> for Rk {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
