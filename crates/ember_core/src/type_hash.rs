//! Stable type identities derived from declared type names
//!
//! A [`TypeHash`] is the wire format between host and script code: both sides
//! hash the same declared name and arrive at the same 32-bit value without
//! sharing any runtime state.

use core::fmt;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a declared type name
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHash(u32);

impl TypeHash {
    /// Hash a declared name. Usable in const context.
    pub const fn of_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Wrap a hash received from the other side of the boundary
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw 32-bit value
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#010x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<&str> for TypeHash {
    fn from(name: &str) -> Self {
        Self::of_name(name)
    }
}
