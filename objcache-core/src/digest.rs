//! Request-fingerprint digests.
//!
//! A [`Digest`] is the 256-bit fingerprint of method + host + URL + vary
//! inputs that keys the hash index (`objcache-index`). Computing the digest
//! itself (hashing headers, normalizing the URL) is out of scope for this
//! crate; callers hand us the finished bytes.

use std::fmt;

/// A 256-bit request fingerprint.
///
/// `Digest` is `Copy` so it can be handed to the index, the expiry engine
/// and tracing spans without cloning a `Vec`. It implements [`Hash`](std::hash::Hash)
/// directly over its bytes, so a [`dashmap::DashMap<Digest, _>`](https://docs.rs/dashmap)
/// keyed index does not need a secondary hasher pass over already-hashed input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wraps raw digest bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    /// Returns the raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(")?;
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        write!(f, "..)")
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
