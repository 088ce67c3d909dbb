//! Hashed resource names.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

/// Opaque identifier of a named resource.
///
/// A key is the 64-bit SipHash digest of the name. The name itself is not
/// kept, so two names with the same digest address the same entry. The
/// digest is stable for the lifetime of the process, not across toolchains.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(u64);

impl ResourceKey {
    /// Hash `name` into a key.
    pub fn new(name: &str) -> Self {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        Self(h.finish())
    }

    /// Wrap an already computed digest.
    pub const fn from_digest(digest: u64) -> Self {
        Self(digest)
    }

    /// The raw digest. Used directly as the index hash by the slot layer.
    #[inline]
    pub const fn digest(self) -> u64 {
        self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for ResourceKey {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceKey {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({:#018x})", self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
