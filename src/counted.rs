//! CountedSlots: per-slot reference counting atop KeyedSlots using tokens.
//!
//! The count lives beside the value in the same slot. Registering and
//! releasing references only needs `&self`; removing an entry is left to the
//! caller, which knows the entry's lifetime policy.

use crate::key::ResourceKey;
use crate::slots::{KeyedSlots, Slot};
use crate::tokens::{RefCount, Token};

#[derive(Debug)]
struct Counted<V> {
    refcount: RefCount,
    value: V,
}

pub struct CountedSlots<V> {
    inner: KeyedSlots<Counted<V>>,
}

/// One registered reference on a slot, carrying a linear token that must be
/// handed back through `CountedSlots::release`.
pub(crate) struct Reference {
    slot: Slot,
    token: Token,
}

impl Reference {
    #[inline]
    pub(crate) fn slot(&self) -> Slot {
        self.slot
    }
}

impl<V> Default for CountedSlots<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CountedSlots<V> {
    pub fn new() -> Self {
        Self {
            inner: KeyedSlots::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn find(&self, key: ResourceKey) -> Option<Slot> {
        self.inner.find(key)
    }

    pub fn contains_key(&self, key: ResourceKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Slot of `key`, inserting an unreferenced `default()` when absent.
    pub fn find_or_insert_with<F>(&mut self, key: ResourceKey, default: F) -> Slot
    where
        F: FnOnce() -> V,
    {
        self.inner.find_or_insert_with(key, || Counted {
            refcount: RefCount::new(),
            value: default(),
        })
    }

    /// Register one more reference on a live slot.
    pub(crate) fn acquire(&self, slot: Slot) -> Reference {
        let entry = self
            .inner
            .get(slot)
            .expect("CountedSlots::acquire(): slot must refer to a live entry");
        Reference {
            slot,
            token: entry.refcount.get(),
        }
    }

    /// Return a reference. True when it was the last one; the entry stays
    /// in place either way.
    pub(crate) fn release(&self, r: Reference) -> bool {
        let Reference { slot, token } = r;
        let entry = self
            .inner
            .get(slot)
            .expect("CountedSlots::release(): referenced entry must still be live");
        entry.refcount.put(token)
    }

    /// Live references on `slot`; zero for dead slots.
    pub fn refcount(&self, slot: Slot) -> usize {
        self.inner.get(slot).map(|c| c.refcount.count()).unwrap_or(0)
    }

    pub fn get(&self, slot: Slot) -> Option<&V> {
        self.inner.get(slot).map(|c| &c.value)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut V> {
        self.inner.get_mut(slot).map(|c| &mut c.value)
    }

    /// Unlink an unreferenced entry and return it.
    pub fn remove(&mut self, slot: Slot) -> Option<(ResourceKey, V)> {
        assert_eq!(
            self.refcount(slot),
            0,
            "CountedSlots::remove(): entry is still referenced"
        );
        self.inner.remove(slot).map(|(k, c)| (k, c.value))
    }

    /// Unlink every entry for which `pred(key, value, refcount)` holds.
    pub fn extract_if<F>(&mut self, mut pred: F) -> Vec<(ResourceKey, V)>
    where
        F: FnMut(ResourceKey, &V, usize) -> bool,
    {
        self.inner
            .extract_if(|k, c| pred(k, &c.value, c.refcount.count()))
            .into_iter()
            .map(|(k, c)| {
                assert_eq!(
                    c.refcount.count(),
                    0,
                    "CountedSlots::extract_if(): entry is still referenced"
                );
                (k, c.value)
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, ResourceKey, &V, usize)> {
        self.inner
            .iter()
            .map(|(s, k, c)| (s, k, &c.value, c.refcount.count()))
    }
}
