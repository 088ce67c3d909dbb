//! KeyedSlots: structural layer mapping resource keys to stable slots.
//!
//! Entries live in a generational `SlotMap`; a `HashTable` of slot keys
//! indexes them by `ResourceKey`. The key digest is already a hash, so it is
//! used as the table hash directly and nothing is ever re-hashed. A `Slot`
//! stays valid until its entry is removed and never aliases a later entry.

use crate::key::ResourceKey;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};

/// Stable position of one entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Slot(DefaultKey);

#[derive(Debug)]
struct Entry<V> {
    key: ResourceKey,
    value: V,
}

pub struct KeyedSlots<V> {
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>, // storage using generational keys
}

#[cfg(any(test, feature = "bench_internal"))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InsertError {
    DuplicateKey,
}

impl<V> Default for KeyedSlots<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedSlots<V> {
    pub fn new() -> Self {
        Self {
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    #[cfg(any(test, feature = "bench_internal"))]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, key: ResourceKey) -> Option<Slot> {
        self.index
            .find(key.digest(), |&k| {
                self.slots.get(k).map(|e| e.key == key).unwrap_or(false)
            })
            .map(|&k| Slot(k))
    }

    pub fn contains_key(&self, key: ResourceKey) -> bool {
        self.find(key).is_some()
    }

    /// Insert under a key that must not be present yet.
    #[cfg(any(test, feature = "bench_internal"))]
    pub fn insert(&mut self, key: ResourceKey, value: V) -> Result<Slot, InsertError> {
        match self.index.entry(
            key.digest(),
            |&kk| self.slots.get(kk).map(|e| e.key == key).unwrap_or(false),
            |&kk| self.slots.get(kk).map(|e| e.key.digest()).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateKey),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(Entry { key, value });
                let _ = v.insert(k);
                Ok(Slot(k))
            }
        }
    }

    /// Slot of `key`, inserting `default()` first when absent. `default` only
    /// runs on insertion.
    pub fn find_or_insert_with<F>(&mut self, key: ResourceKey, default: F) -> Slot
    where
        F: FnOnce() -> V,
    {
        match self.index.entry(
            key.digest(),
            |&kk| self.slots.get(kk).map(|e| e.key == key).unwrap_or(false),
            |&kk| self.slots.get(kk).map(|e| e.key.digest()).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => Slot(*o.get()),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let value = default();
                let k = self.slots.insert(Entry { key, value });
                let _ = v.insert(k);
                Slot(k)
            }
        }
    }

    pub fn get(&self, slot: Slot) -> Option<&V> {
        self.slots.get(slot.0).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut V> {
        self.slots.get_mut(slot.0).map(|e| &mut e.value)
    }

    #[cfg(any(test, feature = "bench_internal"))]
    pub fn key_of(&self, slot: Slot) -> Option<ResourceKey> {
        self.slots.get(slot.0).map(|e| e.key)
    }

    /// Unlink and return the entry. The caller decides when the value drops.
    pub fn remove(&mut self, slot: Slot) -> Option<(ResourceKey, V)> {
        let entry = self.slots.remove(slot.0)?;
        let _ = self
            .index
            .find_entry(entry.key.digest(), |&kk| kk == slot.0)
            .map(|o| o.remove());
        Some((entry.key, entry.value))
    }

    /// Unlink every entry matching `pred` and return them in slot order.
    pub fn extract_if<F>(&mut self, mut pred: F) -> Vec<(ResourceKey, V)>
    where
        F: FnMut(ResourceKey, &V) -> bool,
    {
        let doomed: Vec<Slot> = self
            .slots
            .iter()
            .filter(|(_, e)| pred(e.key, &e.value))
            .map(|(k, _)| Slot(k))
            .collect();
        doomed.into_iter().filter_map(|s| self.remove(s)).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Slot, ResourceKey, &V)> {
        self.slots.iter().map(|(k, e)| (Slot(k), e.key, &e.value))
    }
}
