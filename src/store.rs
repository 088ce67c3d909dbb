//! ResourceStore: one typed store of named resources.

use crate::counted::{CountedSlots, Reference};
use crate::key::ResourceKey;
use crate::loader::ResourceLoader;
use crate::resource::Resource;
use crate::slots::Slot;
use crate::state::{ResourceDataState, ResourcePolicy, ResourceState};
use core::any::type_name;
use core::borrow::Borrow;
use core::cell::{Ref, RefCell, RefMut};
use core::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct EntryData<T> {
    pub(crate) data: Option<T>,
    // None until the first `set`; such placeholders only carry references.
    pub(crate) state: Option<ResourceDataState>,
    pub(crate) policy: ResourcePolicy,
}

impl<T> EntryData<T> {
    fn placeholder() -> Self {
        Self {
            data: None,
            state: None,
            policy: ResourcePolicy::Manual,
        }
    }
}

pub(crate) struct StoreState<T> {
    pub(crate) entries: CountedSlots<EntryData<T>>,
    pub(crate) fallback: Option<T>,
    pub(crate) last_change: usize,
}

impl<T> StoreState<T> {
    /// Unlink `slot` if it is an unreferenced reference-counted entry.
    fn evict(&mut self, slot: Slot) -> Option<EntryData<T>> {
        let due = self.entries.refcount(slot) == 0
            && self
                .entries
                .get(slot)
                .is_some_and(|e| e.policy == ResourcePolicy::ReferenceCounted);
        if !due {
            return None;
        }
        let (_, entry) = self.entries.remove(slot)?;
        self.last_change += 1;
        Some(entry)
    }
}

pub(crate) struct StoreInner<T: 'static> {
    pub(crate) state: RefCell<StoreState<T>>,
    // Evictions requested while a borrowed view kept `state` shared.
    deferred: RefCell<Vec<Slot>>,
    loader: RefCell<Option<Weak<dyn ResourceLoader<T>>>>,
}

impl<T: 'static> StoreInner<T> {
    fn new() -> Self {
        Self {
            state: RefCell::new(StoreState {
                entries: CountedSlots::new(),
                fallback: None,
                last_change: 0,
            }),
            deferred: RefCell::new(Vec::new()),
            loader: RefCell::new(None),
        }
    }

    fn state_mut(&self) -> RefMut<'_, StoreState<T>> {
        match self.state.try_borrow_mut() {
            Ok(st) => st,
            Err(_) => panic!(
                "ResourceStore<{}>: cannot modify the store while a borrowed view into it is alive",
                type_name::<T>()
            ),
        }
    }

    /// Return a handle's reference; evicts the entry when it was the last one
    /// and the entry is reference-counted.
    pub(crate) fn release(&self, r: Reference) {
        let slot = r.slot();
        let last = self.state.borrow().entries.release(r);
        if !last {
            return;
        }
        match self.state.try_borrow_mut() {
            Ok(mut st) => {
                let evicted = st.evict(slot);
                drop(st);
                // Dropped with the store unborrowed: the payload may hold
                // handles into this store.
                drop(evicted);
            }
            Err(_) => {
                tracing::trace!(
                    type_name = type_name::<T>(),
                    "ResourceStore: store is borrowed, deferring eviction"
                );
                self.deferred.borrow_mut().push(slot);
            }
        }
    }

    /// Carry out evictions deferred by `release`, if the store is free.
    fn settle(&self) {
        if self.deferred.borrow().is_empty() {
            return;
        }
        let Ok(mut st) = self.state.try_borrow_mut() else {
            return;
        };
        let slots = core::mem::take(&mut *self.deferred.borrow_mut());
        let evicted: Vec<_> = slots.into_iter().filter_map(|s| st.evict(s)).collect();
        drop(st);
        drop(evicted);
    }

    fn attached_loader(&self) -> Option<Rc<dyn ResourceLoader<T>>> {
        self.loader.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Drop the loader slot without touching the loader itself.
    pub(crate) fn forget_loader(&self) {
        self.loader.borrow_mut().take();
    }

    /// Clear the loader slot if the loader it points to has been dropped.
    pub(crate) fn forget_dead_loader(&self) {
        let mut slot = self.loader.borrow_mut();
        if slot.as_ref().is_some_and(|w| w.strong_count() == 0) {
            *slot = None;
        }
    }
}

impl<T: 'static> Drop for StoreInner<T> {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.get_mut().take().and_then(|w| w.upgrade()) {
            loader.core().clear_store();
        }
    }
}

/// Store of resources of one payload type.
///
/// `ResourceStore` is a cheap, cloneable handle; clones share the same
/// entries. Every outstanding [`Resource`] keeps the entries alive, so the
/// store cannot go away while something still references it.
pub struct ResourceStore<T: 'static> {
    inner: Rc<StoreInner<T>>,
}

impl<T: 'static> Clone for ResourceStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for ResourceStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ResourceStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner::new()),
        }
    }

    pub(crate) fn from_inner(inner: Rc<StoreInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner<T>> {
        Rc::downgrade(&self.inner)
    }

    /// Whether both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of keys with an entry, placeholders included.
    pub fn count(&self) -> usize {
        self.inner.settle();
        self.inner.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn contains(&self, key: impl Into<ResourceKey>) -> bool {
        self.inner.settle();
        self.inner.state.borrow().entries.contains_key(key.into())
    }

    /// Counter bumped by every mutation of this store.
    pub fn last_change(&self) -> usize {
        self.inner.state.borrow().last_change
    }

    /// Live handles bound to `key`.
    pub fn reference_count(&self, key: impl Into<ResourceKey>) -> usize {
        self.inner.settle();
        let st = self.inner.state.borrow();
        st.entries
            .find(key.into())
            .map(|s| st.entries.refcount(s))
            .unwrap_or(0)
    }

    /// State of `key` with the fallback overlay applied.
    pub fn state(&self, key: impl Into<ResourceKey>) -> ResourceState {
        self.inner.settle();
        let st = self.inner.state.borrow();
        let raw = st
            .entries
            .find(key.into())
            .and_then(|s| st.entries.get(s))
            .and_then(|e| e.state);
        ResourceState::observe(raw, st.fallback.is_some())
    }

    /// Handle to `key`. See [`get_as`](Self::get_as).
    pub fn get(&self, key: impl Into<ResourceKey>) -> Resource<T> {
        self.get_as::<T>(key)
    }

    /// Handle to `key` observed as `U`.
    ///
    /// The handle's reference is registered first. Then, if a loader is
    /// attached and the store had no entry for `key`, the loader is asked to
    /// load it before this returns.
    ///
    /// A key the store has no entry for gets a placeholder entry, which is a
    /// mutation: it panics while a borrowed view into this store (from
    /// [`Resource::value`], [`Resource::get`] or [`fallback`](Self::fallback))
    /// is alive. Keys that already have an entry can be fetched at any time.
    pub fn get_as<U>(&self, key: impl Into<ResourceKey>) -> Resource<T, U>
    where
        T: Borrow<U>,
        U: ?Sized + 'static,
    {
        let key = key.into();
        self.inner.settle();
        let existing = self.inner.state.borrow().entries.find(key);
        let (reference, fresh) = match existing {
            Some(slot) => (self.inner.state.borrow().entries.acquire(slot), false),
            None => {
                let Ok(mut st) = self.inner.state.try_borrow_mut() else {
                    panic!(
                        "ResourceStore::get(): cannot create an entry for {key:?} while a borrowed view into the store is alive"
                    );
                };
                let slot = st.entries.find_or_insert_with(key, EntryData::placeholder);
                (st.entries.acquire(slot), true)
            }
        };
        if fresh {
            if let Some(loader) = self.inner.attached_loader() {
                tracing::debug!(
                    key = ?key,
                    name = %loader.name(key),
                    type_name = type_name::<T>(),
                    "ResourceStore::get(): requesting load"
                );
                loader.load(key);
            }
        }
        Resource::new(self.inner.clone(), key, reference)
    }

    /// Store `data` under `key`.
    ///
    /// `data` must be present exactly when `state` is `Mutable` or `Final`,
    /// and an entry that is already `Final` cannot be changed; both are
    /// contract violations and panic. A `ReferenceCounted` entry that nothing
    /// references is not stored at all: the payload (and any previous
    /// unreferenced entry for `key`) is dropped and a warning is logged.
    pub fn set(
        &self,
        key: impl Into<ResourceKey>,
        data: impl Into<Option<T>>,
        state: ResourceDataState,
        policy: ResourcePolicy,
    ) -> &Self {
        let key = key.into();
        let data = data.into();
        assert!(
            data.is_some() == state.carries_data(),
            "ResourceStore::set(): data should be null if and only if state is NotFound or Loading"
        );
        self.inner.settle();
        let displaced = self.replace(key, data, state, policy);
        drop(displaced);
        self
    }

    /// Store `value` as a `Final`, `Resident` entry.
    pub fn set_value(&self, key: impl Into<ResourceKey>, value: T) -> &Self {
        self.set(
            key,
            value,
            ResourceDataState::Final,
            ResourcePolicy::Resident,
        )
    }

    // Returns the payloads to drop once the store is no longer borrowed.
    fn replace(
        &self,
        key: ResourceKey,
        data: Option<T>,
        state: ResourceDataState,
        policy: ResourcePolicy,
    ) -> (Option<T>, Option<T>) {
        let mut st = self.inner.state_mut();
        let existing = st.entries.find(key);
        if let Some(slot) = existing {
            let current = st.entries.get(slot).and_then(|e| e.state);
            assert!(
                current != Some(ResourceDataState::Final),
                "ResourceStore::set(): cannot change already final resource {key:?}"
            );
        }

        let refs = existing.map(|s| st.entries.refcount(s)).unwrap_or(0);
        if policy == ResourcePolicy::ReferenceCounted && refs == 0 {
            tracing::warn!(
                key = ?key,
                type_name = type_name::<T>(),
                "ResourceStore::set(): reference-counted resource isn't referenced from anywhere, deleting it immediately"
            );
            let erased = existing.and_then(|s| st.entries.remove(s));
            if erased.is_some() {
                st.last_change += 1;
            }
            return (data, erased.and_then(|(_, e)| e.data));
        }

        let slot = st.entries.find_or_insert_with(key, EntryData::placeholder);
        let displaced = st.entries.get_mut(slot).and_then(|e| {
            e.state = Some(state);
            e.policy = policy;
            core::mem::replace(&mut e.data, data)
        });
        st.last_change += 1;
        (displaced, None)
    }

    /// Borrowed view of the fallback, if any.
    pub fn fallback(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.inner.state.borrow(), |st| st.fallback.as_ref()).ok()
    }

    pub fn has_fallback(&self) -> bool {
        self.inner.state.borrow().fallback.is_some()
    }

    /// Replace the fallback; `None` removes it.
    pub fn set_fallback(&self, fallback: impl Into<Option<T>>) -> &Self {
        self.inner.settle();
        let old = {
            let mut st = self.inner.state_mut();
            st.last_change += 1;
            core::mem::replace(&mut st.fallback, fallback.into())
        };
        drop(old);
        self
    }

    /// Remove every unreferenced entry whose policy is not `Resident`.
    pub fn free(&self) -> &Self {
        self.inner.settle();
        let freed = {
            let mut st = self.inner.state_mut();
            let freed = st
                .entries
                .extract_if(|_, e, refs| e.policy != ResourcePolicy::Resident && refs == 0);
            if !freed.is_empty() {
                st.last_change += 1;
            }
            freed
        };
        tracing::debug!(
            type_name = type_name::<T>(),
            freed = freed.len(),
            "ResourceStore::free()"
        );
        drop(freed);
        self
    }

    /// Remove every entry regardless of policy. Clearing while any entry is
    /// still referenced is a contract violation and panics.
    pub fn clear(&self) -> &Self {
        self.inner.settle();
        let cleared = {
            let mut st = self.inner.state_mut();
            let referenced = st.entries.iter().filter(|&(_, _, _, refs)| refs > 0).count();
            assert!(
                referenced == 0,
                "ResourceStore::clear(): cleared while {referenced} entries are still referenced"
            );
            let cleared = st.entries.extract_if(|_, _, _| true);
            if !cleared.is_empty() {
                st.last_change += 1;
            }
            cleared
        };
        tracing::debug!(
            type_name = type_name::<T>(),
            cleared = cleared.len(),
            "ResourceStore::clear()"
        );
        drop(cleared);
        self
    }

    /// The attached loader, if it is still alive.
    pub fn loader(&self) -> Option<Rc<dyn ResourceLoader<T>>> {
        self.inner.attached_loader()
    }

    /// Attach `loader`, detaching the previous one.
    ///
    /// The store only keeps a weak reference: the caller owns the loader,
    /// and dropping it detaches it.
    pub fn set_loader<L>(&self, loader: &Rc<L>) -> &Self
    where
        L: ResourceLoader<T> + 'static,
    {
        self.detach_loader();
        loader.core().attach(self);
        let shared: Rc<dyn ResourceLoader<T>> = loader.clone();
        *self.inner.loader.borrow_mut() = Some(Rc::downgrade(&shared));
        self
    }

    /// Detach the current loader and clear its back-pointer.
    pub fn detach_loader(&self) -> &Self {
        let previous = self.inner.loader.borrow_mut().take();
        if let Some(previous) = previous.and_then(|w| w.upgrade()) {
            previous.core().clear_store();
        }
        self
    }
}

impl<T: 'static> fmt::Debug for ResourceStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ResourceStore");
        d.field("type", &type_name::<T>());
        match self.inner.state.try_borrow() {
            Ok(st) => d
                .field("count", &st.entries.len())
                .field("fallback", &st.fallback.is_some())
                .field("last_change", &st.last_change),
            Err(_) => d.field("state", &"<borrowed>"),
        };
        d.field("loader", &self.inner.attached_loader().is_some())
            .finish()
    }
}
