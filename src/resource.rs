//! Resource: a counted handle to one key of a store.

use crate::counted::Reference;
use crate::key::ResourceKey;
use crate::slots::Slot;
use crate::state::ResourceState;
use crate::store::StoreInner;
use core::any::type_name;
use core::cell::{Cell, Ref};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::rc::Rc;

struct Binding<T: 'static> {
    store: Rc<StoreInner<T>>,
    reference: Reference,
}

/// Where the cached view points.
#[derive(Copy, Clone, Debug)]
enum Source {
    Empty,
    Entry(Slot),
    Fallback,
}

#[derive(Copy, Clone, Debug)]
struct Snapshot {
    state: ResourceState,
    source: Source,
}

/// Handle to the resource stored under one key.
///
/// Every live handle counts as one reference on its entry. `T` is the
/// store's payload type; `U` is the type the handle exposes, any `U` that
/// `T` borrows as (`str` for a `String` store, a trait object for a boxed
/// one, ...).
///
/// The handle caches which object it serves and refreshes that view only
/// when the store reports a change, so repeated access is cheap. Once it has
/// seen `Final` data it never looks again.
pub struct Resource<T: 'static, U: ?Sized + 'static = T> {
    binding: Option<Binding<T>>,
    key: ResourceKey,
    seen_change: Cell<Option<usize>>,
    snapshot: Cell<Snapshot>,
    _target: PhantomData<*const U>,
}

impl<T: 'static, U: ?Sized + 'static> Resource<T, U> {
    pub(crate) fn new(store: Rc<StoreInner<T>>, key: ResourceKey, reference: Reference) -> Self {
        Self {
            binding: Some(Binding { store, reference }),
            key,
            seen_change: Cell::new(None),
            snapshot: Cell::new(Snapshot {
                state: ResourceState::NotLoaded,
                source: Source::Empty,
            }),
            _target: PhantomData,
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    /// Whether the handle was obtained from a store. `Default` handles are not.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Current state, refreshed if the store changed since the last look.
    pub fn state(&self) -> ResourceState {
        self.acquire();
        self.snapshot.get().state
    }

    /// Whether dereferencing would yield an object (the data or the fallback).
    pub fn is_available(&self) -> bool {
        self.acquire();
        !matches!(self.snapshot.get().source, Source::Empty)
    }

    fn acquire(&self) {
        let Some(binding) = &self.binding else {
            return;
        };
        let previous = self.snapshot.get();
        if previous.state == ResourceState::Final {
            return;
        }
        let st = binding.store.state.borrow();
        if self.seen_change.get() == Some(st.last_change) {
            return;
        }

        let slot = binding.reference.slot();
        let entry = st.entries.get(slot);
        let has_fallback = st.fallback.is_some();
        let source = if entry.is_some_and(|e| e.data.is_some()) {
            Source::Entry(slot)
        } else if has_fallback {
            Source::Fallback
        } else {
            Source::Empty
        };
        let next = Snapshot {
            state: ResourceState::observe(entry.and_then(|e| e.state), has_fallback),
            source,
        };
        if next.state != previous.state {
            tracing::trace!(
                key = ?self.key,
                from = ?previous.state,
                to = ?next.state,
                "Resource: state changed"
            );
        }
        self.snapshot.set(next);
        self.seen_change.set(Some(st.last_change));
    }
}

impl<T, U> Resource<T, U>
where
    T: core::borrow::Borrow<U> + 'static,
    U: ?Sized + 'static,
{
    /// Borrowed view of the served object: the entry's data, else the
    /// store's fallback, else `None`.
    ///
    /// The view shares the store; modifying the store while it is alive
    /// panics. That includes `get` of a key the store has no entry for yet,
    /// which inserts a placeholder; keys with an entry can still be fetched.
    pub fn value(&self) -> Option<Ref<'_, U>> {
        self.acquire();
        let binding = self.binding.as_ref()?;
        let source = self.snapshot.get().source;
        Ref::filter_map(binding.store.state.borrow(), |st| match source {
            Source::Entry(slot) => st
                .entries
                .get(slot)
                .and_then(|e| e.data.as_ref())
                .map(<T as core::borrow::Borrow<U>>::borrow),
            Source::Fallback => st
                .fallback
                .as_ref()
                .map(<T as core::borrow::Borrow<U>>::borrow),
            Source::Empty => None,
        })
        .ok()
    }

    /// Like [`value`](Self::value), but an unavailable resource is a
    /// contract violation and panics.
    pub fn get(&self) -> Ref<'_, U> {
        match self.value() {
            Some(v) => v,
            None => panic!(
                "Resource::get(): {:?} of type {} is not available (state {:?})",
                self.key,
                type_name::<T>(),
                self.snapshot.get().state
            ),
        }
    }
}

impl<T: 'static, U: ?Sized + 'static> Default for Resource<T, U> {
    /// A handle bound to nothing: state `Final`, never available.
    fn default() -> Self {
        Self {
            binding: None,
            key: ResourceKey::default(),
            seen_change: Cell::new(None),
            snapshot: Cell::new(Snapshot {
                state: ResourceState::Final,
                source: Source::Empty,
            }),
            _target: PhantomData,
        }
    }
}

impl<T: 'static, U: ?Sized + 'static> Clone for Resource<T, U> {
    fn clone(&self) -> Self {
        let binding = self.binding.as_ref().map(|b| Binding {
            store: b.store.clone(),
            reference: b.store.state.borrow().entries.acquire(b.reference.slot()),
        });
        Self {
            binding,
            key: self.key,
            seen_change: self.seen_change.clone(),
            snapshot: self.snapshot.clone(),
            _target: PhantomData,
        }
    }
}

impl<T: 'static, U: ?Sized + 'static> Drop for Resource<T, U> {
    fn drop(&mut self) {
        if let Some(Binding { store, reference }) = self.binding.take() {
            store.release(reference);
        }
    }
}

impl<T: 'static, U: ?Sized + 'static> Resource<T, U> {
    fn store_ptr(&self) -> *const StoreInner<T> {
        self.binding
            .as_ref()
            .map_or(core::ptr::null(), |b| Rc::as_ptr(&b.store))
    }
}

/// Handles are equal when they name the same key of the same store.
impl<T: 'static, U: ?Sized + 'static> PartialEq for Resource<T, U> {
    fn eq(&self, other: &Self) -> bool {
        self.store_ptr() == other.store_ptr() && self.key == other.key
    }
}

impl<T: 'static, U: ?Sized + 'static> Eq for Resource<T, U> {}

impl<T: 'static, U: ?Sized + 'static> Hash for Resource<T, U> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store_ptr().hash(state);
        self.key.hash(state);
    }
}

impl<T: 'static, U: ?Sized + 'static> fmt::Debug for Resource<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &type_name::<T>())
            .field("key", &self.key)
            .field("state", &self.snapshot.get().state)
            .field("bound", &self.binding.is_some())
            .finish()
    }
}
