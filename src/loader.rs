//! Loaders: collaborators that fill a store on first request.
//!
//! A loader is owned by the caller as an `Rc<L>` and attached to one store
//! with [`ResourceStore::set_loader`]. The store keeps only a weak link, so
//! dropping the loader detaches it; dropping the store clears the loader's
//! back-pointer. Loading may finish synchronously inside `do_load` or later,
//! by calling [`LoaderCore::set`] / [`LoaderCore::set_not_found`] whenever the
//! data becomes ready.

use crate::key::ResourceKey;
use crate::state::{ResourceDataState, ResourcePolicy};
use crate::store::{ResourceStore, StoreInner};
use core::any::type_name;
use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};

/// Source of resources of type `T`.
///
/// Implementors embed a [`LoaderCore`] and expose it through `core`; the
/// store drives loading through the provided [`load`](Self::load).
pub trait ResourceLoader<T: 'static> {
    fn core(&self) -> &LoaderCore<T>;

    /// Start acquiring `key`. The key is already marked `Loading` when this
    /// runs.
    fn do_load(&self, key: ResourceKey);

    /// Human-readable name of `key`, for diagnostics.
    fn name(&self, _key: ResourceKey) -> String {
        String::new()
    }

    /// Count the request, mark `key` as `Loading` (`Resident`) in the
    /// attached store, then hand over to [`do_load`](Self::do_load).
    fn load(&self, key: ResourceKey) {
        self.core().begin(key);
        self.do_load(key);
    }
}

/// Bookkeeping shared by every loader: the link to its store and the
/// request/outcome counters.
pub struct LoaderCore<T: 'static> {
    store: RefCell<Weak<StoreInner<T>>>,
    requested: Cell<usize>,
    loaded: Cell<usize>,
    not_found: Cell<usize>,
}

impl<T: 'static> Default for LoaderCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> LoaderCore<T> {
    pub fn new() -> Self {
        Self {
            store: RefCell::new(Weak::new()),
            requested: Cell::new(0),
            loaded: Cell::new(0),
            not_found: Cell::new(0),
        }
    }

    /// Keys passed to `load` so far.
    pub fn requested_count(&self) -> usize {
        self.requested.get()
    }

    /// Keys delivered through `set` so far.
    pub fn loaded_count(&self) -> usize {
        self.loaded.get()
    }

    /// Keys reported through `set_not_found` so far.
    pub fn not_found_count(&self) -> usize {
        self.not_found.get()
    }

    pub fn is_attached(&self) -> bool {
        self.store.borrow().strong_count() > 0
    }

    /// The store this loader is attached to.
    pub fn store(&self) -> Option<ResourceStore<T>> {
        self.store.borrow().upgrade().map(ResourceStore::from_inner)
    }

    /// Deliver loaded data for `key`. `state` must be `Mutable` or `Final`.
    ///
    /// With no attached store the payload is dropped and a warning logged.
    pub fn set(
        &self,
        key: impl Into<ResourceKey>,
        value: T,
        state: ResourceDataState,
        policy: ResourcePolicy,
    ) {
        assert!(
            state.carries_data(),
            "ResourceLoader::set(): state must be either Mutable or Final"
        );
        let key = key.into();
        self.loaded.set(self.loaded.get() + 1);
        match self.store() {
            Some(store) => {
                store.set(key, value, state, policy);
            }
            None => tracing::warn!(
                key = ?key,
                type_name = type_name::<T>(),
                "ResourceLoader::set(): loader is not attached to any store, dropping data"
            ),
        }
    }

    /// Report that `key` cannot be found.
    pub fn set_not_found(&self, key: impl Into<ResourceKey>) {
        let key = key.into();
        self.not_found.set(self.not_found.get() + 1);
        match self.store() {
            Some(store) => {
                store.set(
                    key,
                    None,
                    ResourceDataState::NotFound,
                    ResourcePolicy::Resident,
                );
            }
            None => tracing::warn!(
                key = ?key,
                type_name = type_name::<T>(),
                "ResourceLoader::set_not_found(): loader is not attached to any store"
            ),
        }
    }

    fn begin(&self, key: ResourceKey) {
        self.requested.set(self.requested.get() + 1);
        match self.store() {
            Some(store) => {
                store.set(
                    key,
                    None,
                    ResourceDataState::Loading,
                    ResourcePolicy::Resident,
                );
            }
            None => tracing::debug!(
                key = ?key,
                type_name = type_name::<T>(),
                "ResourceLoader::load(): not attached, skipping Loading placeholder"
            ),
        }
    }

    /// Point at `store`, making the previous store forget this loader.
    pub(crate) fn attach(&self, store: &ResourceStore<T>) {
        let next = store.downgrade();
        let previous = self.store.replace(next.clone());
        if let Some(previous) = previous.upgrade() {
            if Rc::as_ptr(&previous) != next.as_ptr() {
                previous.forget_loader();
            }
        }
    }

    pub(crate) fn clear_store(&self) {
        self.store.replace(Weak::new());
    }
}

impl<T: 'static> Drop for LoaderCore<T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.get_mut().upgrade() {
            store.forget_dead_loader();
        }
    }
}

impl<T: 'static> fmt::Debug for LoaderCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderCore")
            .field("type", &type_name::<T>())
            .field("attached", &self.is_attached())
            .field("requested", &self.requested.get())
            .field("loaded", &self.loaded.get())
            .field("not_found", &self.not_found.get())
            .finish()
    }
}
