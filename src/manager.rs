//! ResourceManager: one store per declared payload type.
//!
//! The set of types is fixed when the manager is built. Typed calls resolve
//! the store through a `TypeId` lookup and forward to it; `free_all` and
//! `clear_all` visit the stores in declaration order.

use crate::error::ResourceError;
use crate::key::ResourceKey;
use crate::loader::ResourceLoader;
use crate::resource::Resource;
use crate::state::{ResourceDataState, ResourcePolicy, ResourceState};
use crate::store::ResourceStore;
use core::any::{type_name, Any, TypeId};
use core::borrow::Borrow;
use core::cell::{Ref, RefCell};
use core::fmt;
use core::marker::PhantomData;
use hashbrown::HashMap;
use std::rc::{Rc, Weak};

/// Type-erased view of a store, enough for whole-manager sweeps.
trait ErasedStore {
    fn type_name(&self) -> &'static str;
    fn count(&self) -> usize;
    fn free(&self);
    fn clear(&self);
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ErasedStore for ResourceStore<T> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
    fn count(&self) -> usize {
        ResourceStore::count(self)
    }
    fn free(&self) {
        ResourceStore::free(self);
    }
    fn clear(&self) {
        ResourceStore::clear(self);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ManagerInner {
    stores: Vec<Box<dyn ErasedStore>>,
    by_type: HashMap<TypeId, usize>,
}

/// Collects the payload types a [`ResourceManager`] will hold.
#[derive(Default)]
pub struct ResourceManagerBuilder {
    stores: Vec<Box<dyn ErasedStore>>,
    by_type: HashMap<TypeId, usize>,
}

impl ResourceManagerBuilder {
    /// Declare a store for `T`. Declaring the same type twice is ignored.
    pub fn with<T: 'static>(mut self) -> Self {
        let id = TypeId::of::<T>();
        if self.by_type.contains_key(&id) {
            tracing::warn!(
                type_name = type_name::<T>(),
                "ResourceManagerBuilder::with(): type declared twice, ignoring"
            );
            return self;
        }
        self.by_type.insert(id, self.stores.len());
        self.stores.push(Box::new(ResourceStore::<T>::new()));
        self
    }

    pub fn build(self) -> ResourceManager {
        tracing::debug!(types = self.stores.len(), "ResourceManager: built");
        ResourceManager {
            inner: Rc::new(ManagerInner {
                stores: self.stores,
                by_type: self.by_type,
            }),
        }
    }
}

/// Typed façade over a fixed set of [`ResourceStore`]s.
///
/// Cloning is cheap and yields a handle to the same stores.
///
/// ```
/// use resource_manager::{ResourceManager, ResourceState};
///
/// struct Mesh(u32);
///
/// let manager = ResourceManager::builder().with::<Mesh>().build();
/// let cube = manager.get::<Mesh>("cube");
/// assert_eq!(cube.state(), ResourceState::NotLoaded);
///
/// manager.set("cube", Mesh(36));
/// assert_eq!(cube.get().0, 36);
/// ```
#[derive(Clone)]
pub struct ResourceManager {
    inner: Rc<ManagerInner>,
}

impl ResourceManager {
    pub fn builder() -> ResourceManagerBuilder {
        ResourceManagerBuilder::default()
    }

    /// The store for `T`, or an error if `T` was not declared.
    pub fn try_store<T: 'static>(&self) -> Result<&ResourceStore<T>, ResourceError> {
        self.inner
            .by_type
            .get(&TypeId::of::<T>())
            .and_then(|&i| self.inner.stores[i].as_any().downcast_ref::<ResourceStore<T>>())
            .ok_or(ResourceError::UnregisteredType {
                type_name: type_name::<T>(),
            })
    }

    /// The store for `T`. Panics if `T` was not declared.
    pub fn store<T: 'static>(&self) -> &ResourceStore<T> {
        match self.try_store::<T>() {
            Ok(store) => store,
            Err(e) => panic!("ResourceManager::store(): {e}"),
        }
    }

    pub fn has_type<T: 'static>(&self) -> bool {
        self.inner.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Names of the declared types, in declaration order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inner.stores.iter().map(|s| s.type_name())
    }

    pub fn count<T: 'static>(&self) -> usize {
        self.store::<T>().count()
    }

    /// Handle to `key` in `T`'s store. A key without an entry gets a
    /// placeholder, so see [`ResourceStore::get_as`] for when that panics.
    pub fn get<T: 'static>(&self, key: impl Into<ResourceKey>) -> Resource<T> {
        self.store::<T>().get(key)
    }

    /// Handle to `key` in `T`'s store, observed as `U`.
    pub fn get_as<T, U>(&self, key: impl Into<ResourceKey>) -> Resource<T, U>
    where
        T: Borrow<U> + 'static,
        U: ?Sized + 'static,
    {
        self.store::<T>().get_as::<U>(key)
    }

    pub fn reference_count<T: 'static>(&self, key: impl Into<ResourceKey>) -> usize {
        self.store::<T>().reference_count(key)
    }

    pub fn state<T: 'static>(&self, key: impl Into<ResourceKey>) -> ResourceState {
        self.store::<T>().state(key)
    }

    /// Store `value` as a `Final`, `Resident` entry.
    pub fn set<T: 'static>(&self, key: impl Into<ResourceKey>, value: T) -> &Self {
        self.store::<T>().set_value(key, value);
        self
    }

    /// Store `data` with an explicit state and policy.
    /// See [`ResourceStore::set`] for the rules.
    pub fn set_data<T: 'static>(
        &self,
        key: impl Into<ResourceKey>,
        data: Option<T>,
        state: ResourceDataState,
        policy: ResourcePolicy,
    ) -> &Self {
        self.store::<T>().set(key, data, state, policy);
        self
    }

    pub fn fallback<T: 'static>(&self) -> Option<Ref<'_, T>> {
        self.store::<T>().fallback()
    }

    /// Replace `T`'s fallback; `None` removes it.
    pub fn set_fallback<T: 'static>(&self, fallback: impl Into<Option<T>>) -> &Self {
        self.store::<T>().set_fallback(fallback);
        self
    }

    pub fn free<T: 'static>(&self) -> &Self {
        self.store::<T>().free();
        self
    }

    /// `free` every store, in declaration order.
    pub fn free_all(&self) -> &Self {
        for store in &self.inner.stores {
            store.free();
        }
        self
    }

    pub fn clear<T: 'static>(&self) -> &Self {
        self.store::<T>().clear();
        self
    }

    /// `clear` every store, in declaration order.
    pub fn clear_all(&self) -> &Self {
        for store in &self.inner.stores {
            store.clear();
        }
        self
    }

    pub fn loader<T: 'static>(&self) -> Option<Rc<dyn ResourceLoader<T>>> {
        self.store::<T>().loader()
    }

    pub fn set_loader<T, L>(&self, loader: &Rc<L>) -> &Self
    where
        T: 'static,
        L: ResourceLoader<T> + 'static,
    {
        self.store::<T>().set_loader(loader);
        self
    }

    pub fn detach_loader<T: 'static>(&self) -> &Self {
        self.store::<T>().detach_loader();
        self
    }

    /// Whether both handles refer to the same manager.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Make this manager the thread's default instance until the returned
    /// guard is dropped.
    ///
    /// Fails while another live manager holds the slot. A slot whose manager
    /// has been dropped is taken over, even if that manager's guard is still
    /// around.
    pub fn install(&self) -> Result<InstanceGuard, ResourceError> {
        INSTANCE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.as_ref().is_some_and(|w| w.strong_count() > 0) {
                return Err(ResourceError::InstanceExists);
            }
            *slot = Some(Rc::downgrade(&self.inner));
            tracing::debug!("ResourceManager: installed as default instance");
            Ok(InstanceGuard {
                inner: Rc::downgrade(&self.inner),
                _nosend: PhantomData,
            })
        })
    }

    /// The thread's default instance. Panics if none is installed.
    pub fn instance() -> ResourceManager {
        match Self::try_instance() {
            Some(manager) => manager,
            None => panic!("ResourceManager::instance(): no instance exists"),
        }
    }

    pub fn try_instance() -> Option<ResourceManager> {
        INSTANCE.with(|slot| {
            slot.borrow()
                .as_ref()
                .and_then(Weak::upgrade)
                .map(|inner| ResourceManager { inner })
        })
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.stores.iter().map(|s| (s.type_name(), s.count())))
            .finish()
    }
}

// Per-thread default-instance slot. Handles are single-threaded, so a
// process-wide slot would be unusable from other threads anyway.
thread_local! {
    static INSTANCE: RefCell<Option<Weak<ManagerInner>>> = const { RefCell::new(None) };
}

/// Holds the thread's default-instance slot; dropping it empties the slot.
#[must_use = "dropping the guard uninstalls the default instance"]
pub struct InstanceGuard {
    inner: Weak<ManagerInner>,
    _nosend: PhantomData<*mut ()>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE.with(|slot| {
            let mut slot = slot.borrow_mut();
            let holder = slot.as_ref().is_some_and(|w| w.ptr_eq(&self.inner));
            if holder {
                *slot = None;
                return;
            }
            // Taken over after this guard's manager was dropped.
            if self.inner.strong_count() == 0 || std::thread::panicking() {
                return;
            }
            panic!("InstanceGuard: the default instance was replaced while installed");
        });
    }
}

impl fmt::Debug for InstanceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceGuard")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mesh(u32);
    struct Texture;

    #[test]
    fn duplicate_declaration_is_ignored() {
        let m = ResourceManager::builder()
            .with::<Mesh>()
            .with::<Texture>()
            .with::<Mesh>()
            .build();
        assert_eq!(m.type_names().count(), 2);
        assert!(m.has_type::<Mesh>());
        assert!(!m.has_type::<String>());
    }

    #[test]
    fn undeclared_type_is_an_error() {
        let m = ResourceManager::builder().with::<Mesh>().build();
        assert_eq!(
            m.try_store::<Texture>().err(),
            Some(ResourceError::UnregisteredType {
                type_name: type_name::<Texture>()
            })
        );
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| m.count::<Texture>()));
        assert!(res.is_err());
    }

    #[test]
    fn stores_are_independent_per_type() {
        let m = ResourceManager::builder()
            .with::<Mesh>()
            .with::<u32>()
            .build();
        m.set("a", Mesh(1)).set("a", 7u32);
        assert_eq!(m.count::<Mesh>(), 1);
        assert_eq!(m.count::<u32>(), 1);
        assert_eq!(m.get::<Mesh>("a").get().0, 1);
        assert_eq!(*m.get::<u32>("a").get(), 7);
        let clone = m.clone();
        assert!(clone.ptr_eq(&m));
        assert!(clone.store::<u32>().ptr_eq(m.store::<u32>()));
    }

    #[test]
    fn debug_lists_types_with_counts() {
        let m = ResourceManager::builder().with::<u32>().build();
        m.set("a", 1u32);
        assert_eq!(format!("{m:?}"), "{\"u32\": 1}");
    }
}
