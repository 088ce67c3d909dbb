//! resource-manager: a single-threaded cache of named, typed resources with
//! counted handles, per-type fallbacks and pluggable loaders.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let many consumers share one instance of each named resource,
//!   observe it while it is missing, loading or being replaced, and decide
//!   per entry when it may be dropped.
//! - Layers:
//!   - KeyedSlots<V>: structural map from `ResourceKey` to stable,
//!     generational `Slot`s; O(1) access through a slot without re-hashing.
//!   - CountedSlots<V>: adds a per-slot reference count. Counting needs
//!     only `&self`; every count is backed by a linear token.
//!   - ResourceStore<T>: one store per payload type. Entries carry the
//!     payload, its data state and its lifetime policy, plus the store's
//!     fallback and change counter.
//!   - ResourceManager: fixed set of stores keyed by `TypeId`, built once.
//!   - Resource<T, U>: counted handle to one key; caches what it serves and
//!     refreshes only when the store's change counter moves.
//!
//! Constraints
//! - Single-threaded: handles and stores are `!Send`/`!Sync`.
//! - Keys are 64-bit digests of names; names are not kept.
//! - A `Final` entry never changes; handles stop re-checking it.
//! - Handles keep their store alive, so a store is never torn down while it
//!   is referenced.
//!
//! Borrowing and reentrancy
//! - Each store keeps its entries in a `RefCell`. Borrowed views
//!   (`Resource::value`, `ResourceStore::fallback`) hold a shared borrow;
//!   modifying the store while one is alive panics.
//! - Payloads are unlinked first and dropped after the store's borrow ends,
//!   so dropping a payload may release handles into the same store.
//! - A reference-counted entry whose last handle goes away while a view of
//!   the store is alive is evicted by the next store operation.
//! - Loaders are only called with the store unborrowed and may re-enter it.
//!
//! Lifetime policies
//! - `Resident`: stays until `clear`.
//! - `Manual`: removed by `free` once unreferenced.
//! - `ReferenceCounted`: removed when the last handle is dropped; setting one
//!   that nothing references drops it immediately with a warning.

mod counted;
mod error;
mod key;
mod loader;
mod manager;
mod resource;
#[cfg(feature = "bench_internal")]
pub mod slots;
#[cfg(not(feature = "bench_internal"))]
mod slots;
#[cfg(test)]
mod slots_proptest;
mod state;
mod store;
mod tokens;

// Public surface
pub use error::ResourceError;
pub use key::ResourceKey;
pub use loader::{LoaderCore, ResourceLoader};
pub use manager::{InstanceGuard, ResourceManager, ResourceManagerBuilder};
pub use resource::Resource;
pub use state::{ResourceDataState, ResourcePolicy, ResourceState};
pub use store::ResourceStore;
