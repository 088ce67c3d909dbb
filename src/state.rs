//! Resource states and lifetime policies.

use core::fmt;

/// State of a resource as seen by its observers.
///
/// The `*Fallback` variants mean the store has no usable payload for the key
/// but a fallback object is served in its place.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Nothing was set for the key and no fallback exists.
    NotLoaded,
    /// Nothing was set for the key; the fallback is served.
    NotLoadedFallback,
    /// A loader is working on the key and no fallback exists.
    Loading,
    /// A loader is working on the key; the fallback is served.
    LoadingFallback,
    /// The loader could not find the key and no fallback exists.
    NotFound,
    /// The loader could not find the key; the fallback is served.
    NotFoundFallback,
    /// Data is present and may still be replaced.
    Mutable,
    /// Data is present and will never change again.
    Final,
}

impl ResourceState {
    /// True for the variants that serve the store's fallback.
    pub fn is_fallback(self) -> bool {
        matches!(
            self,
            ResourceState::NotLoadedFallback
                | ResourceState::LoadingFallback
                | ResourceState::NotFoundFallback
        )
    }

    /// Apply the fallback overlay to a raw entry state.
    ///
    /// `raw` is `None` when the key has no entry or only a placeholder that
    /// was never `set`. Entries in `Mutable`/`Final` always carry data.
    pub(crate) fn observe(raw: Option<ResourceDataState>, has_fallback: bool) -> Self {
        match (raw, has_fallback) {
            (Some(ResourceDataState::Mutable), _) => ResourceState::Mutable,
            (Some(ResourceDataState::Final), _) => ResourceState::Final,
            (Some(ResourceDataState::Loading), true) => ResourceState::LoadingFallback,
            (Some(ResourceDataState::Loading), false) => ResourceState::Loading,
            (Some(ResourceDataState::NotFound), true) => ResourceState::NotFoundFallback,
            (Some(ResourceDataState::NotFound), false) => ResourceState::NotFound,
            (None, true) => ResourceState::NotLoadedFallback,
            (None, false) => ResourceState::NotLoaded,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw state recorded with an entry by `set`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceDataState {
    /// Placeholder while a loader works on the key. Carries no data.
    Loading,
    /// The loader gave up on the key. Carries no data.
    NotFound,
    /// Data that may be replaced by a later `set`. Observers re-check it
    /// whenever the store changes.
    Mutable,
    /// Data that can never be replaced. Observers stop re-checking once they
    /// have seen it.
    Final,
}

impl ResourceDataState {
    /// Whether an entry in this state must hold a payload.
    pub fn carries_data(self) -> bool {
        matches!(self, ResourceDataState::Mutable | ResourceDataState::Final)
    }
}

impl From<ResourceDataState> for ResourceState {
    fn from(s: ResourceDataState) -> Self {
        match s {
            ResourceDataState::Loading => ResourceState::Loading,
            ResourceDataState::NotFound => ResourceState::NotFound,
            ResourceDataState::Mutable => ResourceState::Mutable,
            ResourceDataState::Final => ResourceState::Final,
        }
    }
}

impl fmt::Display for ResourceDataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How long an entry stays in its store.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourcePolicy {
    /// Stays for the whole lifetime of the store.
    #[default]
    Resident,
    /// Removed by an explicit `free` once nothing references it.
    Manual,
    /// Removed as soon as the last reference goes away.
    ReferenceCounted,
}

impl fmt::Display for ResourcePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
