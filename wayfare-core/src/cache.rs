//! Cache invalidation hook fired after writes that change what resolvers
//! return.

use log::trace;

/// Cached views a write can stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Any listing or search result that includes apps.
    AppListings,
}

/// Receives invalidations. Best-effort: implementations must not fail the
/// write that triggered them.
pub trait CacheInvalidator {
    /// Drop everything cached under `scope`.
    fn invalidate(&self, scope: CacheScope);
}

impl<T: CacheInvalidator + ?Sized> CacheInvalidator for &T {
    fn invalidate(&self, scope: CacheScope) {
        (**self).invalidate(scope);
    }
}

/// Hook for deployments without a cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl CacheInvalidator for NoopCache {
    fn invalidate(&self, scope: CacheScope) {
        trace!("no cache to invalidate for {scope:?}");
    }
}
