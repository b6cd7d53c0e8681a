//! Live-updatable configuration handle.
//!
//! Limiters read their [`LimiterConfig`](crate::LimiterConfig) through a
//! `DynamicConfig` on every acquisition, so a new default rate takes effect on the
//! next call without rebuilding anything. Reads are lock-free via `ArcSwap`.

use arc_swap::ArcSwap;
use std::sync::Arc;

#[derive(Debug)]
pub struct DynamicConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely; every clone of this handle observes it.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Replace the value with one derived from the current snapshot.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&T) -> T,
    {
        self.inner.rcu(|cur| f(cur));
    }
}

impl<T: Default> Default for DynamicConfig<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
