#![allow(dead_code)]

use async_trait::async_trait;
use ratewarden::rate_limit::script::AcquireArgs;
use ratewarden::rate_limit::store::{BucketKeys, InMemoryBucketStore, TokenBucketStore};
use ratewarden::StoreError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const NOW: i64 = 1_700_000_000;

/// Fails the test if any store operation is attempted.
pub struct PanickingStore;

#[async_trait]
impl TokenBucketStore for PanickingStore {
    async fn acquire_tokens(&self, _: &BucketKeys, _: &AcquireArgs) -> Result<(i64, i64), StoreError> {
        panic!("store must not be called");
    }

    async fn set_replenishment(&self, _: &BucketKeys, _: i64, _: i64, _: i64) -> Result<(), StoreError> {
        panic!("store must not be called");
    }

    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        panic!("store must not be called");
    }

    async fn keys_with_prefix(&self, _: &str) -> Result<Vec<String>, StoreError> {
        panic!("store must not be called");
    }

    async fn delete_prefix(&self, _: &str) -> Result<usize, StoreError> {
        panic!("store must not be called");
    }
}

/// Every operation fails as if the store were unreachable.
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenBucketStore for FailingStore {
    async fn acquire_tokens(&self, _: &BucketKeys, _: &AcquireArgs) -> Result<(i64, i64), StoreError> {
        self.fail()
    }

    async fn set_replenishment(&self, _: &BucketKeys, _: i64, _: i64, _: i64) -> Result<(), StoreError> {
        self.fail()
    }

    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        self.fail()
    }

    async fn keys_with_prefix(&self, _: &str) -> Result<Vec<String>, StoreError> {
        self.fail()
    }

    async fn delete_prefix(&self, _: &str) -> Result<usize, StoreError> {
        self.fail()
    }
}

/// Fails the first `failures` acquisitions, then delegates to an in-memory store.
pub struct FlakyStore {
    pub inner: InMemoryBucketStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self { inner: InMemoryBucketStore::new(), failures: AtomicUsize::new(failures) }
    }
}

#[async_trait]
impl TokenBucketStore for FlakyStore {
    async fn acquire_tokens(&self, keys: &BucketKeys, args: &AcquireArgs) -> Result<(i64, i64), StoreError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Timeout);
        }
        self.inner.acquire_tokens(keys, args).await
    }

    async fn set_replenishment(
        &self,
        keys: &BucketKeys,
        rate: i64,
        interval_seconds: i64,
        burst: i64,
    ) -> Result<(), StoreError> {
        self.inner.set_replenishment(keys, rate, interval_seconds, burst).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_with_prefix(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.inner.delete_prefix(prefix).await
    }
}

/// Replies to every acquisition with a fixed tuple and records the arguments it saw.
pub struct ScriptedStore {
    reply: (i64, i64),
    seen: Mutex<Vec<AcquireArgs>>,
}

impl ScriptedStore {
    pub fn new(code: i64, wait_seconds: i64) -> Self {
        Self { reply: (code, wait_seconds), seen: Mutex::new(Vec::new()) }
    }

    pub fn seen(&self) -> Vec<AcquireArgs> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenBucketStore for ScriptedStore {
    async fn acquire_tokens(&self, _: &BucketKeys, args: &AcquireArgs) -> Result<(i64, i64), StoreError> {
        self.seen.lock().unwrap().push(*args);
        Ok(self.reply)
    }

    async fn set_replenishment(&self, _: &BucketKeys, _: i64, _: i64, _: i64) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn keys_with_prefix(&self, _: &str) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete_prefix(&self, _: &str) -> Result<usize, StoreError> {
        Ok(0)
    }
}
