//! Shared-store boundary for distributed buckets.
//!
//! A [`TokenBucketStore`] offers plain key reads and two atomic operations that run
//! the [`script`](super::script) functions server-side. Bucket state lives under the
//! key family produced by [`BucketKeys`]:
//!
//! ```text
//! P:B                                               current capacity
//! P:B:config:bucket_rate                            tokens per interval, -1 unbounded
//! P:B:config:bucket_replenishment_interval_seconds
//! P:B:last_replenishment_timestamp                  epoch seconds
//! P:B:allowed_burst
//! ```
//!
//! Both atomic operations must be safe to retry: a failed attempt must not have
//! charged tokens or half-applied a configuration.

use super::script::{self, AcquireArgs, BucketSnapshot};
use crate::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const RATE_SUFFIX: &str = ":config:bucket_rate";
pub const INTERVAL_SUFFIX: &str = ":config:bucket_replenishment_interval_seconds";
pub const LAST_REPLENISHMENT_SUFFIX: &str = ":last_replenishment_timestamp";
pub const BURST_SUFFIX: &str = ":allowed_burst";

/// Key family of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKeys {
    /// `P:B`, the current capacity; negative while callers are queued.
    pub bucket: String,
    /// `P:B:last_replenishment_timestamp`, epoch seconds of the last refill.
    pub last_replenishment: String,
    /// `P:B:config:bucket_rate`, tokens per interval or `-1` for unbounded.
    pub rate: String,
    /// `P:B:config:bucket_replenishment_interval_seconds`.
    pub interval: String,
    /// `P:B:allowed_burst`, the most tokens the bucket holds.
    pub burst: String,
}

impl BucketKeys {
    /// Derive the key family of bucket `bucket_name` under `prefix`.
    pub fn new(prefix: &str, bucket_name: &str) -> Self {
        let bucket = format!("{prefix}:{bucket_name}");
        Self {
            last_replenishment: format!("{bucket}{LAST_REPLENISHMENT_SUFFIX}"),
            rate: format!("{bucket}{RATE_SUFFIX}"),
            interval: format!("{bucket}{INTERVAL_SUFFIX}"),
            burst: format!("{bucket}{BURST_SUFFIX}"),
            bucket,
        }
    }
}

#[async_trait]
pub trait TokenBucketStore: Send + Sync {
    /// Atomically run the acquire script; returns `(grantCode, waitSeconds)`.
    ///
    /// See [`GrantCode`](super::script::GrantCode) for the meaning of each code.
    async fn acquire_tokens(
        &self,
        keys: &BucketKeys,
        args: &AcquireArgs,
    ) -> Result<(i64, i64), StoreError>;

    /// Atomically rewrite rate, interval and burst.
    async fn set_replenishment(
        &self,
        keys: &BucketKeys,
        rate: i64,
        interval_seconds: i64,
        burst: i64,
    ) -> Result<(), StoreError>;

    /// Raw value of one key, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Every key starting with `prefix`, in no particular order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Delete every key under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

#[async_trait]
impl<T: TokenBucketStore + ?Sized> TokenBucketStore for Arc<T> {
    async fn acquire_tokens(
        &self,
        keys: &BucketKeys,
        args: &AcquireArgs,
    ) -> Result<(i64, i64), StoreError> {
        (**self).acquire_tokens(keys, args).await
    }

    async fn set_replenishment(
        &self,
        keys: &BucketKeys,
        rate: i64,
        interval_seconds: i64,
        burst: i64,
    ) -> Result<(), StoreError> {
        (**self).set_replenishment(keys, rate, interval_seconds, burst).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_with_prefix(prefix).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        (**self).delete_prefix(prefix).await
    }
}

/// Parse an integer value read from the store.
pub fn parse_int(key: &str, value: Option<&String>) -> Result<Option<i64>, StoreError> {
    match value {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| StoreError::Malformed { key: key.to_string(), value: v.clone() }),
    }
}

/// Single-node store holding string values, running scripts under one mutex.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBucketStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw write, for seeding state in tests.
    pub fn insert(&self, key: impl Into<String>, value: impl ToString) {
        self.data.lock().expect("bucket store poisoned").insert(key.into(), value.to_string());
    }
}

#[async_trait]
impl TokenBucketStore for InMemoryBucketStore {
    async fn acquire_tokens(
        &self,
        keys: &BucketKeys,
        args: &AcquireArgs,
    ) -> Result<(i64, i64), StoreError> {
        let mut guard = self.data.lock().expect("bucket store poisoned");
        let snapshot = BucketSnapshot {
            capacity: parse_int(&keys.bucket, guard.get(&keys.bucket))?,
            last_replenishment: parse_int(
                &keys.last_replenishment,
                guard.get(&keys.last_replenishment),
            )?,
            rate: parse_int(&keys.rate, guard.get(&keys.rate))?,
            interval_seconds: parse_int(&keys.interval, guard.get(&keys.interval))?,
            burst: parse_int(&keys.burst, guard.get(&keys.burst))?,
        };
        let outcome = script::acquire(&snapshot, args);
        if let Some(write) = outcome.write {
            guard.insert(keys.bucket.clone(), write.capacity.to_string());
            guard.insert(keys.last_replenishment.clone(), write.last_replenishment.to_string());
        }
        Ok(outcome.reply())
    }

    async fn set_replenishment(
        &self,
        keys: &BucketKeys,
        rate: i64,
        interval_seconds: i64,
        burst: i64,
    ) -> Result<(), StoreError> {
        let [rate, interval, burst] = script::replenishment(rate, interval_seconds, burst);
        let mut guard = self.data.lock().expect("bucket store poisoned");
        guard.insert(keys.rate.clone(), rate.to_string());
        guard.insert(keys.interval.clone(), interval.to_string());
        guard.insert(keys.burst.clone(), burst.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.lock().expect("bucket store poisoned").get(key).cloned())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.data.lock().expect("bucket store poisoned");
        let mut keys: Vec<String> = guard.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut guard = self.data.lock().expect("bucket store poisoned");
        let before = guard.len();
        guard.retain(|k, _| !k.starts_with(prefix));
        Ok(before - guard.len())
    }
}
