//! Read-only introspection of every bucket in the store.

use super::store::{parse_int, BucketKeys, TokenBucketStore, LAST_REPLENISHMENT_SUFFIX, RATE_SUFFIX};
use crate::clock::from_epoch_seconds;
use crate::config::{LimiterConfig, UNLIMITED_RATE};
use crate::StoreError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

/// Stored configuration and capacity of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalLimiterInfo {
    /// Tokens currently available; negative while callers are queued.
    pub current_capacity: i64,
    pub burst: i64,
    /// Tokens per interval.
    pub limit: i64,
    pub interval: Duration,
    /// `None` until the bucket has been acquired from.
    pub last_replenishment: Option<SystemTime>,
    pub infinite: bool,
}

/// Values the acquire script assumes for a bucket that was never configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketDefaults {
    /// Tokens per interval; `-1` when unbounded.
    pub rate: i64,
    pub interval_seconds: i64,
    pub burst: i64,
}

impl From<&LimiterConfig> for BucketDefaults {
    fn from(config: &LimiterConfig) -> Self {
        Self {
            rate: config.default_requests_per_hour,
            interval_seconds: i64::try_from(config.fallback_interval_seconds).unwrap_or(i64::MAX),
            burst: i64::from(config.burst),
        }
    }
}

impl Default for BucketDefaults {
    fn default() -> Self {
        Self::from(&LimiterConfig::default())
    }
}

/// Collect [`GlobalLimiterInfo`] for every known bucket under `prefix`, keyed by bucket name.
///
/// Buckets that were only ever acquired from are reported with [`BucketDefaults::default`].
pub async fn get_global_limiter_state<S>(
    store: &S,
    prefix: &str,
) -> Result<BTreeMap<String, GlobalLimiterInfo>, StoreError>
where
    S: TokenBucketStore + ?Sized,
{
    get_global_limiter_state_with(store, prefix, BucketDefaults::default()).await
}

/// Like [`get_global_limiter_state`], reporting unconfigured buckets with `defaults`.
pub async fn get_global_limiter_state_with<S>(
    store: &S,
    prefix: &str,
    defaults: BucketDefaults,
) -> Result<BTreeMap<String, GlobalLimiterInfo>, StoreError>
where
    S: TokenBucketStore + ?Sized,
{
    let scan = format!("{prefix}:");
    let names: BTreeSet<String> = store
        .keys_with_prefix(&scan)
        .await?
        .iter()
        .filter_map(|key| {
            let name = key.strip_prefix(&scan)?;
            name.strip_suffix(RATE_SUFFIX).or_else(|| name.strip_suffix(LAST_REPLENISHMENT_SUFFIX))
        })
        .map(str::to_string)
        .collect();

    let mut state = BTreeMap::new();
    for name in names {
        let keys = BucketKeys::new(prefix, &name);
        let read = |key: String| async move {
            let value = store.get(&key).await?;
            parse_int(&key, value.as_ref())
        };

        let (limit, interval, burst, capacity, last) = futures::try_join!(
            read(keys.rate),
            read(keys.interval),
            read(keys.burst),
            read(keys.bucket),
            read(keys.last_replenishment),
        )?;
        let limit = limit.unwrap_or(defaults.rate);
        let interval = interval.unwrap_or(defaults.interval_seconds).max(1);
        let burst = burst.unwrap_or(defaults.burst);

        state.insert(
            name,
            GlobalLimiterInfo {
                current_capacity: capacity.unwrap_or(burst),
                burst,
                limit,
                interval: Duration::from_secs(interval.unsigned_abs()),
                last_replenishment: last.map(from_epoch_seconds),
                infinite: limit == UNLIMITED_RATE,
            },
        );
    }
    Ok(state)
}
