//! Store-backed token buckets shared by every process.
//!
//! A [`LimiterBackend`] owns the pieces every bucket shares (store handle, live
//! configuration, clock, timer, fallback registry, telemetry sink); a
//! [`DistributedLimiter`] is a cheap named view onto it.
//!
//! ```rust
//! use ratewarden::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let backend = Arc::new(LimiterBackend::new(InMemoryBucketStore::new()));
//! let limiter = backend.limiter("github.com:api_tokens");
//! limiter.wait(&WaitContext::background()).await.unwrap();
//! # }
//! ```

use super::fallback::FallbackRegistry;
use super::script::{AcquireArgs, GrantCode};
use super::state::{self, GlobalLimiterInfo};
use super::store::{BucketKeys, TokenBucketStore};
use super::{GlobalLimiter, Limiter, Quota};
use crate::adaptive::DynamicConfig;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, LimiterConfig};
use crate::retry::{RetryError, RetryPolicy};
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use crate::{LimiterError, StoreError, WaitContext};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Shared state behind every [`DistributedLimiter`] of one store.
pub struct LimiterBackend<S, T = NullSink> {
    store: Arc<S>,
    config: DynamicConfig<LimiterConfig>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    fallbacks: Arc<FallbackRegistry>,
    sink: T,
}

impl<S, T> std::fmt::Debug for LimiterBackend<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterBackend")
            .field("config", &self.config.get())
            .field("clock", &self.clock)
            .field("sleeper", &self.sleeper)
            .field("fallbacks", &self.fallbacks.len())
            .finish()
    }
}

impl<S: TokenBucketStore> LimiterBackend<S> {
    /// Backend with default configuration, system clock, tokio timer and the
    /// process-wide fallback registry.
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Like [`LimiterBackend::new`] for a store already shared elsewhere.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            config: DynamicConfig::new(LimiterConfig::default()),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            fallbacks: FallbackRegistry::global(),
            sink: NullSink,
        }
    }
}

impl<S: TokenBucketStore, T> LimiterBackend<S, T> {
    /// Replace the configuration after validating it.
    pub fn with_config(self, config: LimiterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config.set(config);
        Ok(self)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use a private fallback registry instead of the process-wide one.
    pub fn with_fallback_registry(mut self, fallbacks: Arc<FallbackRegistry>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> LimiterBackend<S, U> {
        LimiterBackend {
            store: self.store,
            config: self.config,
            clock: self.clock,
            sleeper: self.sleeper,
            fallbacks: self.fallbacks,
            sink,
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<LimiterConfig> {
        self.config.get()
    }

    /// Swap in a new configuration; applies from the next acquisition.
    ///
    /// The key prefix of limiters that already exist does not change.
    pub fn update_config(&self, config: LimiterConfig) -> Result<(), ConfigError> {
        config.validate()?;
        debug!(target: "ratewarden::distributed", ?config, "limiter config updated");
        self.config.set(config);
        Ok(())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn fallbacks(&self) -> &Arc<FallbackRegistry> {
        &self.fallbacks
    }

    /// A limiter for `bucket_name` under the current key prefix.
    pub fn limiter(self: &Arc<Self>, bucket_name: impl Into<String>) -> DistributedLimiter<S, T> {
        let bucket_name = bucket_name.into();
        let keys = BucketKeys::new(&self.config.get().key_prefix, &bucket_name);
        DistributedLimiter { bucket_name, keys, backend: Arc::clone(self) }
    }

    /// Configuration and capacity of every bucket under the current key prefix.
    pub async fn global_state(&self) -> Result<BTreeMap<String, GlobalLimiterInfo>, StoreError> {
        let config = self.config.get();
        state::get_global_limiter_state_with(
            self.store.as_ref(),
            &config.key_prefix,
            state::BucketDefaults::from(&*config),
        )
        .await
    }

    fn retry_policy(&self, config: &LimiterConfig) -> RetryPolicy {
        RetryPolicy::new(config.store_retry_attempts, config.retry_jitter(), self.sleeper.clone())
    }
}

/// Token bucket whose state lives in the shared store.
///
/// All instances naming the same bucket, in any process, draw from the same tokens.
pub struct DistributedLimiter<S, T = NullSink> {
    bucket_name: String,
    keys: BucketKeys,
    backend: Arc<LimiterBackend<S, T>>,
}

impl<S, T> Clone for DistributedLimiter<S, T> {
    fn clone(&self) -> Self {
        Self {
            bucket_name: self.bucket_name.clone(),
            keys: self.keys.clone(),
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<S, T> std::fmt::Debug for DistributedLimiter<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLimiter")
            .field("bucket_name", &self.bucket_name)
            .field("bucket_key", &self.keys.bucket)
            .finish()
    }
}

impl<S, T> DistributedLimiter<S, T> {
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn keys(&self) -> &BucketKeys {
        &self.keys
    }
}

impl<S, T> DistributedLimiter<S, T>
where
    S: TokenBucketStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    /// Map a script reply onto the wait it grants.
    fn interpret(
        &self,
        (code, wait_seconds): (i64, i64),
        n: u32,
        config: &LimiterConfig,
        ctx: &WaitContext,
    ) -> Result<Duration, LimiterError> {
        match GrantCode::from_code(code) {
            Some(GrantCode::Granted) if wait_seconds >= 0 => {
                Ok(Duration::from_secs(wait_seconds.unsigned_abs()))
            }
            Some(GrantCode::ExceedsDeadline) => Err(LimiterError::WaitTimeExceedsDeadline {
                wait: Duration::from_secs(wait_seconds.max(0).unsigned_abs()),
                deadline: ctx.remaining().unwrap_or_default(),
            }),
            Some(GrantCode::NegativeTimeDifference) => {
                warn!(target: "ratewarden::distributed", bucket = %self.bucket_name, "store reports clock moved backwards");
                Err(LimiterError::NegativeTimeDifference { bucket: self.bucket_name.clone() })
            }
            Some(GrantCode::AllBlocked) => {
                Err(LimiterError::AllBlocked { bucket: self.bucket_name.clone() })
            }
            Some(GrantCode::ExceedsBurst) => {
                // the reply carries the bucket's own burst; zero means the store did not say
                let burst = u32::try_from(wait_seconds)
                    .ok()
                    .filter(|burst| *burst > 0)
                    .unwrap_or(config.burst);
                Err(LimiterError::ExceedsBurst { requested: n, burst })
            }
            _ => {
                warn!(target: "ratewarden::distributed", bucket = %self.bucket_name, code, wait_seconds, "unexpected store response");
                Err(LimiterError::UnexpectedStoreResponse(format!(
                    "code {code}, wait {wait_seconds}s"
                )))
            }
        }
    }

    async fn fall_back(
        &self,
        ctx: &WaitContext,
        n: u32,
        config: &LimiterConfig,
        attempts: usize,
        last: StoreError,
    ) -> Result<(), LimiterError> {
        error!(
            target: "ratewarden::distributed",
            bucket = %self.bucket_name,
            attempts,
            error = %last,
            "store unavailable; using local fallback limiter"
        );
        emit_best_effort(
            self.backend.sink.clone(),
            LimiterEvent::Fallback { bucket: self.bucket_name.clone(), error: last.to_string() },
        )
        .await;
        let local =
            self.backend.fallbacks.get_or_create(&self.bucket_name, config, &self.backend.sleeper);
        local.wait_n(ctx, n).await
    }
}

#[async_trait]
impl<S, T> Limiter for DistributedLimiter<S, T>
where
    S: TokenBucketStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    async fn wait_n(&self, ctx: &WaitContext, n: u32) -> Result<(), LimiterError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let config = self.backend.config.get();
        let args = AcquireArgs {
            now_epoch_seconds: self.backend.clock.epoch_seconds(),
            max_wait_seconds: ctx
                .remaining()
                .map_or(-1, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
            fallback_rate: config.default_requests_per_hour,
            fallback_interval_seconds: i64::try_from(config.fallback_interval_seconds)
                .unwrap_or(i64::MAX),
            burst: i64::from(config.burst),
            tokens: i64::from(n),
        };

        let store = self.backend.store.as_ref();
        let keys = &self.keys;
        let args = &args;
        let reply = match self
            .backend
            .retry_policy(&config)
            .execute(ctx, move || store.acquire_tokens(keys, args))
            .await
        {
            Ok(reply) => reply,
            Err(RetryError::Interrupted(err)) => return Err(err),
            Err(RetryError::Exhausted { attempts, last }) => {
                return self.fall_back(ctx, n, &config, attempts, last).await;
            }
        };

        let wait = self.interpret(reply, n, &config, ctx)?;
        if wait.is_zero() {
            return Ok(());
        }
        debug!(target: "ratewarden::distributed", bucket = %self.bucket_name, wait_s = wait.as_secs(), "waiting for reserved tokens");
        sleep_or_cancel(self.backend.sleeper.as_ref(), ctx, wait).await
    }
}

#[async_trait]
impl<S, T> GlobalLimiter for DistributedLimiter<S, T>
where
    S: TokenBucketStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    async fn set_token_bucket_config(
        &self,
        ctx: &WaitContext,
        quota: Quota,
        interval: Duration,
    ) -> Result<(), LimiterError> {
        let config = self.backend.config.get();
        let rate = quota.as_rate();
        let interval_seconds = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX).max(1);
        let burst = i64::from(config.burst);

        let store = self.backend.store.as_ref();
        let keys = &self.keys;
        self.backend
            .retry_policy(&config)
            .execute(ctx, move || store.set_replenishment(keys, rate, interval_seconds, burst))
            .await
            .map_err(|err| match err {
                RetryError::Interrupted(err) => err,
                RetryError::Exhausted { last, .. } => LimiterError::Store(last),
            })?;

        debug!(target: "ratewarden::distributed", bucket = %self.bucket_name, rate, interval_seconds, burst, "bucket replenishment updated");
        Ok(())
    }
}
