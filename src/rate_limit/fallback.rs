//! Process-local token buckets used while the shared store is unreachable.
//!
//! Each bucket name gets at most one [`LocalLimiter`] per [`FallbackRegistry`], created
//! lazily on the first store failure. These limits are per process: N processes in
//! fallback admit up to N times the configured rate.

use super::{Limiter, Limits};
use crate::config::LimiterConfig;
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use crate::{LimiterError, WaitContext};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

/// Continuous-refill token bucket held in process memory.
///
/// Reservations are taken up front: a caller that has to wait owns its tokens
/// immediately, and the bucket goes into debt so later callers queue behind it.
#[derive(Debug)]
pub struct LocalLimiter {
    name: String,
    /// Tokens per second, `None` when unbounded.
    rate: Option<f64>,
    burst: u32,
    state: Mutex<BucketState>,
    sleeper: Arc<dyn Sleeper>,
}

impl LocalLimiter {
    /// A full bucket of `burst` tokens refilled at `rate` tokens per second.
    pub fn new(name: impl Into<String>, rate: Option<f64>, burst: u32) -> Self {
        Self {
            name: name.into(),
            rate: rate.map(|r| r.max(0.0)),
            burst,
            state: Mutex::new(BucketState { tokens: f64::from(burst), last: Instant::now() }),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Bucket sized from the configured default rate and burst.
    pub fn from_config(name: impl Into<String>, config: &LimiterConfig) -> Self {
        Self::new(name, config.fallback_rate_per_second(), config.burst)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take `n` tokens now and return how long the caller must wait before using them.
    fn reserve(&self, n: u32, max_wait: Option<Duration>) -> Result<Duration, LimiterError> {
        let Some(rate) = self.rate else {
            return Ok(Duration::ZERO);
        };
        if n > self.burst {
            return Err(LimiterError::ExceedsBurst { requested: n, burst: self.burst });
        }

        let mut state = self.state.lock().expect("local limiter poisoned");
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(f64::from(self.burst));
        state.last = now;

        let remaining = state.tokens - f64::from(n);
        if remaining >= 0.0 {
            state.tokens = remaining;
            return Ok(Duration::ZERO);
        }
        if rate == 0.0 {
            return Err(LimiterError::AllBlocked { bucket: self.name.clone() });
        }

        let wait = Duration::try_from_secs_f64(-remaining / rate).unwrap_or(Duration::MAX);
        if let Some(deadline) = max_wait {
            if wait > deadline {
                return Err(LimiterError::WaitTimeExceedsDeadline { wait, deadline });
            }
        }
        state.tokens = remaining;
        Ok(wait)
    }
}

#[async_trait]
impl Limiter for LocalLimiter {
    async fn wait_n(&self, ctx: &WaitContext, n: u32) -> Result<(), LimiterError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let wait = self.reserve(n, ctx.remaining())?;
        if wait.is_zero() {
            return Ok(());
        }
        debug!(target: "ratewarden::fallback", bucket = %self.name, wait_ms = wait.as_millis() as u64, "waiting on local bucket");
        sleep_or_cancel(self.sleeper.as_ref(), ctx, wait).await
    }

    fn limits(&self) -> Option<Limits> {
        Some(Limits { rate_per_second: self.rate.unwrap_or(f64::INFINITY), burst: self.burst })
    }
}

/// Lazily created local limiters, one per bucket name.
#[derive(Debug, Default)]
pub struct FallbackRegistry {
    limiters: Mutex<HashMap<String, Arc<LocalLimiter>>>,
}

static GLOBAL_FALLBACKS: OnceLock<Arc<FallbackRegistry>> = OnceLock::new();

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry shared by limiters that were not given their own.
    pub fn global() -> Arc<FallbackRegistry> {
        GLOBAL_FALLBACKS.get_or_init(|| Arc::new(FallbackRegistry::new())).clone()
    }

    /// Get the bucket's local limiter, creating it from `config` on first use.
    pub fn get_or_create(
        &self,
        bucket: &str,
        config: &LimiterConfig,
        sleeper: &Arc<dyn Sleeper>,
    ) -> Arc<LocalLimiter> {
        let mut guard = self.limiters.lock().expect("fallback registry poisoned");
        guard
            .entry(bucket.to_string())
            .or_insert_with(|| {
                debug!(target: "ratewarden::fallback", bucket, "creating local fallback limiter");
                Arc::new(LocalLimiter::from_config(bucket, config).with_sleeper(sleeper.clone()))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.limiters.lock().expect("fallback registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
