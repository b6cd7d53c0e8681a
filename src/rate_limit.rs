//! Admission control against shared, quota-constrained resources.
//!
//! - [`Limiter`]: anything that can block a caller until `n` tokens are available.
//! - [`GlobalLimiter`]: a limiter whose bucket lives in a shared store and can be
//!   reconfigured at runtime.
//! - [`DistributedLimiter`](distributed::DistributedLimiter): the store-backed
//!   implementation, falling back to a process-local bucket when the store is down.
//! - [`InstrumentedLimiter`](instrumented::InstrumentedLimiter): wraps any limiter with
//!   telemetry and a single [`LimiterError::BlockAll`] sentinel.
//! - [`CodeHostRateLimiter`](codehost::CodeHostRateLimiter): bucket naming for code hosts.
//!
//! # Architecture
//!
//! - **Logic**: the acquire algorithm lives in [`script`] and runs atomically inside the
//!   store, so every process reaches the same decision for a bucket.
//! - **Storage**: [`store::TokenBucketStore`] is the boundary to the shared store.
//! - **Middleware**: [`middleware::RateLimitLayer`] gates a tower service behind a limiter.

use crate::{LimiterError, WaitContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod codehost;
pub mod distributed;
pub mod fallback;
pub mod instrumented;
pub mod middleware;
pub mod script;
pub mod state;
pub mod store;

pub use middleware::{RateLimitLayer, RateLimitService, RateLimitedError};

/// Tokens granted per replenishment interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quota {
    /// Never blocks.
    Unlimited,
    /// `Limited(0)` closes the bucket.
    Limited(u32),
}

impl Quota {
    /// Store encoding, with `-1` for unlimited.
    pub fn as_rate(self) -> i64 {
        match self {
            Quota::Unlimited => crate::config::UNLIMITED_RATE,
            Quota::Limited(n) => i64::from(n),
        }
    }

    /// Decode a stored rate; any negative value reads as unlimited.
    pub fn from_rate(rate: i64) -> Self {
        if rate < 0 {
            Quota::Unlimited
        } else {
            Quota::Limited(u32::try_from(rate).unwrap_or(u32::MAX))
        }
    }
}

/// Inspectable limits of an in-process limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Tokens per second; `f64::INFINITY` when unbounded.
    pub rate_per_second: f64,
    pub burst: u32,
}

impl Limits {
    /// A zero rate with zero burst can never admit anything.
    pub fn blocks_all(&self) -> bool {
        self.rate_per_second == 0.0 && self.burst == 0
    }
}

/// Blocks callers until tokens are available.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Block until `n` tokens can be consumed, or fail.
    async fn wait_n(&self, ctx: &WaitContext, n: u32) -> Result<(), LimiterError>;

    async fn wait(&self, ctx: &WaitContext) -> Result<(), LimiterError> {
        self.wait_n(ctx, 1).await
    }

    /// Limits, when they can be read without a round trip.
    fn limits(&self) -> Option<Limits> {
        None
    }
}

/// A limiter backed by shared, reconfigurable bucket state.
#[async_trait]
pub trait GlobalLimiter: Limiter {
    /// Rewrite the bucket's quota and interval; applies from the next acquisition.
    async fn set_token_bucket_config(
        &self,
        ctx: &WaitContext,
        quota: Quota,
        interval: Duration,
    ) -> Result<(), LimiterError>;
}

#[async_trait]
impl<L: Limiter + ?Sized> Limiter for Arc<L> {
    async fn wait_n(&self, ctx: &WaitContext, n: u32) -> Result<(), LimiterError> {
        (**self).wait_n(ctx, n).await
    }

    fn limits(&self) -> Option<Limits> {
        (**self).limits()
    }
}
