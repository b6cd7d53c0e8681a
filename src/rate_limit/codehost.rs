//! Per-code-host buckets for API calls and git operations.
//!
//! Every code host gets two independent buckets, named `<url>:api_tokens` and
//! `<url>:git_tokens`, so exhausting one never starves the other.

use super::distributed::{DistributedLimiter, LimiterBackend};
use super::store::TokenBucketStore;
use super::{GlobalLimiter, Quota};
use crate::telemetry::{NullSink, TelemetrySink};
use crate::{LimiterError, WaitContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Bucket name for API calls against `code_host_url`.
pub fn api_bucket_name(code_host_url: &str) -> String {
    format!("{code_host_url}:api_tokens")
}

/// Bucket name for git operations against `code_host_url`.
pub fn git_bucket_name(code_host_url: &str) -> String {
    format!("{code_host_url}:git_tokens")
}

/// Quota and replenishment interval of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLimit {
    pub quota: Quota,
    /// Seconds over which `quota` tokens are replenished.
    pub interval_seconds: u64,
}

impl BucketLimit {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// Configured limits of one code host; `None` leaves that bucket untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeHostRateLimits {
    /// Base URL of the code host, used verbatim in bucket names.
    pub url: String,
    #[serde(default)]
    pub api: Option<BucketLimit>,
    #[serde(default)]
    pub git: Option<BucketLimit>,
}

/// Configures and hands out code-host buckets on a shared backend.
pub struct CodeHostRateLimiter<S, T = NullSink> {
    backend: Arc<LimiterBackend<S, T>>,
}

impl<S, T> Clone for CodeHostRateLimiter<S, T> {
    fn clone(&self) -> Self {
        Self { backend: Arc::clone(&self.backend) }
    }
}

impl<S, T> CodeHostRateLimiter<S, T>
where
    S: TokenBucketStore,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    pub fn new(backend: Arc<LimiterBackend<S, T>>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<LimiterBackend<S, T>> {
        &self.backend
    }

    /// Limiter drawing from the API bucket of `code_host_url`.
    pub fn api_limiter(&self, code_host_url: &str) -> DistributedLimiter<S, T> {
        self.backend.limiter(api_bucket_name(code_host_url))
    }

    /// Limiter drawing from the git bucket of `code_host_url`.
    pub fn git_limiter(&self, code_host_url: &str) -> DistributedLimiter<S, T> {
        self.backend.limiter(git_bucket_name(code_host_url))
    }

    /// Store `quota` per `interval` for the API bucket of `code_host_url`.
    pub async fn set_code_host_api_rate_limit_config(
        &self,
        ctx: &WaitContext,
        code_host_url: &str,
        quota: Quota,
        interval: Duration,
    ) -> Result<(), LimiterError> {
        self.api_limiter(code_host_url).set_token_bucket_config(ctx, quota, interval).await
    }

    /// Store `quota` per `interval` for the git bucket of `code_host_url`.
    pub async fn set_code_host_git_rate_limit_config(
        &self,
        ctx: &WaitContext,
        code_host_url: &str,
        quota: Quota,
        interval: Duration,
    ) -> Result<(), LimiterError> {
        self.git_limiter(code_host_url).set_token_bucket_config(ctx, quota, interval).await
    }

    /// Write every configured bucket, stopping at the first failure.
    pub async fn apply(
        &self,
        ctx: &WaitContext,
        code_hosts: &[CodeHostRateLimits],
    ) -> Result<(), LimiterError> {
        for host in code_hosts {
            if let Some(limit) = host.api {
                self.set_code_host_api_rate_limit_config(ctx, &host.url, limit.quota, limit.interval())
                    .await?;
            }
            if let Some(limit) = host.git {
                self.set_code_host_git_rate_limit_config(ctx, &host.url, limit.quota, limit.interval())
                    .await?;
            }
            info!(target: "ratewarden::distributed", code_host = %host.url, "code host rate limits applied");
        }
        Ok(())
    }
}
