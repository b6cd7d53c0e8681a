//! Convenient re-exports for common ratewarden types.
pub use crate::{
    config::LimiterConfig,
    context::WaitContext,
    error::{LimiterError, StoreError},
    monitor::Monitor,
    monitor_registry::MonitorRegistry,
    rate_limit::{
        codehost::{CodeHostRateLimiter, CodeHostRateLimits},
        distributed::{DistributedLimiter, LimiterBackend},
        instrumented::InstrumentedLimiter,
        store::{InMemoryBucketStore, TokenBucketStore},
        GlobalLimiter, Limiter, Quota, RateLimitLayer,
    },
    telemetry::{LogSink, MemorySink, NullSink},
};
