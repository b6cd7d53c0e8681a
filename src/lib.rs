#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ratewarden
//!
//! Distributed admission control for shared, quota-constrained upstreams such as
//! code-host APIs.
//!
//! ## Features
//!
//! - **Distributed token buckets** whose state lives in a shared store and is mutated
//!   only by an atomic script, so every process draws from the same tokens
//! - **Local fallback** to per-process buckets when the store is unreachable
//! - **Instrumentation** of every wait through pluggable telemetry sinks
//! - **Code-host buckets** for API and git traffic
//! - **Header-driven monitors** that track quotas reported by remote APIs
//! - **Tower middleware** gating any service behind a limiter
//!
//! ## Quick Start
//!
//! ```rust
//! use ratewarden::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = Arc::new(LimiterBackend::new(InMemoryBucketStore::new()));
//!     let code_hosts = CodeHostRateLimiter::new(backend);
//!     let ctx = WaitContext::background();
//!
//!     code_hosts
//!         .set_code_host_api_rate_limit_config(
//!             &ctx,
//!             "https://github.com/",
//!             Quota::Limited(5000),
//!             Duration::from_secs(3600),
//!         )
//!         .await
//!         .unwrap();
//!
//!     let limiter = InstrumentedLimiter::new(
//!         "github.com:api",
//!         code_hosts.api_limiter("https://github.com/"),
//!     );
//!     limiter.wait(&ctx).await.unwrap();
//! }
//! ```

pub mod adaptive;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod jitter;
pub mod monitor;
pub mod monitor_registry;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
pub mod telemetry;

// Re-exports
pub use adaptive::DynamicConfig;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LimiterConfig};
pub use context::WaitContext;
pub use error::{LimiterError, StoreError};
pub use jitter::Jitter;
pub use monitor::{Monitor, RateLimitStatus};
pub use monitor_registry::{MonitorRegistry, MonitorSnapshot};
pub use rate_limit::codehost::{BucketLimit, CodeHostRateLimiter, CodeHostRateLimits};
pub use rate_limit::distributed::{DistributedLimiter, LimiterBackend};
pub use rate_limit::fallback::{FallbackRegistry, LocalLimiter};
pub use rate_limit::instrumented::InstrumentedLimiter;
pub use rate_limit::store::{InMemoryBucketStore, TokenBucketStore};
pub use rate_limit::{GlobalLimiter, Limiter, Limits, Quota};
pub use retry::{RetryError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
