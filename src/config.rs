//! Limiter configuration.
//!
//! ```rust
//! use ratewarden::LimiterConfig;
//!
//! let config = LimiterConfig::from_json(r#"{ "default_requests_per_hour": 7200 }"#).unwrap();
//! assert_eq!(config.burst, 10);
//! assert_eq!(config.default_requests_per_hour, 7200);
//! ```

use crate::Jitter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Key prefix shared by every bucket in the store.
pub const DEFAULT_KEY_PREFIX: &str = "v2:rate_limiters";
/// Maximum capacity of every bucket.
pub const DEFAULT_BURST: u32 = 10;
/// Rate used for buckets nobody configured, and for the local fallback.
pub const DEFAULT_REQUESTS_PER_HOUR: i64 = 3600;
/// Sentinel rate meaning "no limit".
pub const UNLIMITED_RATE: i64 = -1;

/// Process-wide limiter settings; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Namespace of every bucket key in the store.
    pub key_prefix: String,
    /// Burst written with bucket configs and assumed for unconfigured buckets.
    pub burst: u32,
    /// Rate of unconfigured buckets and of the local fallback; `-1` means unbounded.
    pub default_requests_per_hour: i64,
    /// Interval the default rate is replenished over when a bucket has none.
    pub fallback_interval_seconds: u64,
    /// Store attempts per call before falling back.
    pub store_retry_attempts: usize,
    pub store_retry_min_delay_ms: u64,
    pub store_retry_max_delay_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            burst: DEFAULT_BURST,
            default_requests_per_hour: DEFAULT_REQUESTS_PER_HOUR,
            fallback_interval_seconds: 3600,
            store_retry_attempts: 8,
            store_retry_min_delay_ms: 50,
            store_retry_max_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid limiter config json: {0}")]
    Parse(String),
    #[error("burst must be greater than zero")]
    ZeroBurst,
    #[error("store_retry_attempts must be greater than zero")]
    ZeroRetryAttempts,
    #[error("store retry delay range is inverted ({min_ms}ms > {max_ms}ms)")]
    InvertedRetryDelay { min_ms: u64, max_ms: u64 },
    #[error("fallback_interval_seconds must be greater than zero")]
    ZeroInterval,
    #[error("default_requests_per_hour must be -1 or non-negative (got {0})")]
    InvalidRate(i64),
    #[error("key_prefix must not be empty")]
    EmptyPrefix,
}

impl LimiterConfig {
    /// Parse and validate a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.store_retry_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.store_retry_min_delay_ms > self.store_retry_max_delay_ms {
            return Err(ConfigError::InvertedRetryDelay {
                min_ms: self.store_retry_min_delay_ms,
                max_ms: self.store_retry_max_delay_ms,
            });
        }
        if self.fallback_interval_seconds == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.default_requests_per_hour < UNLIMITED_RATE {
            return Err(ConfigError::InvalidRate(self.default_requests_per_hour));
        }
        Ok(())
    }

    /// Delay distribution between store retry attempts.
    pub fn retry_jitter(&self) -> Jitter {
        Jitter::Uniform {
            min: Duration::from_millis(self.store_retry_min_delay_ms),
            max: Duration::from_millis(self.store_retry_max_delay_ms.max(self.store_retry_min_delay_ms)),
        }
    }

    /// Per-second rate for the local fallback limiter, `None` when unbounded.
    pub fn fallback_rate_per_second(&self) -> Option<f64> {
        if self.default_requests_per_hour == UNLIMITED_RATE {
            None
        } else {
            Some(self.default_requests_per_hour.max(0) as f64 / 3600.0)
        }
    }
}
