//! Error types for limiters and their backing store.
//!
//! Only business-logic denials and context errors reach callers of
//! [`Limiter::wait_n`](crate::rate_limit::Limiter::wait_n). Store communication
//! failures are retried and then absorbed by the local fallback limiter, so
//! [`LimiterError::Store`] only surfaces from configuration and introspection calls.
use std::time::Duration;

/// Errors returned by rate limiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimiterError {
    /// The computed wait would outlive the caller's deadline.
    #[error("wait time {wait:?} exceeds context deadline ({deadline:?} remaining)")]
    WaitTimeExceedsDeadline { wait: Duration, deadline: Duration },
    /// The store saw `now` earlier than the last replenishment of the bucket.
    #[error("negative time difference since last replenishment of bucket {bucket}")]
    NegativeTimeDifference { bucket: String },
    /// The bucket is configured with a zero rate.
    #[error("all requests to bucket {bucket} are blocked")]
    AllBlocked { bucket: String },
    /// The store replied with something outside the script contract.
    #[error("unexpected store response: {0}")]
    UnexpectedStoreResponse(String),
    /// More tokens were requested than the bucket can ever hold.
    #[error("requested {requested} tokens but bucket burst is {burst}")]
    ExceedsBurst { requested: u32, burst: u32 },
    /// The limiter blocks every request.
    #[error("rate limit is set to block all requests")]
    BlockAll,
    /// The caller's context was cancelled.
    #[error("context canceled")]
    Cancelled,
    /// The caller's context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    /// The store could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LimiterError {
    /// Check if this is the normalized block-all sentinel.
    pub fn is_block_all(&self) -> bool {
        matches!(self, Self::BlockAll)
    }

    /// Check if this error came from the caller's context.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Check if the wait was rejected for outliving the deadline.
    pub fn is_deadline_exceeded_by_wait(&self) -> bool {
        matches!(self, Self::WaitTimeExceedsDeadline { .. })
    }

    /// Errors that point at a store or clock defect rather than a routine denial.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::NegativeTimeDifference { .. } | Self::UnexpectedStoreResponse(_))
    }

    /// Computed wait for a rejected deadline, if present.
    pub fn wait_time(&self) -> Option<Duration> {
        match self {
            Self::WaitTimeExceedsDeadline { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Failures talking to the shared store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out")]
    Timeout,
    #[error("malformed value {value:?} stored at {key}")]
    Malformed { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn deadline_error_display_includes_durations() {
        let err = LimiterError::WaitTimeExceedsDeadline {
            wait: Duration::from_secs(10),
            deadline: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("10s"));
        assert!(msg.contains("5s"));
        assert_eq!(err.wait_time(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn predicates_cover_variants() {
        assert!(LimiterError::BlockAll.is_block_all());
        assert!(LimiterError::Cancelled.is_context_error());
        assert!(LimiterError::DeadlineExceeded.is_context_error());
        assert!(!LimiterError::BlockAll.is_context_error());
        assert!(LimiterError::NegativeTimeDifference { bucket: "b".into() }.is_protocol_error());
        assert!(LimiterError::UnexpectedStoreResponse("x".into()).is_protocol_error());
        assert!(!LimiterError::AllBlocked { bucket: "b".into() }.is_protocol_error());
        assert!(LimiterError::AllBlocked { bucket: "b".into() }.wait_time().is_none());
    }

    #[test]
    fn store_error_is_transparent_source() {
        let err: LimiterError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(err.to_string(), "store unavailable: connection refused");
        assert!(err.source().is_none());
    }
}
