use std::fmt;
use std::time::Duration;

/// Events emitted by limiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterEvent {
    /// A `wait_n` call finished.
    Wait {
        /// Caller-supplied identifier of the instrumented limiter.
        urn: String,
        /// Time spent inside `wait_n`, including any blocking.
        duration: Duration,
        /// Whether the call returned an error.
        failed: bool,
    },
    /// The shared store was unreachable and the local limiter served the call.
    Fallback {
        bucket: String,
        /// Last store error seen before giving up.
        error: String,
    },
}

impl LimiterEvent {
    /// Short label for the variant, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            LimiterEvent::Wait { .. } => "wait",
            LimiterEvent::Fallback { .. } => "fallback",
        }
    }
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Wait { urn, duration, failed } => {
                write!(f, "Wait(urn={}, duration={:?}, failed={})", urn, duration, failed)
            }
            LimiterEvent::Fallback { bucket, error } => {
                write!(f, "Fallback(bucket={}, error={})", bucket, error)
            }
        }
    }
}
