//! Telemetry wrapper for any [`Limiter`].

use super::{Limiter, Limits};
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use crate::{LimiterError, WaitContext};
use async_trait::async_trait;
use std::time::Instant;

/// Records how long every acquisition took and whether it failed.
///
/// Limiters that expose [`Limits`] of zero rate and zero burst short-circuit to
/// [`LimiterError::BlockAll`] without being called, and a store-reported
/// [`LimiterError::AllBlocked`] is normalised to the same sentinel.
#[derive(Debug, Clone)]
pub struct InstrumentedLimiter<L, T = NullSink> {
    urn: String,
    inner: L,
    sink: T,
}

impl<L: Limiter> InstrumentedLimiter<L> {
    pub fn new(urn: impl Into<String>, inner: L) -> Self {
        Self { urn: urn.into(), inner, sink: NullSink }
    }
}

impl<L, T> InstrumentedLimiter<L, T> {
    pub fn with_sink<U: TelemetrySink>(self, sink: U) -> InstrumentedLimiter<L, U> {
        InstrumentedLimiter { urn: self.urn, inner: self.inner, sink }
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L, T> Limiter for InstrumentedLimiter<L, T>
where
    L: Limiter,
    T: TelemetrySink,
    T::Future: Send + 'static,
{
    async fn wait_n(&self, ctx: &WaitContext, n: u32) -> Result<(), LimiterError> {
        if self.inner.limits().is_some_and(|l| l.blocks_all()) {
            return Err(LimiterError::BlockAll);
        }

        let start = Instant::now();
        let result = self.inner.wait_n(ctx, n).await.map_err(|err| match err {
            LimiterError::AllBlocked { .. } => LimiterError::BlockAll,
            other => other,
        });
        emit_best_effort(
            self.sink.clone(),
            LimiterEvent::Wait {
                urn: self.urn.clone(),
                duration: start.elapsed(),
                failed: result.is_err(),
            },
        )
        .await;
        result
    }

    fn limits(&self) -> Option<Limits> {
        self.inner.limits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::fallback::LocalLimiter;
    use crate::telemetry::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingBlocked {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Limiter for CountingBlocked {
        async fn wait_n(&self, _ctx: &WaitContext, _n: u32) -> Result<(), LimiterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LimiterError::AllBlocked { bucket: "b".into() })
        }
    }

    #[tokio::test]
    async fn zero_limits_short_circuit() {
        let sink = MemorySink::new();
        let limiter =
            InstrumentedLimiter::new("urn:x", LocalLimiter::new("b", Some(0.0), 0)).with_sink(sink.clone());

        let err = limiter.wait(&WaitContext::background()).await.unwrap_err();
        assert_eq!(err, LimiterError::BlockAll);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn all_blocked_normalised_and_recorded() {
        let sink = MemorySink::new();
        let limiter = InstrumentedLimiter::new("urn:x", CountingBlocked::default()).with_sink(sink.clone());

        let err = limiter.wait(&WaitContext::background()).await.unwrap_err();
        assert!(err.is_block_all());
        assert_eq!(limiter.inner().calls.load(Ordering::SeqCst), 1);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], LimiterEvent::Wait { urn, failed: true, .. } if urn == "urn:x"));
    }

    #[tokio::test]
    async fn successful_wait_recorded() {
        let sink = MemorySink::new();
        let limiter = InstrumentedLimiter::new("urn:y", LocalLimiter::new("b", None, 0))
            .with_sink(sink.clone());

        limiter.wait_n(&WaitContext::background(), 3).await.unwrap();
        assert!(matches!(&sink.events()[0], LimiterEvent::Wait { failed: false, .. }));
    }
}
