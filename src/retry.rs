//! Bounded retry for store round trips.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries).
//! - Every `Err` from the operation is retried; business denials travel in `Ok`.
//! - The delay between attempts comes from [`Jitter`] and is slept through the injected
//!   [`Sleeper`], raced against the caller's [`WaitContext`].
//! - The context is checked before every attempt, so a caller is never kept retrying
//!   past its deadline.

use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use crate::{Jitter, LimiterError, WaitContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Why a retried operation gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retry exhausted after {attempts} attempts; last error: {last}")]
    Exhausted { attempts: usize, last: E },
    /// The context finished before an attempt succeeded.
    #[error(transparent)]
    Interrupted(LimiterError),
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Policy from already-validated parts; at least one attempt is always made.
    pub fn new(max_attempts: usize, jitter: Jitter, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { max_attempts: max_attempts.max(1), jitter, sleeper }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, attempts run out, or `ctx` finishes.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        ctx: &WaitContext,
        mut operation: Op,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        Fut: Future<Output = Result<T, E>>,
        Op: FnMut() -> Fut,
    {
        let mut attempt = 0;
        loop {
            if let Some(err) = ctx.err() {
                return Err(RetryError::Interrupted(err));
            }
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(last) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted { attempts: attempt, last });
                }
                Err(e) => {
                    let delay = self.jitter.delay();
                    warn!(
                        target: "ratewarden::retry",
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store operation failed; retrying"
                    );
                    sleep_or_cancel(self.sleeper.as_ref(), ctx, delay)
                        .await
                        .map_err(RetryError::Interrupted)?;
                }
            }
        }
    }
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

pub struct RetryPolicyBuilder {
    max_attempts: usize,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicyBuilder {
    /// Defaults: 8 attempts, 50–250 ms uniform delay, tokio timer.
    pub fn new() -> Self {
        Self {
            max_attempts: 8,
            jitter: Jitter::Uniform {
                min: Duration::from_millis(50),
                max: Duration::from_millis(250),
            },
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(RetryPolicy { max_attempts: self.max_attempts, jitter: self.jitter, sleeper: self.sleeper })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "TestError: {}", self.0)
        }
    }

    fn policy(attempts: usize, sleeper: Arc<dyn Sleeper>) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(attempts)
            .with_jitter(Jitter::fixed(Duration::from_millis(100)))
            .with_sleeper(sleeper)
            .build()
            .expect("builder")
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let sleeper = TrackingSleeper::new();
        let policy = policy(5, Arc::new(sleeper.clone()));
        let counter = &AtomicUsize::new(0);

        let result = policy
            .execute(&WaitContext::background(), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError(format!("attempt {n}")))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(100); 2]);
    }

    #[tokio::test]
    async fn exhaustion_keeps_last_error() {
        let policy = policy(3, Arc::new(InstantSleeper));
        let counter = &AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .execute(&WaitContext::background(), move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError(format!("attempt {n}")))
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted { attempts: 3, last: TestError("attempt 2".into()) })
        );
    }

    #[tokio::test]
    async fn cancelled_context_skips_operation() {
        let policy = policy(3, Arc::new(InstantSleeper));
        let ctx = WaitContext::background();
        ctx.cancel();
        let counter = &AtomicUsize::new(0);

        let result: Result<(), RetryError<TestError>> = policy
            .execute(&ctx, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(RetryError::Interrupted(LimiterError::Cancelled)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_backoff() {
        let policy = RetryPolicy::builder()
            .max_attempts(8)
            .with_jitter(Jitter::fixed(Duration::from_secs(10)))
            .build()
            .unwrap();
        let ctx = WaitContext::background().with_timeout(Duration::from_secs(1));

        let result: Result<(), _> =
            policy.execute(&ctx, || async { Err(TestError("down".into())) }).await;

        assert_eq!(result, Err(RetryError::Interrupted(LimiterError::DeadlineExceeded)));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = RetryPolicy::builder().max_attempts(0).build().unwrap_err();
        assert_eq!(err, BuildError::InvalidMaxAttempts(0));
    }
}
