use crate::rate_limit::Limiter;
use crate::{LimiterError, WaitContext};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// Error returned by [`RateLimitService`].
#[derive(Debug, thiserror::Error)]
pub enum RateLimitedError<E> {
    /// The limiter refused or the wait was interrupted.
    #[error("rate limited: {0}")]
    Limited(#[source] LimiterError),
    #[error(transparent)]
    Inner(E),
}

impl<E> RateLimitedError<E> {
    pub fn limiter_error(&self) -> Option<&LimiterError> {
        match self {
            Self::Limited(err) => Some(err),
            Self::Inner(_) => None,
        }
    }
}

/// A layer that waits on a [`Limiter`] before every request.
#[derive(Debug)]
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
    cost: u32,
    max_wait: Option<Duration>,
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), cost: self.cost, max_wait: self.max_wait }
    }
}

impl<L> RateLimitLayer<L> {
    /// Charge one token per request and wait as long as it takes.
    pub fn new(limiter: L) -> Self {
        Self::from_shared(Arc::new(limiter))
    }

    pub fn from_shared(limiter: Arc<L>) -> Self {
        Self { limiter, cost: 1, max_wait: None }
    }

    /// Tokens charged per request.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Give up on requests whose wait would outlast `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L> {
    type Service = RateLimitService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService {
            inner: service,
            limiter: self.limiter.clone(),
            cost: self.cost,
            max_wait: self.max_wait,
        }
    }
}

/// Middleware service that enforces rate limits.
#[derive(Debug)]
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
    cost: u32,
    max_wait: Option<Duration>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            cost: self.cost,
            max_wait: self.max_wait,
        }
    }
}

impl<S, L, Req> Service<Req> for RateLimitService<S, L>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    L: Limiter + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = RateLimitedError<S::Error>;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RateLimitedError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = self.limiter.clone();
        let cost = self.cost;
        let ctx = match self.max_wait {
            Some(max_wait) => WaitContext::background().with_timeout(max_wait),
            None => WaitContext::background(),
        };
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            limiter.wait_n(&ctx, cost).await.map_err(RateLimitedError::Limited)?;
            inner.call(req).await.map_err(RateLimitedError::Inner)
        })
    }
}
