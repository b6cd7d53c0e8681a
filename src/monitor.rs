//! Reactive rate-limit tracking from response headers.
//!
//! Where the caller cannot know a request's cost up front, the remote API usually
//! reports what is left of its quota on every response. A [`Monitor`] records the
//! latest report and turns it into waits:
//!
//! - [`Monitor::wait_for_rate_limit`] blocks a foreground request until the quota
//!   resets, when the remaining budget cannot cover it.
//! - [`Monitor::recommended_wait_for_background_op`] paces background work so that
//!   it never drains the quota foreground traffic depends on.
//!
//! Header names are `{prefix}RateLimit-Limit`, `{prefix}RateLimit-Remaining` and
//! `{prefix}RateLimit-Reset` (unix seconds), plus `Retry-After` (seconds). GitHub
//! style hosts use the `X-` prefix, GitLab style hosts none.

use crate::clock::{from_epoch_seconds, Clock, SystemClock, MAX_EPOCH_SECONDS};
use crate::sleeper::{sleep_or_cancel, Sleeper, TokioSleeper};
use crate::WaitContext;
use http::HeaderMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Responses carrying this header were served from a cache; their quota headers are stale.
pub const FROM_CACHE_HEADER: &str = "X-From-Cache";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Background work is paced against this share of the remaining quota.
const USABLE_FRACTION: f64 = 0.8;
/// Added to the time until reset, covering clock skew with the remote host.
const RESET_BUFFER: Duration = Duration::from_secs(3 * 60);
/// Window assumed once the reported reset has passed.
const FRESH_WINDOW: Duration = Duration::from_secs(60 * 60);
const THROTTLE_DELAY: Duration = Duration::from_millis(200);

/// Point-in-time view of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: i64,
    /// Time until the quota resets; zero once passed.
    pub reset: Duration,
    /// Time until an active `Retry-After` expires; zero when none.
    pub retry: Duration,
    /// `false` until a response carried a complete, well-formed header set.
    pub known: bool,
}

#[derive(Debug, Clone, Copy)]
struct MonitorState {
    known: bool,
    limit: i64,
    remaining: i64,
    reset: SystemTime,
    retry: Option<SystemTime>,
}

/// Tracks one remote quota, e.g. one token against one code host.
#[derive(Debug)]
pub struct Monitor {
    header_prefix: String,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    state: Mutex<MonitorState>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new("X-")
    }
}

impl Monitor {
    pub fn new(header_prefix: impl Into<String>) -> Self {
        Self {
            header_prefix: header_prefix.into(),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            state: Mutex::new(MonitorState {
                known: false,
                limit: 0,
                remaining: 0,
                reset: SystemTime::UNIX_EPOCH,
                retry: None,
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn header_prefix(&self) -> &str {
        &self.header_prefix
    }

    fn header(&self, name: &str) -> String {
        format!("{}RateLimit-{name}", self.header_prefix)
    }

    /// Record the quota reported by a response.
    pub fn update(&self, headers: &HeaderMap) {
        if headers.contains_key(FROM_CACHE_HEADER) {
            return;
        }

        let now = self.clock.now();
        let mut state = self.state.lock().expect("monitor poisoned");

        if let Some(seconds) = parse_header(headers, RETRY_AFTER_HEADER) {
            if seconds > 0 {
                let retry = now
                    .checked_add(Duration::from_secs(seconds.unsigned_abs()))
                    .filter(|at| *at <= from_epoch_seconds(MAX_EPOCH_SECONDS))
                    .unwrap_or_else(|| from_epoch_seconds(MAX_EPOCH_SECONDS));
                state.retry = Some(retry);
            }
        }

        let limit = parse_header(headers, &self.header("Limit"));
        let remaining = parse_header(headers, &self.header("Remaining"));
        let reset = parse_header(headers, &self.header("Reset"));
        let (Some(limit), Some(remaining), Some(reset)) = (limit, remaining, reset) else {
            state.known = false;
            return;
        };

        state.known = true;
        state.limit = limit;
        state.remaining = remaining;
        state.reset = from_epoch_seconds(reset);
        debug!(target: "ratewarden::monitor", limit, remaining, reset, "rate limit updated");
    }

    pub fn get(&self) -> RateLimitStatus {
        let now = self.clock.now();
        let state = *self.state.lock().expect("monitor poisoned");
        RateLimitStatus {
            remaining: state.remaining,
            reset: until(now, state.reset),
            retry: state.retry.map_or(Duration::ZERO, |retry| until(now, retry)),
            known: state.known,
        }
    }

    /// Limit reported by the last complete header set.
    pub fn total_limit(&self) -> Option<i64> {
        let state = self.state.lock().expect("monitor poisoned");
        state.known.then_some(state.limit)
    }

    /// Block until a request of `cost` fits the reported quota.
    ///
    /// Returns whether it waited, so the caller can treat its next attempt as a retry.
    /// A cancelled `ctx` cuts the wait short.
    pub async fn wait_for_rate_limit(&self, ctx: &WaitContext, cost: i64) -> bool {
        let wait = {
            let now = self.clock.now();
            let state = self.state.lock().expect("monitor poisoned");
            match state.retry.map(|retry| until(now, retry)) {
                Some(retry_in) if !retry_in.is_zero() => retry_in,
                _ if !state.known || state.remaining >= cost || cost > state.limit => {
                    return false;
                }
                _ => until(now, state.reset),
            }
        };
        if wait.is_zero() {
            return false;
        }

        debug!(target: "ratewarden::monitor", cost, wait_ms = wait.as_millis() as u64, "waiting for rate limit");
        if let Err(err) = sleep_or_cancel(self.sleeper.as_ref(), ctx, wait).await {
            debug!(target: "ratewarden::monitor", error = %err, "rate limit wait interrupted");
        }
        true
    }

    /// How long background work of `cost` should pause before running; never sleeps.
    pub fn recommended_wait_for_background_op(&self, cost: i64) -> Duration {
        let now = self.clock.now();
        let state = *self.state.lock().expect("monitor poisoned");

        if let Some(retry) = state.retry {
            let retry_in = until(now, retry);
            if !retry_in.is_zero() {
                return retry_in;
            }
        }
        if !state.known {
            return Duration::ZERO;
        }

        let (budget, time_remaining) = if now > state.reset {
            (state.limit, FRESH_WINDOW + RESET_BUFFER)
        } else {
            (state.remaining, until(now, state.reset) + RESET_BUFFER)
        };
        let usable = budget.max(0) as f64 * USABLE_FRACTION;
        let n = usable / cost.max(1) as f64;

        if n < 1.0 {
            time_remaining
        } else if n > 500.0 {
            Duration::ZERO
        } else if n > 250.0 {
            THROTTLE_DELAY
        } else {
            time_remaining.mul_f64(cost.max(1) as f64 / usable)
        }
    }
}

fn until(now: SystemTime, t: SystemTime) -> Duration {
    t.duration_since(now).unwrap_or(Duration::ZERO)
}

fn parse_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
