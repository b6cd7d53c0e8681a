//! The atomic bucket scripts.
//!
//! These functions are the server-side half of the store contract: a store runs
//! them against one consistent snapshot of a bucket's key family and applies the
//! resulting write before any other caller can observe the bucket. They never fail;
//! every denial is encoded in the returned [`GrantCode`].
//!
//! Tokens granted with a non-zero wait are reserved immediately (the stored capacity
//! goes negative), so concurrent callers queue behind each other instead of racing
//! for the same replenishment.

use crate::config::UNLIMITED_RATE;

/// Result codes of the acquire script.
///
/// The second element of the reply is the wait in seconds, except for
/// [`GrantCode::ExceedsBurst`] where it carries the bucket's burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantCode {
    /// Tokens reserved; sleep for the returned wait before using them.
    Granted,
    /// The wait would outlast the caller's deadline; nothing was reserved.
    ExceedsDeadline,
    /// The caller's clock is behind the bucket's last replenishment.
    NegativeTimeDifference,
    /// The bucket's rate is zero.
    AllBlocked,
    /// More tokens were requested than the bucket can ever hold.
    ExceedsBurst,
}

impl GrantCode {
    /// Wire value of the code.
    pub fn code(self) -> i64 {
        match self {
            GrantCode::Granted => 1,
            GrantCode::ExceedsDeadline => -1,
            GrantCode::NegativeTimeDifference => -2,
            GrantCode::AllBlocked => -3,
            GrantCode::ExceedsBurst => -4,
        }
    }

    /// Decode a wire value; `None` for codes the script never produces.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(GrantCode::Granted),
            -1 => Some(GrantCode::ExceedsDeadline),
            -2 => Some(GrantCode::NegativeTimeDifference),
            -3 => Some(GrantCode::AllBlocked),
            -4 => Some(GrantCode::ExceedsBurst),
            _ => None,
        }
    }
}

/// Arguments of one acquisition, all in whole seconds / tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireArgs {
    pub now_epoch_seconds: i64,
    /// `-1` when the caller has no deadline.
    pub max_wait_seconds: i64,
    /// Rate applied when the bucket has never been configured.
    pub fallback_rate: i64,
    pub fallback_interval_seconds: i64,
    pub burst: i64,
    pub tokens: i64,
}

/// Values currently held under a bucket's key family; `None` for absent keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub capacity: Option<i64>,
    pub last_replenishment: Option<i64>,
    pub rate: Option<i64>,
    pub interval_seconds: Option<i64>,
    pub burst: Option<i64>,
}

/// State the store must persist after a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketWrite {
    pub capacity: i64,
    pub last_replenishment: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOutcome {
    pub code: GrantCode,
    pub wait_seconds: i64,
    pub write: Option<BucketWrite>,
}

impl AcquireOutcome {
    fn deny(code: GrantCode, wait_seconds: i64) -> Self {
        Self { code, wait_seconds, write: None }
    }

    /// The `(grantCode, waitSeconds)` tuple returned to the client.
    pub fn reply(&self) -> (i64, i64) {
        (self.code.code(), self.wait_seconds)
    }
}

/// Acquire `args.tokens` from the bucket described by `snapshot`.
pub fn acquire(snapshot: &BucketSnapshot, args: &AcquireArgs) -> AcquireOutcome {
    let rate = snapshot.rate.unwrap_or(args.fallback_rate);
    let interval = snapshot.interval_seconds.unwrap_or(args.fallback_interval_seconds).max(1);
    let burst = snapshot.burst.unwrap_or(args.burst);
    let now = args.now_epoch_seconds;

    if rate == UNLIMITED_RATE {
        return AcquireOutcome::deny(GrantCode::Granted, 0);
    }
    if rate <= 0 {
        return AcquireOutcome::deny(GrantCode::AllBlocked, 0);
    }
    if args.tokens > burst {
        return AcquireOutcome::deny(GrantCode::ExceedsBurst, burst);
    }

    let mut capacity = snapshot.capacity.unwrap_or(burst);
    let mut last = snapshot.last_replenishment.unwrap_or(now);
    let elapsed = now - last;
    if elapsed < 0 {
        return AcquireOutcome::deny(GrantCode::NegativeTimeDifference, 0);
    }

    let rate_wide = i128::from(rate);
    let interval_wide = i128::from(interval);
    let tokens_to_add = i128::from(elapsed) * rate_wide / interval_wide;
    if tokens_to_add > 0 {
        let refilled = i128::from(capacity) + tokens_to_add;
        if refilled >= i128::from(burst) {
            capacity = burst;
            last = now;
        } else {
            capacity = refilled as i64;
            // Advance only by the time the added tokens account for.
            last += (tokens_to_add * interval_wide / rate_wide) as i64;
        }
    }

    let remaining = capacity - args.tokens;
    if remaining >= 0 {
        return AcquireOutcome {
            code: GrantCode::Granted,
            wait_seconds: 0,
            write: Some(BucketWrite { capacity: remaining, last_replenishment: last }),
        };
    }

    let needed = i128::from(-remaining);
    let refill_seconds = (needed * interval_wide + rate_wide - 1) / rate_wide;
    let wait = (i128::from(last) + refill_seconds - i128::from(now)).max(0) as i64;

    if args.max_wait_seconds != -1 && wait > args.max_wait_seconds {
        return AcquireOutcome::deny(GrantCode::ExceedsDeadline, wait);
    }

    AcquireOutcome {
        code: GrantCode::Granted,
        wait_seconds: wait,
        write: Some(BucketWrite { capacity: remaining, last_replenishment: last }),
    }
}

/// Values written by the replenishment script, in key order rate, interval, burst.
pub fn replenishment(rate: i64, interval_seconds: i64, burst: i64) -> [i64; 3] {
    [rate, interval_seconds.max(1), burst]
}
