//! Randomized delays between store retry attempts.
//!
//! Concurrent callers that hit a store outage at the same moment would otherwise
//! retry in lockstep. A uniform delay spreads them out.
//!
//! ```rust
//! use ratewarden::Jitter;
//! use std::time::Duration;
//!
//! let jitter = Jitter::uniform(Duration::from_millis(50), Duration::from_millis(250)).unwrap();
//! let delay = jitter.delay();
//! assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(250));
//! ```

use rand::{rng, Rng};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jitter {
    /// Fixed delay, for deterministic tests.
    Fixed(Duration),
    /// Uniformly random in `[min, max]` milliseconds.
    Uniform { min: Duration, max: Duration },
}

impl Jitter {
    /// Uniform jitter between `min` and `max` inclusive.
    pub fn uniform(min: Duration, max: Duration) -> Result<Self, &'static str> {
        if min > max {
            return Err("uniform jitter: min must not exceed max");
        }
        Ok(Jitter::Uniform { min, max })
    }

    pub fn fixed(delay: Duration) -> Self {
        Jitter::Fixed(delay)
    }

    /// Draw the next delay from the thread-local RNG.
    pub fn delay(&self) -> Duration {
        let mut rng = rng();
        self.delay_with_rng(&mut rng)
    }

    /// Draw the next delay from a caller-provided RNG.
    pub fn delay_with_rng<R: Rng>(&self, rng: &mut R) -> Duration {
        match self {
            Jitter::Fixed(delay) => *delay,
            Jitter::Uniform { min, max } => {
                let lo = as_millis_saturated(*min);
                let hi = as_millis_saturated(*max);
                Duration::from_millis(rng.random_range(lo..=hi))
            }
        }
    }
}

fn as_millis_saturated(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}
