//! Telemetry for limiters.
//!
//! Limiters emit [`LimiterEvent`]s into a [`TelemetrySink`], which is a
//! `tower::Service<LimiterEvent>`. Emission is best-effort: a sink that is not ready
//! or fails never affects the admission decision.
//!
//! - `InstrumentedLimiter` emits [`LimiterEvent::Wait`] around every `wait_n`.
//! - `DistributedLimiter` emits [`LimiterEvent::Fallback`] when it degrades to the
//!   local limiter.

pub mod events;
pub mod sinks;

pub use events::LimiterEvent;
pub use sinks::{emit_best_effort, LogSink, MemorySink, MulticastSink, NullSink, TelemetrySink};
