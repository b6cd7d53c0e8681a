//! Prometheus metrics for `ratewarden`.
//! Bring your own `prometheus::Registry`; metrics are registered on construction.
//!
//! - [`PrometheusSink`] is a telemetry sink recording limiter waits and fallbacks.
//! - [`MonitorGauges`] exports the quota reported to every registered monitor.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use ratewarden::telemetry::{LimiterEvent, TelemetrySink};
use ratewarden::MonitorRegistry;
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    wait_duration: HistogramVec,
    fallbacks: IntCounterVec,
}

impl PrometheusSink {
    /// Create a sink and register its metrics into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let wait_duration = HistogramVec::new(
            HistogramOpts::new(
                "ratewarden_limiter_wait_duration_seconds",
                "Time spent waiting for rate limiter tokens",
            ),
            &["urn", "failed"],
        )?;
        let fallbacks = IntCounterVec::new(
            Opts::new(
                "ratewarden_limiter_fallback_total",
                "Acquisitions served by the local fallback limiter",
            ),
            &["bucket"],
        )?;
        registry.register(Box::new(wait_duration.clone()))?;
        registry.register(Box::new(fallbacks.clone()))?;
        Ok(Self { registry, wait_duration, fallbacks })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn wait_duration(&self) -> &HistogramVec {
        &self.wait_duration
    }

    pub fn fallbacks(&self) -> &IntCounterVec {
        &self.fallbacks
    }
}

impl tower_service::Service<LimiterEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: LimiterEvent) -> Self::Future {
        match &event {
            LimiterEvent::Wait { urn, duration, failed } => {
                let failed = if *failed { "true" } else { "false" };
                self.wait_duration
                    .with_label_values(&[urn.as_str(), failed])
                    .observe(duration.as_secs_f64());
            }
            LimiterEvent::Fallback { bucket, .. } => {
                self.fallbacks.with_label_values(&[bucket.as_str()]).inc();
            }
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}

/// Gauges mirroring the last quota each registered monitor saw.
#[derive(Clone, Debug)]
pub struct MonitorGauges {
    limit: IntGaugeVec,
    remaining: IntGaugeVec,
}

impl MonitorGauges {
    /// # Errors
    /// Returns an error if a gauge cannot be registered (e.g. name conflict).
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let limit = IntGaugeVec::new(
            Opts::new("ratewarden_monitor_limit", "Quota limit reported by the remote API"),
            &["monitor"],
        )?;
        let remaining = IntGaugeVec::new(
            Opts::new("ratewarden_monitor_remaining", "Remaining quota reported by the remote API"),
            &["monitor"],
        )?;
        registry.register(Box::new(limit.clone()))?;
        registry.register(Box::new(remaining.clone()))?;
        Ok(Self { limit, remaining })
    }

    /// Copy the state of every known monitor into the gauges; call before each scrape.
    pub fn update_from(&self, monitors: &MonitorRegistry) {
        let snapshot = monitors.snapshot();
        for entry in &snapshot {
            let Some(limit) = entry.limit.filter(|_| entry.known) else {
                continue;
            };
            self.limit.with_label_values(&[entry.key.as_str()]).set(limit);
            self.remaining.with_label_values(&[entry.key.as_str()]).set(entry.remaining);
        }
        debug!(target: "ratewarden::prometheus", monitors = snapshot.len(), "monitor gauges updated");
    }

    pub fn limit(&self) -> &IntGaugeVec {
        &self.limit
    }

    pub fn remaining(&self) -> &IntGaugeVec {
        &self.remaining
    }
}
