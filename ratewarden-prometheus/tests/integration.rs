use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue};
use prometheus::Registry;
use ratewarden::prelude::*;
use ratewarden::telemetry::LimiterEvent;
use ratewarden::rate_limit::script::AcquireArgs;
use ratewarden::rate_limit::store::BucketKeys;
use ratewarden::{FallbackRegistry, InstantSleeper, LocalLimiter};
use ratewarden_prometheus::{MonitorGauges, PrometheusSink};
use std::sync::Arc;
use std::time::Duration;
use tower_service::Service;

/// Store whose every operation fails.
struct FailingStore;

#[async_trait]
impl TokenBucketStore for FailingStore {
    async fn acquire_tokens(
        &self,
        _keys: &BucketKeys,
        _args: &AcquireArgs,
    ) -> Result<(i64, i64), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set_replenishment(
        &self,
        _keys: &BucketKeys,
        _rate: i64,
        _interval_seconds: i64,
        _burst: i64,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Timeout)
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, StoreError> {
        Err(StoreError::Timeout)
    }
}

fn metric_registered(registry: &Registry, name: &str) -> bool {
    registry.gather().iter().any(|mf| mf.get_name() == name)
}

#[tokio::test]
async fn registers_metrics() {
    let registry = Registry::new();
    let sink = PrometheusSink::new(registry.clone()).expect("Failed to create PrometheusSink");
    sink.wait_duration().with_label_values(&["urn", "false"]);
    sink.fallbacks().with_label_values(&["b"]);

    assert!(metric_registered(sink.registry(), "ratewarden_limiter_wait_duration_seconds"));
    assert!(metric_registered(sink.registry(), "ratewarden_limiter_fallback_total"));
    assert!(PrometheusSink::new(registry).is_err(), "duplicate registration must fail");
}

#[tokio::test]
async fn wait_events_observed_by_urn_and_outcome() {
    let mut sink = PrometheusSink::new(Registry::new()).expect("Failed to create PrometheusSink");

    for failed in [false, false, true] {
        sink.call(LimiterEvent::Wait {
            urn: "github.com:api".into(),
            duration: Duration::from_millis(20),
            failed,
        })
        .await
        .expect("Failed to call sink with wait event");
    }

    let ok = sink.wait_duration().with_label_values(&["github.com:api", "false"]);
    let failed = sink.wait_duration().with_label_values(&["github.com:api", "true"]);
    assert_eq!(ok.get_sample_count(), 2);
    assert_eq!(failed.get_sample_count(), 1);
}

#[tokio::test]
async fn instrumented_limiter_feeds_histogram() {
    let sink = PrometheusSink::new(Registry::new()).expect("Failed to create PrometheusSink");
    let limiter = InstrumentedLimiter::new("urn:local", LocalLimiter::new("local", Some(1.0), 2))
        .with_sink(sink.clone());
    let ctx = WaitContext::background();

    limiter.wait(&ctx).await.expect("within burst");
    limiter.wait_n(&ctx, 3).await.expect_err("above burst");

    assert_eq!(
        sink.wait_duration().with_label_values(&["urn:local", "false"]).get_sample_count(),
        1
    );
    assert_eq!(
        sink.wait_duration().with_label_values(&["urn:local", "true"]).get_sample_count(),
        1
    );
}

#[tokio::test]
async fn store_outage_counts_fallbacks() {
    let sink = PrometheusSink::new(Registry::new()).expect("Failed to create PrometheusSink");
    let backend = Arc::new(
        LimiterBackend::new(FailingStore)
            .with_sleeper(Arc::new(InstantSleeper))
            .with_fallback_registry(Arc::new(FallbackRegistry::new()))
            .with_sink(sink.clone()),
    );
    let limiter = backend.limiter("gitlab.com:api_tokens");
    let ctx = WaitContext::background();

    limiter.wait(&ctx).await.expect("fallback admits within burst");
    limiter.wait(&ctx).await.expect("fallback admits within burst");

    assert_eq!(sink.fallbacks().with_label_values(&["gitlab.com:api_tokens"]).get(), 2);
}

#[tokio::test]
async fn monitor_gauges_follow_registry() {
    let registry = Registry::new();
    let gauges = MonitorGauges::new(&registry).expect("Failed to create MonitorGauges");
    let monitors = MonitorRegistry::new();

    let known = monitors.get_or_set("https://github.com", "abc", None, Arc::new(Monitor::default()));
    monitors.get_or_set("https://gitlab.com", "abc", None, Arc::new(Monitor::new("")));

    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("x-ratelimit-limit", "5000"),
        ("x-ratelimit-remaining", "4321"),
        ("x-ratelimit-reset", "4102444800"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    known.update(&headers);

    gauges.update_from(&monitors);

    assert_eq!(gauges.limit().with_label_values(&["https://github.com/:abc"]).get(), 5000);
    assert_eq!(gauges.remaining().with_label_values(&["https://github.com/:abc"]).get(), 4321);
    assert!(metric_registered(&registry, "ratewarden_monitor_limit"));
    // unknown monitors are not exported
    assert_eq!(
        registry
            .gather()
            .iter()
            .filter(|mf| mf.get_name() == "ratewarden_monitor_remaining")
            .map(|mf| mf.get_metric().len())
            .sum::<usize>(),
        1
    );
}
