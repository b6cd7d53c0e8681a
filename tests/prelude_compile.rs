//! Compile-time prelude coverage test.
use ratewarden::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let backend = Arc::new(
        LimiterBackend::new(InMemoryBucketStore::new())
            .with_config(LimiterConfig::default())
            .expect("default config is valid")
            .with_sink(MemorySink::new()),
    );
    let hosts = CodeHostRateLimiter::new(Arc::clone(&backend));
    let ctx = WaitContext::background();
    hosts
        .set_code_host_api_rate_limit_config(&ctx, "https://example.com/", Quota::Unlimited, Duration::from_secs(1))
        .await
        .expect("config write failed");

    let limiter = InstrumentedLimiter::new("urn:example", hosts.api_limiter("https://example.com/"));
    let mut svc = RateLimitLayer::new(limiter)
        .layer(service_fn(|_req: ()| async { Ok::<_, std::io::Error>(()) }));
    svc.call(()).await.expect("service call failed");

    let _monitor: Arc<Monitor> = MonitorRegistry::global().get_or_set(
        "https://example.com",
        "prelude",
        None,
        Arc::new(Monitor::default()),
    );
    let _: Option<&LimiterError> = None;
    let _: Option<&StoreError> = None;
    let _ = (NullSink, LogSink);
}
