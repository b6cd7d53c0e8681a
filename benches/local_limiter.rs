use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ratewarden::prelude::*;
use ratewarden::{FallbackRegistry, LocalLimiter};
use std::sync::Arc;
use std::time::Duration;

fn local_limiter_unbounded(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = LocalLimiter::new("bench", None, 10);
    let ctx = WaitContext::background();

    c.bench_function("local_limiter_unbounded_wait", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.wait_n(&ctx, black_box(1)).await);
        });
    });
}

fn local_limiter_rejects_over_burst(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = LocalLimiter::new("bench", Some(1.0), 10);
    let ctx = WaitContext::background();

    c.bench_function("local_limiter_exceeds_burst", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.wait_n(&ctx, black_box(11)).await);
        });
    });
}

fn distributed_limiter_in_memory(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let backend = Arc::new(
        LimiterBackend::new(InMemoryBucketStore::new())
            .with_fallback_registry(Arc::new(FallbackRegistry::new())),
    );
    let limiter = backend.limiter("bench");
    let ctx = WaitContext::background();
    rt.block_on(limiter.set_token_bucket_config(&ctx, Quota::Unlimited, Duration::from_secs(1)))
        .unwrap();

    c.bench_function("distributed_limiter_in_memory_unlimited", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.wait_n(&ctx, black_box(1)).await);
        });
    });
}

criterion_group!(
    benches,
    local_limiter_unbounded,
    local_limiter_rejects_over_burst,
    distributed_limiter_in_memory
);
criterion_main!(benches);
