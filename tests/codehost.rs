use ratewarden::prelude::*;
use ratewarden::rate_limit::codehost::{api_bucket_name, git_bucket_name};
use ratewarden::{BucketLimit, FallbackRegistry, TrackingSleeper};
use std::sync::Arc;
use std::time::Duration;

const GITHUB: &str = "https://github.com/";
const GITLAB: &str = "https://gitlab.com/";

fn code_hosts() -> (CodeHostRateLimiter<InMemoryBucketStore>, TrackingSleeper) {
    let sleeper = TrackingSleeper::new();
    let backend = LimiterBackend::new(InMemoryBucketStore::new())
        .with_sleeper(Arc::new(sleeper.clone()))
        .with_fallback_registry(Arc::new(FallbackRegistry::new()));
    (CodeHostRateLimiter::new(Arc::new(backend)), sleeper)
}

#[tokio::test]
async fn api_and_git_buckets_are_independent() {
    let (hosts, sleeper) = code_hosts();
    let ctx = WaitContext::background();
    hosts
        .set_code_host_api_rate_limit_config(&ctx, GITHUB, Quota::Limited(0), Duration::from_secs(3600))
        .await
        .unwrap();
    hosts
        .set_code_host_git_rate_limit_config(&ctx, GITHUB, Quota::Unlimited, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(
        hosts.api_limiter(GITHUB).wait(&ctx).await,
        Err(LimiterError::AllBlocked { bucket: api_bucket_name(GITHUB) })
    );
    hosts.git_limiter(GITHUB).wait_n(&ctx, 500).await.unwrap();
    assert!(sleeper.calls().is_empty());
}

#[tokio::test]
async fn limiters_use_conventional_bucket_names() {
    let (hosts, _) = code_hosts();
    assert_eq!(hosts.api_limiter(GITLAB).bucket_name(), "https://gitlab.com/:api_tokens");
    assert_eq!(hosts.git_limiter(GITLAB).bucket_name(), git_bucket_name(GITLAB));
    assert_eq!(
        hosts.api_limiter(GITLAB).keys().bucket,
        "v2:rate_limiters:https://gitlab.com/:api_tokens"
    );
}

#[tokio::test]
async fn apply_writes_only_configured_buckets() {
    let (hosts, _) = code_hosts();
    let limits: Vec<CodeHostRateLimits> = serde_json::from_str(
        r#"[
            {"url": "https://github.com/", "api": {"quota": {"limited": 5000}, "interval_seconds": 3600}},
            {"url": "https://gitlab.com/",
             "api": {"quota": {"limited": 600}, "interval_seconds": 60},
             "git": {"quota": "unlimited", "interval_seconds": 1}}
        ]"#,
    )
    .unwrap();

    hosts.apply(&WaitContext::background(), &limits).await.unwrap();

    let state = hosts.backend().global_state().await.unwrap();
    let names: Vec<&str> = state.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["https://github.com/:api_tokens", "https://gitlab.com/:api_tokens", "https://gitlab.com/:git_tokens"]
    );
    assert_eq!(state["https://gitlab.com/:api_tokens"].limit, 600);
    assert_eq!(
        limits[0].api,
        Some(BucketLimit { quota: Quota::Limited(5000), interval_seconds: 3600 })
    );
}
