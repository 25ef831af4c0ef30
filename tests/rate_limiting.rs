//! RequestRateLimiter behaviour through the HTTP surface.

mod common;

use std::sync::Arc;

use api_gateway::rate_limit::ManualClock;
use api_gateway::Gateway;
use common::{config, serve, start_echo_backend};

async fn limited_gateway(extra: &str, filter: &str) -> (common::TestGateway, Arc<ManualClock>) {
    let backend = start_echo_backend().await;
    let toml = format!(
        r#"
        {extra}

        [[routes]]
        id = "limited"
        uri = "http://{backend}"
        predicates = ["Path=/limited/**"]
        filters = [{filter}]
        "#
    );
    let clock = Arc::new(ManualClock::new(1_000));
    let gateway = Gateway::builder(config(&toml))
        .clock(clock.clone())
        .build()
        .await
        .unwrap();
    (serve(gateway).await, clock)
}

#[tokio::test]
async fn test_burst_then_429_then_refill() {
    let (gw, clock) = limited_gateway(
        "",
        r#"{ name = "RequestRateLimiter", args = { replenishRate = 1, burstCapacity = 5 } }"#,
    )
    .await;

    for i in 0..5 {
        let response = reqwest::get(gw.url("/limited/a")).await.unwrap();
        assert_eq!(response.status(), 200, "request {} should pass", i);
    }
    let response = reqwest::get(gw.url("/limited/a")).await.unwrap();
    assert_eq!(response.status(), 429);

    clock.advance(1);
    assert_eq!(reqwest::get(gw.url("/limited/a")).await.unwrap().status(), 200);
    assert_eq!(reqwest::get(gw.url("/limited/a")).await.unwrap().status(), 429);
}

#[tokio::test]
async fn test_principal_buckets_are_independent() {
    let (gw, _clock) = limited_gateway(
        r#"
        [rate_limiter]
        principal_header = "x-user"
        "#,
        r#"{ name = "RequestRateLimiter", args = { replenishRate = 1, burstCapacity = 1, keyResolver = "principalNameKeyResolver" } }"#,
    )
    .await;
    let client = reqwest::Client::new();
    let status = |user: &'static str| {
        let client = client.clone();
        let url = gw.url("/limited/a");
        async move {
            client
                .get(url)
                .header("x-user", user)
                .send()
                .await
                .unwrap()
                .status()
        }
    };

    assert_eq!(status("alice").await, 200);
    assert_eq!(status("alice").await, 429);
    assert_eq!(status("bob").await, 200);
}

#[tokio::test]
async fn test_missing_principal_is_a_server_error() {
    let (gw, _clock) = limited_gateway(
        "",
        r#"{ name = "RequestRateLimiter", args = { replenishRate = 1, keyResolver = "principalNameKeyResolver" } }"#,
    )
    .await;

    let response = reqwest::get(gw.url("/limited/a")).await.unwrap();
    assert_eq!(response.status(), 500);
}
