//! End-to-end tests: real sockets, mock backends, reqwest as the client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

mod common;

async fn get(client: &reqwest::Client, url: &str) -> (StatusCode, String) {
    let response = client.get(url).send().await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_two_backends_with_request_limit() {
    let a = common::start_mock_backend("backend-a").await;
    let b = common::start_mock_backend("backend-b").await;

    let mut config = common::proxy_config(&[a, b]);
    config.cache.enabled = false;
    config.abuse_filter.request_limit = 100;
    config.abuse_filter.ban_secs = 1;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = reqwest::Client::new();
    let url = format!("http://{proxy}/work");
    let mut served: HashMap<String, u32> = HashMap::new();

    for _ in 0..100 {
        let (status, body) = get(&client, &url).await;
        assert_eq!(status, StatusCode::OK);
        *served.entry(body).or_default() += 1;
    }
    assert_eq!(served["backend-a"], 50);
    assert_eq!(served["backend-b"], 50);

    for _ in 0..5 {
        let (status, _) = get(&client, &url).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let (status, _) = get(&client, &url).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_round_robin_in_declaration_order() {
    let a = common::start_mock_backend("a").await;
    let b = common::start_mock_backend("b").await;
    let c = common::start_mock_backend("c").await;

    let mut config = common::proxy_config(&[a, b, c]);
    config.cache.enabled = false;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = reqwest::Client::new();
    let mut order = Vec::new();
    for _ in 0..6 {
        let (_, body) = get(&client, &format!("http://{proxy}/")).await;
        order.push(body);
    }
    assert_eq!(order, ["a", "b", "c", "a", "b", "c"]);
}

#[tokio::test]
async fn test_unreachable_backend_returns_bad_gateway() {
    let dead = common::unused_addr().await;
    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(&[dead])).await;

    let client = reqwest::Client::new();
    let (status, body) = get(&client, &format!("http://{proxy}/")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "Upstream request failed");
}

#[tokio::test]
async fn test_slow_backend_hits_header_timeout() {
    let slow = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        (200, "too late".to_string())
    })
    .await;

    let mut config = common::proxy_config(&[slow]);
    config.transport.response_header_timeout_secs = 1;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = reqwest::Client::new();
    let start = Instant::now();
    let (status, _) = get(&client, &format!("http://{proxy}/slow")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_slow_backend_hits_request_deadline() {
    let slow = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        (200, "too late".to_string())
    })
    .await;

    let mut config = common::proxy_config(&[slow]);
    config.transport.request_timeout_secs = 1;
    config.transport.response_header_timeout_secs = 10;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = reqwest::Client::new();
    let start = Instant::now();
    let (status, body) = get(&client, &format!("http://{proxy}/slow")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "Upstream request failed");
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_repeat_gets_are_served_from_cache() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let backend = common::start_programmable_backend(move |_| {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            (200, format!("response {n}"))
        }
    })
    .await;

    let (proxy, _shutdown) = common::start_proxy(common::proxy_config(&[backend])).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let (status, body) = get(&client, &format!("http://{proxy}/catalog?page=1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "response 1");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let response = client
        .post(format!("http://{proxy}/catalog?page=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "response 2");
}

#[tokio::test]
async fn test_backend_errors_lead_to_ban() {
    let failing = common::start_programmable_backend(|_| async {
        (500, "broken".to_string())
    })
    .await;

    let mut config = common::proxy_config(&[failing]);
    config.abuse_filter.error_limit = 3;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let client = reqwest::Client::new();
    for _ in 0..3 {
        let (status, _) = get(&client, &format!("http://{proxy}/")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
    let (status, _) = get(&client, &format!("http://{proxy}/")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_proxy_headers_reach_backend() {
    let backend = common::start_programmable_backend(|head| async move {
        let host = common::header_value(&head, "host").unwrap_or_default();
        let forwarded = common::header_value(&head, "x-forwarded-for").unwrap_or_default();
        let request_id = common::header_value(&head, "x-request-id").unwrap_or_default();
        (200, format!("{host}|{forwarded}|{request_id}"))
    })
    .await;

    let mut config = common::proxy_config(&[backend]);
    config.cache.enabled = false;
    let (proxy, _shutdown) = common::start_proxy(config).await;

    let response = reqwest::Client::new()
        .get(format!("http://{proxy}/echo"))
        .header("x-forwarded-for", "198.51.100.20")
        .send()
        .await
        .unwrap();
    let response_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    let body = response.text().await.unwrap();
    let parts: Vec<&str> = body.split('|').collect();
    assert_eq!(parts[0], backend.to_string());
    assert_eq!(parts[1], "198.51.100.20, 127.0.0.1");
    assert_eq!(parts[2], response_id);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let backend = common::start_mock_backend("ok").await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(&[backend])).await;

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let (status, _) = get(&client, &format!("http://{proxy}/")).await;
    assert_eq!(status, StatusCode::OK);

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.get(format!("http://{proxy}/")).send().await.is_err());
}
