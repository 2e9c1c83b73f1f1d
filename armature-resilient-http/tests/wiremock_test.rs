//! Tests against a local HTTP server using the reqwest transport.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use armature_resilient_http::{
    policy_fn, HttpClient, HttpClientConfig, HttpClientConfigBuilder, RetryDecision,
    TransportErrorKind,
};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retries() -> HttpClientConfigBuilder {
    HttpClientConfig::builder().retry_wait(Duration::from_millis(1), Duration::from_millis(5))
}

fn count_requests(client: &HttpClient) -> Arc<AtomicU32> {
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();
    client.on_request(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test]
async fn test_get_with_merged_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("default", "1"))
        .and(query_param("q", "test"))
        .and(header("x-default", "defaultValue"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(
        fast_retries()
            .base_url(server.uri())
            .set_header("X-Default", "defaultValue")
            .param("default", "1")
            .build(),
    )
    .unwrap();

    let response = assert_ok!(client.get("api").query("q", "test").send().await);

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"item":"widget"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(fast_retries().base_url(server.uri()).build()).unwrap();

    let response = client
        .post("/orders")
        .json(&serde_json::json!({"item": "widget"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);
}

#[tokio::test]
async fn test_forced_retry_drains_and_replays() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/busy"))
        .and(body_string("payload"))
        .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(64 * 1024)))
        .expect(3)
        .mount(&server)
        .await;

    let client = HttpClient::new(
        fast_retries()
            .base_url(server.uri())
            .retry_max(2)
            .response_read_limit(1024)
            .retry_policy(policy_fn(|_, err| match err {
                None => RetryDecision::Retry,
                Some(_) => RetryDecision::Stop,
            }))
            .build(),
    )
    .unwrap();

    let err = client.put("/busy").body("payload").send().await.unwrap_err();

    assert!(err.is_giving_up());
    assert_eq!(err.status_code(), Some(503));
    let message = err.to_string();
    assert!(message.starts_with(&format!("PUT {}/busy giving up after 3 attempts", server.uri())));
    assert!(message.contains("response status 503"));
}

#[tokio::test]
async fn test_unsupported_scheme_is_not_retried() {
    let client = HttpClient::new(fast_retries().retry_max(3).build()).unwrap();
    let requests = count_requests(&client);

    let err = assert_err!(client.get("ftp://example.com/file").send().await);

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::UnsupportedScheme));
    assert!(!err.is_giving_up());
}

#[tokio::test]
async fn test_redirect_loop_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
        .mount(&server)
        .await;

    let client = HttpClient::new(
        fast_retries()
            .base_url(server.uri())
            .max_redirects(3)
            .retry_max(3)
            .build(),
    )
    .unwrap();
    let requests = count_requests(&client);

    let err = assert_err!(client.get("/loop").send().await);

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(err.transport_kind(), Some(TransportErrorKind::TooManyRedirects));
}

#[tokio::test]
async fn test_connection_refused_is_retried() {
    let client = HttpClient::new(fast_retries().retry_max(2).build()).unwrap();
    let requests = count_requests(&client);

    // Port 9 (discard) is closed on test machines.
    let err = client.get("http://127.0.0.1:9/").send().await.unwrap_err();

    assert_eq!(requests.load(Ordering::SeqCst), 3);
    assert!(err.is_giving_up());
    assert_eq!(err.attempts(), Some(3));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = HttpClient::new(
        fast_retries()
            .base_url(server.uri())
            .timeout(Duration::from_millis(200))
            .build(),
    )
    .unwrap();

    let err = client.get("/").send().await.unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_spraying_preset_serves_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header(
            "link",
            format!("<{}/?page=2>; rel=\"next\"", server.uri()).as_str(),
        ))
        .expect(3)
        .mount(&server)
        .await;

    let client = HttpClient::new(
        HttpClientConfigBuilder::from_config(HttpClientConfig::spraying())
            .base_url(server.uri())
            .build(),
    )
    .unwrap();

    for _ in 0..3 {
        let response = client.get("/").send().await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.links()[0].rel, "next");
    }
}
