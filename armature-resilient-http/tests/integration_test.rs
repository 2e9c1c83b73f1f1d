//! Integration tests for armature-resilient-http

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use armature_resilient_http::{
    policy_fn, CancellationToken, HeaderMap, HttpClient, HttpClientConfig,
    HttpClientConfigBuilder, HttpClientError, Method, Request, RequestBody, RequestConfig,
    Response, RetryDecision, Transport, TransportError, TransportErrorKind, Url,
};
use async_trait::async_trait;
use futures::StreamExt;

type Script = dyn Fn(u32) -> Result<reqwest::Response, TransportError> + Send + Sync;

struct Seen {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
}

struct FakeTransport {
    calls: AtomicU32,
    closes: AtomicU32,
    seen: Mutex<Vec<Seen>>,
    script: Box<Script>,
}

impl FakeTransport {
    fn new(
        script: impl Fn(u32) -> Result<reqwest::Response, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    fn ok() -> Arc<Self> {
        Self::new(|_| Ok(status(200)))
    }

    fn failing(kind: TransportErrorKind, message: &'static str) -> Arc<Self> {
        Self::new(move |_| Err(TransportError::new(kind, message)))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn last_url(&self) -> Url {
        self.seen.lock().unwrap().last().unwrap().url.clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(Seen {
            method: request.method().clone(),
            url: request.url().clone(),
            headers: request.headers().clone(),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
        });
        (self.script)(attempt)
    }

    fn close_idle_connections(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn status(code: u16) -> reqwest::Response {
    http::Response::builder()
        .status(code)
        .body("")
        .unwrap()
        .into()
}

fn client_with(
    primary: Arc<FakeTransport>,
    configure: impl FnOnce(HttpClientConfigBuilder) -> HttpClientConfigBuilder,
) -> HttpClient {
    let builder = HttpClientConfig::builder()
        .transport(primary)
        .fallback_transport(FakeTransport::failing(
            TransportErrorKind::Other,
            "fallback must not be used",
        ))
        .retry_wait(Duration::from_millis(1), Duration::from_millis(1));
    HttpClient::new(configure(builder).build()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_makes_retry_max_plus_one_attempts() {
    for retry_max in 0..=3 {
        let transport = FakeTransport::failing(TransportErrorKind::Other, "connection reset by peer");
        let client = client_with(transport.clone(), |b| b.retry_max(retry_max));

        let err = client.get("http://example.com/retry").send().await.unwrap_err();

        assert_eq!(transport.calls(), retry_max + 1);
        assert!(err.is_giving_up());
        assert_eq!(err.attempts(), Some(retry_max + 1));
        assert!(err.to_string().contains("connection reset by peer"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_errors_stop_after_one_attempt() {
    let kinds = [
        (TransportErrorKind::TooManyRedirects, "stopped after 10 redirects"),
        (TransportErrorKind::UnsupportedScheme, "URL scheme is not allowed"),
        (TransportErrorKind::UnknownAuthority, "invalid peer certificate: UnknownIssuer"),
    ];

    for (kind, message) in kinds {
        let transport = FakeTransport::failing(kind, message);
        let client = client_with(transport.clone(), |b| b.retry_max(5));

        let err = client.get("http://example.com/").send().await.unwrap_err();

        assert_eq!(transport.calls(), 1, "{:?}", kind);
        assert_eq!(err.transport_kind(), Some(kind));
        assert!(!err.is_giving_up());
    }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_authority_error_is_surfaced_verbatim() {
    let transport = FakeTransport::failing(
        TransportErrorKind::UnknownAuthority,
        "x509: certificate signed by unknown authority",
    );
    let client = client_with(transport.clone(), |b| b.retry_max(3));

    let err = client.get("https://example.com/").send().await.unwrap_err();

    assert_eq!(transport.calls(), 1);
    assert_eq!(err.to_string(), "x509: certificate signed by unknown authority");
    assert!(!err.to_string().contains("giving up"));
}

#[tokio::test(start_paused = true)]
async fn test_always_retry_policy_gives_up_after_budget() {
    let transport = FakeTransport::failing(TransportErrorKind::Other, "temporary error");
    let client = client_with(transport.clone(), |b| {
        b.retry_max(2)
            .retry_policy(policy_fn(|_, _| RetryDecision::Retry))
    });

    let err = client.get("http://example.com/retry").send().await.unwrap_err();

    assert_eq!(transport.calls(), 3);
    assert!(err.to_string().contains("giving up after 3 attempts"));
    assert!(err
        .to_string()
        .starts_with("GET http://example.com/retry giving up after 3 attempts"));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_does_not_consume_retry_budget() {
    let primary = FakeTransport::failing(
        TransportErrorKind::Other,
        "net/http: HTTP/1.x transport connection broken: malformed HTTP version \"HTTP/2\"",
    );
    let fallback = FakeTransport::ok();
    let requests = Arc::new(AtomicU32::new(0));

    let client = HttpClient::new(
        HttpClientConfig::builder()
            .transport(primary.clone())
            .fallback_transport(fallback.clone())
            .retry_max(1)
            .build(),
    )
    .unwrap();
    let counter = requests.clone();
    client.on_request(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let response = client.get("http://example.com/").send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_idle_connections_closed_once_per_101_calls() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b.close_idle_connections(true));

    for _ in 0..100 {
        client.get("http://example.com/").send().await.unwrap();
    }
    assert_eq!(transport.closes(), 0);

    client.get("http://example.com/").send().await.unwrap();
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_idle_connections_untouched_when_disabled() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b.close_idle_connections(false));

    for _ in 0..150 {
        client.get("http://example.com/").send().await.unwrap();
    }

    assert_eq!(transport.closes(), 0);
}

#[tokio::test]
async fn test_per_call_headers_and_params_override_defaults() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| {
        b.set_header("X-Default", "defaultValue")
            .set_header("X-Shared", "client")
            .param("shared", "client")
            .param("default", "1")
    });

    client
        .get("http://example.com/api")
        .set_header("X-Shared", "call")
        .query("shared", "call")
        .send()
        .await
        .unwrap();

    let seen = transport.seen.lock().unwrap();
    let headers = &seen[0].headers;
    assert_eq!(headers["x-default"], "defaultValue");
    assert_eq!(headers.get_all("x-shared").iter().count(), 1);
    assert_eq!(headers["x-shared"], "call");

    let pairs: Vec<(String, String)> = seen[0].url.query_pairs().into_owned().collect();
    assert!(pairs.contains(&("default".into(), "1".into())));
    assert!(pairs.contains(&("shared".into(), "call".into())));
    assert!(!pairs.contains(&("shared".into(), "client".into())));
}

#[tokio::test]
async fn test_relative_url_merges_base_and_params() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| {
        b.base_url("http://example.com").param("default", "1")
    });

    let mut overrides = RequestConfig::for_url(Method::GET, "api");
    overrides.params.insert("q".into(), "test".into());
    client.request_with(overrides).await.unwrap();

    let url = transport.last_url();
    assert!(url.path().contains("api"));
    let query = url.query().unwrap();
    assert!(query.contains("default=1"));
    assert!(query.contains("q=test"));
}

#[tokio::test(start_paused = true)]
async fn test_body_is_replayed_on_every_attempt() {
    let transport = FakeTransport::new(|attempt| {
        if attempt < 2 {
            Err(TransportError::other("connection reset"))
        } else {
            Ok(status(201))
        }
    });
    let client = client_with(transport.clone(), |b| b.retry_max(3));

    let response = client
        .post("http://example.com/upload")
        .body(RequestBody::reader(Cursor::new(b"streamed payload".to_vec())))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    for attempt in seen.iter() {
        assert_eq!(attempt.body, b"streamed payload");
    }
}

#[tokio::test]
async fn test_producer_body_failure_fails_before_any_attempt() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b);

    let err = client
        .post("http://example.com/")
        .body(RequestBody::from_fn(|| {
            Err::<Cursor<Vec<u8>>, _>(std::io::Error::other("cannot open"))
        }))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClientError::Body(_)));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_invalid_json_fails_before_any_attempt() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b);

    let mut map = std::collections::HashMap::new();
    map.insert(vec![1u8], "non-string keys cannot be JSON object keys");

    let err = client
        .post("http://example.com/")
        .json(&map)
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, HttpClientError::Json(_)));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_forced_retry_on_response_reports_status() {
    let transport = FakeTransport::new(|_| Ok(status(503)));
    let responses = Arc::new(AtomicU32::new(0));
    let errors = Arc::new(AtomicU32::new(0));

    let client = client_with(transport.clone(), |b| {
        b.retry_max(2).retry_policy(policy_fn(|_, err| match err {
            None => RetryDecision::Retry,
            Some(_) => RetryDecision::Stop,
        }))
    });
    let counter = responses.clone();
    client.on_response(move |response| {
        assert_eq!(response.status(), 503);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = errors.clone();
    client.on_error(move |response, err, attempts| {
        counter.fetch_add(1, Ordering::SeqCst);
        assert_eq!(attempts, 3);
        assert_eq!(response.map(|r| r.status().as_u16()), Some(503));
        Err(err)
    });

    let err = client.get("http://example.com/busy").send().await.unwrap_err();

    assert_eq!(transport.calls(), 3);
    assert_eq!(responses.load(Ordering::SeqCst), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(err.status_code(), Some(503));
    assert!(err.to_string().contains("giving up after 3 attempts: response status 503"));
}

#[tokio::test(start_paused = true)]
async fn test_on_error_hook_can_substitute_a_response() {
    let transport = FakeTransport::failing(TransportErrorKind::Other, "down");
    let client = client_with(transport.clone(), |b| b.retry_max(1));
    client.on_error(|_, _, _| Ok(Response::from(http::Response::new("cached"))));

    let response = client.get("http://example.com/").send().await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(response.text().await.unwrap(), "cached");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_backoff_wait() {
    let transport = FakeTransport::failing(TransportErrorKind::Other, "connection refused");
    let client = client_with(transport.clone(), |b| {
        b.retry_max(5)
            .retry_wait(Duration::from_secs(10), Duration::from_secs(10))
    });

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let err = client
        .get("http://example.com/")
        .cancellation(token)
        .send()
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(transport.calls(), 1);
}

/// A 503 whose body sends one byte and then never finishes.
fn stalled_body() -> reqwest::Response {
    let stream = futures::stream::once(async {
        Ok::<_, std::io::Error>(bytes::Bytes::from_static(b"x"))
    })
    .chain(futures::stream::pending());
    http::Response::builder()
        .status(503)
        .body(reqwest::Body::wrap_stream(stream))
        .unwrap()
        .into()
}

fn retry_on_response(b: HttpClientConfigBuilder) -> HttpClientConfigBuilder {
    b.retry_max(2).retry_policy(policy_fn(|_, err| match err {
        None => RetryDecision::Retry,
        Some(_) => RetryDecision::Stop,
    }))
}

#[tokio::test(start_paused = true)]
async fn test_timeout_bounds_stalled_body_drain() {
    let transport = FakeTransport::new(|_| Ok(stalled_body()));
    let client = client_with(transport.clone(), |b| {
        retry_on_response(b).timeout(Duration::from_secs(1))
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        client.get("http://example.com/stall").send(),
    )
    .await;

    let err = outcome.expect("call must end at its deadline").unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_stalled_body_drain() {
    let transport = FakeTransport::new(|_| Ok(stalled_body()));
    let client = client_with(transport.clone(), |b| {
        retry_on_response(b).timeout(Duration::ZERO)
    });

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(3600),
        client.get("http://example.com/stall").cancellation(token).send(),
    )
    .await;

    let err = outcome.expect("call must end on cancellation").unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_maximum_timeout_means_no_deadline() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b.timeout(Duration::MAX));

    let response = client.get("http://example.com/").send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(transport.calls(), 1);
}

struct SlowTransport;

#[async_trait]
impl Transport for SlowTransport {
    async fn execute(&self, _request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(status(200))
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_bounds_the_call() {
    let client = HttpClient::new(
        HttpClientConfig::builder()
            .transport(Arc::new(SlowTransport))
            .fallback_transport(Arc::new(SlowTransport))
            .timeout(Duration::from_secs(1))
            .build(),
    )
    .unwrap();

    let err = client.get("http://example.com/").send().await.unwrap_err();

    assert!(err.is_timeout());
    assert!(!err.is_giving_up());
}

#[tokio::test]
async fn test_verb_shortcuts_use_their_methods() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b.base_url("http://example.com"));

    client.get("/r").send().await.unwrap();
    client.head("/r").send().await.unwrap();
    client.post("/r").body("p").send().await.unwrap();
    client.put("/r").body("p").send().await.unwrap();
    client.patch("/r").body("p").send().await.unwrap();
    client.delete("/r").send().await.unwrap();
    client.options("/r").send().await.unwrap();

    let methods: Vec<Method> = transport
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.method.clone())
        .collect();
    assert_eq!(
        methods,
        vec![
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]
    );
}

#[tokio::test]
async fn test_execute_prepared_request() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b);

    let request = Request::new(Method::PUT, Url::parse("http://example.com/item").unwrap())
        .with_body("data");
    let response = client.execute(request.clone()).await.unwrap();

    assert!(response.is_success());
    assert_eq!(transport.seen.lock().unwrap()[0].body, b"data");
    assert_eq!(request.body().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_share_one_client() {
    let transport = FakeTransport::ok();
    let client = client_with(transport.clone(), |b| b.close_idle_connections(true));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..101 {
                client.get("http://example.com/").send().await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(transport.calls(), 808);
    assert_eq!(transport.closes(), 8);
}
