//! Requests, per-call configuration and the request builder.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    Backoff, HttpClient, HttpClientConfig, HttpClientError, RequestBody, Response, Result,
    RetryPolicy, RetrySettings, ReusableReader,
};

/// How a header entry combines with earlier values of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Add a value, keeping existing ones.
    #[default]
    Append,
    /// Drop existing values first.
    Replace,
}

/// One header entry, applied in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
    /// Combination mode.
    pub mode: HeaderMode,
}

impl Header {
    /// An appended header.
    pub fn append(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mode: HeaderMode::Append,
        }
    }

    /// A replacing header.
    pub fn replace(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mode: HeaderMode::Replace,
        }
    }

    fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        let name = HeaderName::try_from(self.name.as_str())
            .map_err(|e| HttpClientError::InvalidHeader(format!("{}: {}", self.name, e)))?;
        let value = HeaderValue::try_from(self.value.as_str())
            .map_err(|e| HttpClientError::InvalidHeader(format!("{}: {}", self.name, e)))?;

        match self.mode {
            HeaderMode::Append => {
                headers.append(name, value);
            }
            HeaderMode::Replace => {
                headers.insert(name, value);
            }
        }
        Ok(())
    }
}

/// Per-call overrides, merged over the client configuration.
///
/// Unset fields fall back to the client's values. Headers whose name also
/// appears in the client defaults replace those defaults; query parameters are
/// merged with per-call values winning.
#[derive(Default)]
pub struct RequestConfig {
    /// Method, `GET` when unset.
    pub method: Option<Method>,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Absolute URL, or a path relative to the base URL.
    pub url: Option<String>,
    /// Headers, applied after the client defaults.
    pub headers: Vec<Header>,
    /// Query parameters.
    pub params: BTreeMap<String, String>,
    /// Body override.
    pub body: Option<RequestBody>,
    /// Call timeout override.
    pub timeout: Option<Duration>,
    /// Drain limit override.
    pub response_read_limit: Option<u64>,
    /// Retry policy override.
    pub retry_policy: Option<Arc<dyn RetryPolicy>>,
    /// Retry count override.
    pub retry_max: Option<u32>,
    /// Lower backoff bound override.
    pub retry_wait_min: Option<Duration>,
    /// Upper backoff bound override.
    pub retry_wait_max: Option<Duration>,
    /// Backoff override.
    pub retry_backoff: Option<Arc<dyn Backoff>>,
    /// Token that aborts the call when cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl RequestConfig {
    /// Empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides for `method` on `url`.
    pub fn for_url(method: Method, url: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Merge these overrides over `config`, producing the request to send and
    /// the settings governing its execution.
    pub(crate) fn resolve(self, config: &HttpClientConfig) -> Result<(Request, CallSettings)> {
        let method = self.method.unwrap_or(Method::GET);

        let base_url = self.base_url.as_deref().or(config.base_url.as_deref());
        let mut params = config.params.clone();
        params.extend(self.params);
        let url = resolve_url(base_url, self.url.as_deref().unwrap_or_default(), &params)?;

        let mut headers = HeaderMap::new();
        for header in config
            .headers
            .iter()
            .filter(|d| !self.headers.iter().any(|h| h.name.eq_ignore_ascii_case(&d.name)))
            .chain(&self.headers)
        {
            header.apply(&mut headers)?;
        }

        let body = match self.body {
            Some(body) => body.into_reusable().map_err(HttpClientError::Body)?,
            None => config.body.clone().unwrap_or_default(),
        };

        let settings = CallSettings {
            timeout: self.timeout.unwrap_or(config.timeout),
            read_limit: self.response_read_limit.unwrap_or(config.response_read_limit),
            retry: RetrySettings {
                max_retries: self.retry_max.unwrap_or(config.retry_max),
                wait_min: self.retry_wait_min.unwrap_or(config.retry_wait_min),
                wait_max: self.retry_wait_max.unwrap_or(config.retry_wait_max),
                backoff: self
                    .retry_backoff
                    .unwrap_or_else(|| config.retry_backoff.clone()),
            },
            policy: self
                .retry_policy
                .unwrap_or_else(|| config.retry_policy.clone()),
            cancellation: self.cancellation,
        };

        Ok((
            Request {
                method,
                url,
                headers,
                body,
            },
            settings,
        ))
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retry_max", &self.retry_max)
            .finish_non_exhaustive()
    }
}

/// Join `path` onto `base` unless it is already absolute, then merge `params`
/// into the query, overriding pairs the URL already carries.
fn resolve_url(base: Option<&str>, path: &str, params: &BTreeMap<String, String>) -> Result<Url> {
    let raw = match base {
        Some(base) if !path.contains("://") && !base.is_empty() => {
            if path.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
            }
        }
        _ => path.to_string(),
    };

    let mut url =
        Url::parse(&raw).map_err(|e| HttpClientError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !params.is_empty() {
        // Keys stay unique: the URL's own pairs first, then the merged params.
        let mut merged: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        url.query_pairs_mut().clear().extend_pairs(&merged);
    }

    Ok(url)
}

/// Execution settings of one call, after merging.
#[derive(Clone)]
pub(crate) struct CallSettings {
    pub(crate) timeout: Duration,
    pub(crate) read_limit: u64,
    pub(crate) retry: RetrySettings,
    pub(crate) policy: Arc<dyn RetryPolicy>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl std::fmt::Debug for CallSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSettings")
            .field("timeout", &self.timeout)
            .field("read_limit", &self.read_limit)
            .finish_non_exhaustive()
    }
}

impl CallSettings {
    pub(crate) fn from_config(config: &HttpClientConfig) -> Self {
        Self {
            timeout: config.timeout,
            read_limit: config.response_read_limit,
            retry: RetrySettings {
                max_retries: config.retry_max,
                wait_min: config.retry_wait_min,
                wait_max: config.retry_wait_max,
                backoff: config.retry_backoff.clone(),
            },
            policy: config.retry_policy.clone(),
            cancellation: None,
        }
    }
}

/// A fully resolved request whose body can be replayed on every attempt.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: ReusableReader,
}

impl Request {
    /// A request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: ReusableReader::empty(),
        }
    }

    /// Replace the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<ReusableReader>) -> Self {
        self.body = body.into();
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Resolved URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body.
    pub fn body(&self) -> &ReusableReader {
        &self.body
    }

    /// Build the transport-level request for one attempt.
    pub fn to_reqwest(&self) -> reqwest::Request {
        let mut request = reqwest::Request::new(self.method.clone(), self.url.clone());
        *request.headers_mut() = self.headers.clone();
        if !self.body.is_empty() {
            *request.body_mut() = Some(self.body.bytes().into());
        }
        request
    }

    /// Render the request as it would go on the wire over HTTP/1.1.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        let target = match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        };
        let _ = write!(out, "{} {} HTTP/1.1\r\n", self.method, target);

        if let Some(host) = self.url.host_str() {
            match self.url.port() {
                Some(port) => {
                    let _ = write!(out, "Host: {}:{}\r\n", host, port);
                }
                None => {
                    let _ = write!(out, "Host: {}\r\n", host);
                }
            }
        }
        for (name, value) in &self.headers {
            let _ = write!(out, "{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
        }
        if !self.body.is_empty() {
            let _ = write!(out, "Content-Length: {}\r\n", self.body.len());
        }
        out.push_str("\r\n");
        if !self.body.is_empty() {
            out.push_str(&String::from_utf8_lossy(&self.body.bytes()));
        }

        out
    }
}

/// HTTP request builder.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    config: RequestConfig,
    error: Option<HttpClientError>,
}

impl<'a> RequestBuilder<'a> {
    /// Create a new request builder.
    pub(crate) fn new(client: &'a HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            config: RequestConfig::for_url(method, url),
            error: None,
        }
    }

    fn fail(mut self, err: HttpClientError) -> Self {
        self.error.get_or_insert(err);
        self
    }

    /// Append a header value.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push(Header::append(name, value));
        self
    }

    /// Set a header, replacing earlier values.
    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push(Header::replace(name, value));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.config.params.insert(k.into(), v.into());
        }
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.config.body = Some(body.into());
        self
    }

    /// Set the request body as text.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.set_header(http::header::CONTENT_TYPE.as_str(), "text/plain; charset=utf-8")
            .body(text.into())
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => self
                .set_header(http::header::CONTENT_TYPE.as_str(), "application/json")
                .body(bytes),
            Err(e) => self.fail(HttpClientError::Json(e.to_string())),
        }
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize + ?Sized>(self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => self
                .set_header(
                    http::header::CONTENT_TYPE.as_str(),
                    "application/x-www-form-urlencoded",
                )
                .body(encoded),
            Err(e) => self.fail(HttpClientError::Json(e.to_string())),
        }
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl fmt::Display) -> Self {
        self.set_header("Authorization", format!("Bearer {}", token))
    }

    /// Set basic authentication.
    pub fn basic_auth(self, username: impl fmt::Display, password: Option<impl fmt::Display>) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username, p),
            None => format!("{}:", username),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.set_header("Authorization", format!("Basic {}", encoded))
    }

    /// Set a custom timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Override the number of retries after the first attempt.
    pub fn retry_max(mut self, retries: u32) -> Self {
        self.config.retry_max = Some(retries);
        self
    }

    /// Override the backoff bounds.
    pub fn retry_wait(mut self, min: Duration, max: Duration) -> Self {
        self.config.retry_wait_min = Some(min);
        self.config.retry_wait_max = Some(max);
        self
    }

    /// Override the retry policy.
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.config.retry_policy = Some(Arc::new(policy));
        self
    }

    /// Override the backoff.
    pub fn retry_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.config.retry_backoff = Some(Arc::new(backoff));
        self
    }

    /// Abort the call when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    /// Resolve the request against the client configuration without sending it.
    pub fn build(self) -> Result<Request> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.config
            .resolve(self.client.config())
            .map(|(request, _)| request)
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.client.request_with(self.config).await
    }
}

impl fmt::Debug for RequestBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("config", &self.config)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
