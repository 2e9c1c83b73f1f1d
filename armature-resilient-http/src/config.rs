//! HTTP client configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    default_retry_policy, host_spray_retry_policy, Backoff, BackoffStrategy, Header, Hooks,
    ReusableReader, RetryPolicy, Transport,
};

/// HTTP client configuration.
#[derive(Clone)]
pub struct HttpClientConfig {
    /// Primary transport override; built from the settings below when unset.
    pub transport: Option<Arc<dyn Transport>>,
    /// HTTP/2 fallback transport override.
    pub fallback_transport: Option<Arc<dyn Transport>>,
    /// Wall-clock bound for each call and each attempt.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Idle timeout for pooled connections.
    pub pool_idle_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip compression.
    pub gzip: bool,
    /// Enable brotli compression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Periodically close the primary transport's idle connections.
    pub close_idle_connections: bool,
    /// Retries after the first attempt.
    pub retry_max: u32,
    /// Lower backoff bound.
    pub retry_wait_min: Duration,
    /// Upper backoff bound.
    pub retry_wait_max: Duration,
    /// Retry classifier.
    pub retry_policy: Arc<dyn RetryPolicy>,
    /// Backoff between attempts.
    pub retry_backoff: Arc<dyn Backoff>,
    /// Bytes read from a discarded response body before closing it.
    pub response_read_limit: u64,
    /// Base URL for relative request URLs.
    pub base_url: Option<String>,
    /// Default headers, applied before per-request headers.
    pub headers: Vec<Header>,
    /// Default query parameters.
    pub params: BTreeMap<String, String>,
    /// Default request body.
    pub body: Option<ReusableReader>,
    /// Lifecycle hooks.
    pub hooks: Hooks,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            transport: None,
            fallback_transport: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("armature-resilient-http/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
            close_idle_connections: false,
            retry_max: 3,
            retry_wait_min: Duration::from_secs(1),
            retry_wait_max: Duration::from_secs(30),
            retry_policy: default_retry_policy(),
            retry_backoff: Arc::new(BackoffStrategy::Exponential),
            response_read_limit: 4096,
            base_url: None,
            headers: Vec::new(),
            params: BTreeMap::new(),
            body: None,
            hooks: Hooks::default(),
        }
    }
}

impl HttpClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    /// Preset for a long-lived client talking to a few hosts.
    pub fn single() -> Self {
        Self::default()
    }

    /// Preset for clients spraying requests across many hosts: no keep-alive
    /// pool on the primary transport and periodic idle-connection closing.
    pub fn spraying() -> Self {
        Self {
            close_idle_connections: true,
            retry_policy: host_spray_retry_policy(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("custom_transport", &self.transport.is_some())
            .field("custom_fallback_transport", &self.fallback_transport.is_some())
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .field("close_idle_connections", &self.close_idle_connections)
            .field("retry_max", &self.retry_max)
            .field("retry_wait_min", &self.retry_wait_min)
            .field("retry_wait_max", &self.retry_wait_max)
            .field("response_read_limit", &self.response_read_limit)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Builder for HTTP client configuration.
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Start from an existing configuration, e.g. a preset.
    pub fn from_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Use a custom primary transport.
    ///
    /// Idle-connection closing is not derived from the transport. A
    /// transport without a keep-alive pool that should still be reaped needs
    /// [`close_idle_connections`](Self::close_idle_connections) set explicitly.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    /// Use a custom reqwest client as the primary transport.
    ///
    /// Like [`transport`](Self::transport), this leaves `close_idle_connections`
    /// untouched.
    pub fn reqwest_client(self, client: reqwest::Client) -> Self {
        self.transport(Arc::new(crate::ReqwestTransport::from_client(client)))
    }

    /// Use a custom HTTP/2 fallback transport.
    pub fn fallback_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.fallback_transport = Some(transport);
        self
    }

    /// Set the call and attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip compression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli compression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Enable or disable periodic idle-connection closing.
    pub fn close_idle_connections(mut self, enable: bool) -> Self {
        self.config.close_idle_connections = enable;
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn retry_max(mut self, retries: u32) -> Self {
        self.config.retry_max = retries;
        self
    }

    /// Set the backoff bounds.
    pub fn retry_wait(mut self, min: Duration, max: Duration) -> Self {
        self.config.retry_wait_min = min;
        self.config.retry_wait_max = max;
        self
    }

    /// Set the retry policy.
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.config.retry_policy = Arc::new(policy);
        self
    }

    /// Set the backoff.
    pub fn retry_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.config.retry_backoff = Arc::new(backoff);
        self
    }

    /// Set how many bytes of a discarded response are drained.
    pub fn response_read_limit(mut self, limit: u64) -> Self {
        self.config.response_read_limit = limit;
        self
    }

    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Add a default header, appended to existing values.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push(Header::append(name, value));
        self
    }

    /// Add a default header that replaces existing values.
    pub fn set_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.push(Header::replace(name, value));
        self
    }

    /// Add a default query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Set the default request body.
    pub fn body(mut self, body: impl Into<ReusableReader>) -> Self {
        self.config.body = Some(body.into());
        self
    }

    /// Set lifecycle hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.config.hooks = hooks;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}
