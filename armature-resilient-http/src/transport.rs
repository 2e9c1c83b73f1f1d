//! Transports and HTTP/2 fallback selection.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Hooks, HttpClientConfig, Request, Result, TransportError};

/// Something that can send one HTTP request.
///
/// Implementations must be safe to share between concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` once.
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, TransportError>;

    /// Drop pooled connections that are not serving a request.
    ///
    /// Must be idempotent and safe to call concurrently.
    fn close_idle_connections(&self) {}
}

/// Protocol negotiation mode of a [`ReqwestTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// HTTP/1.1, upgraded to HTTP/2 through ALPN on TLS.
    #[default]
    Auto,
    /// HTTP/1.1 only.
    Http1,
    /// HTTP/2 without negotiation.
    Http2PriorKnowledge,
}

/// Settings used to build (and rebuild) a reqwest client.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Per-request timeout enforced by reqwest.
    pub timeout: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept.
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host; 0 disables keep-alive pooling.
    pub pool_max_idle_per_host: usize,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Enable brotli decompression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Redirect limit.
    pub max_redirects: usize,
    /// Protocol mode.
    pub protocol: Protocol,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::pooled()
    }
}

impl TransportSettings {
    /// Settings for a long-lived transport reused against the same hosts.
    pub fn pooled() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            timeout: None,
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: parallelism + 1,
            user_agent: format!("armature-resilient-http/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
            protocol: Protocol::Auto,
        }
    }

    /// Settings for a transient transport that keeps no idle connections.
    pub fn non_pooled() -> Self {
        Self {
            pool_max_idle_per_host: 0,
            ..Self::pooled()
        }
    }

    /// Derive transport settings from the client configuration.
    pub fn from_config(config: &HttpClientConfig, pooled: bool, protocol: Protocol) -> Self {
        let base = if pooled {
            Self::pooled()
        } else {
            Self::non_pooled()
        };

        // The client bounds each attempt itself, so per-request timeouts may
        // exceed the configured one.
        Self {
            timeout: None,
            connect_timeout: config.connect_timeout,
            pool_idle_timeout: config.pool_idle_timeout,
            user_agent: config.user_agent.clone(),
            gzip: config.gzip,
            brotli: config.brotli,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            protocol,
            ..base
        }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(&self.user_agent)
            .gzip(self.gzip)
            .brotli(self.brotli);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if self.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(self.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }
        builder = match self.protocol {
            Protocol::Auto => builder,
            Protocol::Http1 => builder.http1_only(),
            Protocol::Http2PriorKnowledge => builder.http2_prior_knowledge(),
        };

        Ok(builder.build()?)
    }
}

/// [`Transport`] backed by a reqwest client.
///
/// reqwest has no direct way to evict idle connections, so
/// [`close_idle_connections`](Transport::close_idle_connections) swaps in a
/// freshly built client; the old pool is dropped once in-flight requests finish.
pub struct ReqwestTransport {
    client: RwLock<reqwest::Client>,
    settings: Option<TransportSettings>,
}

impl ReqwestTransport {
    /// Build a transport from settings.
    pub fn new(settings: TransportSettings) -> Result<Self> {
        let client = settings.build_client()?;
        Ok(Self {
            client: RwLock::new(client),
            settings: Some(settings),
        })
    }

    /// Wrap a caller-built client. Idle connections cannot be reclaimed.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self {
            client: RwLock::new(client),
            settings: None,
        }
    }

    /// The settings this transport was built from, if any.
    pub fn settings(&self) -> Option<&TransportSettings> {
        self.settings.as_ref()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        let client = self.client.read().clone();
        client.execute(request).await.map_err(TransportError::from)
    }

    fn close_idle_connections(&self) {
        let Some(settings) = &self.settings else {
            return;
        };
        match settings.build_client() {
            Ok(client) => *self.client.write() = client,
            Err(e) => warn!(error = %e, "Failed to rebuild HTTP client while closing idle connections"),
        }
    }
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Messages produced when an HTTP/1.x parser receives an HTTP/2 reply.
const VERSION_MISMATCH_SIGNATURES: &[&str] = &[
    "HTTP/1.x transport connection broken: malformed HTTP version \"HTTP/2\"",
    "invalid HTTP version parsed",
];

/// Whether `err` means the server answered in a protocol the primary transport
/// cannot parse, so the request should be re-sent over HTTP/2.
///
/// This matches on error text; keep it the only place that does.
pub fn is_transport_version_mismatch(err: &TransportError) -> bool {
    VERSION_MISMATCH_SIGNATURES
        .iter()
        .any(|signature| err.chain_contains(signature))
}

/// Primary transport plus the HTTP/2 transport used on a version mismatch.
#[derive(Clone)]
pub struct TransportSelector {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl TransportSelector {
    /// Pair a primary transport with its fallback.
    pub fn new(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { primary, fallback }
    }

    /// The primary transport.
    pub fn primary(&self) -> &Arc<dyn Transport> {
        &self.primary
    }

    /// The fallback transport.
    pub fn fallback(&self) -> &Arc<dyn Transport> {
        &self.fallback
    }

    /// Send `request` on the primary transport, re-sending it on the fallback
    /// within the same attempt when the primary reports a version mismatch.
    pub async fn send(
        &self,
        request: &Request,
        hooks: &Hooks,
    ) -> std::result::Result<reqwest::Response, TransportError> {
        hooks.before_request(request);
        match self.primary.execute(request.to_reqwest()).await {
            Err(err) if is_transport_version_mismatch(&err) => {
                debug!(
                    method = %request.method(),
                    url = %request.url(),
                    error = %err,
                    "Primary transport hit a protocol version mismatch, falling back to HTTP/2"
                );
                hooks.before_request(request);
                self.fallback.execute(request.to_reqwest()).await
            }
            other => other,
        }
    }
}

impl fmt::Debug for TransportSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSelector").finish_non_exhaustive()
    }
}
