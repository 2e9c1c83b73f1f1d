//! HTTP client implementation.

use http::Method;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::request::CallSettings;
use crate::{
    run_with_retry, CallContext, Hooks, HttpClientConfig, HttpClientError, IdleConnectionReaper,
    Protocol, ReqwestTransport, Request, RequestBuilder, RequestConfig, Response, Result,
    RetryOutcome, Transport, TransportError, TransportSelector, TransportSettings,
};

/// HTTP client with retry, HTTP/2 fallback and idle-connection reaping.
///
/// Cloning is cheap; clones share transports, hooks and the reaper counter.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<HttpClientConfig>,
    transports: TransportSelector,
    reaper: Arc<IdleConnectionReaper>,
    hooks: Arc<RwLock<Hooks>>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let primary: Arc<dyn Transport> = match &config.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(TransportSettings::from_config(
                &config,
                !config.close_idle_connections,
                Protocol::Auto,
            ))?),
        };
        let fallback: Arc<dyn Transport> = match &config.fallback_transport {
            Some(transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(TransportSettings::from_config(
                &config,
                false,
                Protocol::Http2PriorKnowledge,
            ))?),
        };

        Ok(Self {
            transports: TransportSelector::new(primary, fallback),
            reaper: Arc::new(IdleConnectionReaper::new(config.close_idle_connections)),
            hooks: Arc::new(RwLock::new(config.hooks.clone())),
            config: Arc::new(config),
        })
    }

    /// Create a new HTTP client with the single-host preset.
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::single())
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Get the primary and fallback transports.
    pub fn transports(&self) -> &TransportSelector {
        &self.transports
    }

    /// Replace all hooks.
    pub fn set_hooks(&self, hooks: Hooks) {
        *self.hooks.write() = hooks;
    }

    /// Install the before-request hook.
    pub fn on_request<F>(&self, hook: F)
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write();
        *hooks = std::mem::take(&mut *hooks).on_request(hook);
    }

    /// Install the after-response hook.
    pub fn on_response<F>(&self, hook: F)
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write();
        *hooks = std::mem::take(&mut *hooks).on_response(hook);
    }

    /// Install the final-error hook.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(Option<Response>, HttpClientError, u32) -> Result<Response> + Send + Sync + 'static,
    {
        let mut hooks = self.hooks.write();
        *hooks = std::mem::take(&mut *hooks).on_error(hook);
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create an OPTIONS request builder.
    pub fn options(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::OPTIONS, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }

    /// Merge `overrides` over the client configuration and execute the result.
    ///
    /// Invalid URLs, headers and unreadable bodies fail here, before any attempt.
    pub async fn request_with(&self, overrides: RequestConfig) -> Result<Response> {
        let (request, settings) = overrides.resolve(&self.config)?;
        self.execute_with(request, settings).await
    }

    /// Execute a prepared request with the client's settings.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_with(request, CallSettings::from_config(&self.config))
            .await
    }

    async fn execute_with(&self, request: Request, settings: CallSettings) -> Result<Response> {
        let mut ctx = if settings.timeout.is_zero() {
            CallContext::background()
        } else {
            CallContext::with_timeout(settings.timeout)
        };
        if let Some(token) = settings.cancellation.clone() {
            ctx = ctx.with_cancellation(token);
        }
        let hooks = self.hooks.read().clone();
        let read_limit = settings.read_limit;

        let outcome = run_with_retry(
            &ctx,
            &settings.retry,
            settings.policy.as_ref(),
            |_attempt| self.attempt(&ctx, &request, &hooks, settings.timeout),
            |response: Response| response.drain(read_limit),
        )
        .await;

        match outcome {
            RetryOutcome::Finished {
                result: Ok(response),
                ..
            } => Ok(response),
            RetryOutcome::Finished {
                attempts,
                result: Err(err),
            } => hooks.final_error(None, err, attempts),
            RetryOutcome::Exhausted { attempts, last } => {
                let (response, status, cause) = match last {
                    Ok(response) => {
                        let status = response.status();
                        (
                            Some(response),
                            Some(status),
                            HttpClientError::RejectedResponse { status },
                        )
                    }
                    Err(err) => (None, None, err),
                };
                let err = HttpClientError::GivingUp {
                    method: request.method().clone(),
                    url: request.url().clone(),
                    attempts,
                    status,
                    source: Box::new(cause),
                };
                warn!(error = %err, "Request failed after exhausting retries");
                hooks.final_error(response, err, attempts)
            }
        }
    }

    /// One physical attempt, fallback re-send included.
    async fn attempt(
        &self,
        ctx: &CallContext,
        request: &Request,
        hooks: &Hooks,
        timeout: Duration,
    ) -> Result<Response> {
        let send = self.transports.send(request, hooks);
        let outcome = if timeout.is_zero() {
            ctx.run(send).await
        } else {
            ctx.run(async {
                tokio::time::timeout(timeout, send)
                    .await
                    .unwrap_or_else(|_| Err(TransportError::timeout(timeout)))
            })
            .await
        };

        self.reaper
            .on_attempt_completed(self.transports.primary().as_ref());

        let response = Response::from(outcome??);
        hooks.after_response(&response);
        Ok(response)
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}
