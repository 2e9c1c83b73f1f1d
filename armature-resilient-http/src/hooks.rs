//! Lifecycle hooks fired around request execution.

use std::fmt;
use std::sync::Arc;

use crate::{HttpClientError, Request, Response, Result};

/// Called before every physical attempt, fallback re-sends included.
pub type OnRequestFn = Arc<dyn Fn(&Request) + Send + Sync>;

/// Called for every attempt that produced a response, even one that will be retried.
pub type OnResponseFn = Arc<dyn Fn(&Response) + Send + Sync>;

/// Called once when a call fails for good. Receives the last response (if
/// any), the final error and the attempt count, and decides what the caller gets.
pub type OnErrorFn =
    Arc<dyn Fn(Option<Response>, HttpClientError, u32) -> Result<Response> + Send + Sync>;

/// Set of optional lifecycle hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    on_request: Option<OnRequestFn>,
    on_response: Option<OnResponseFn>,
    on_error: Option<OnErrorFn>,
}

impl Hooks {
    /// Empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks that log each attempt and response with `tracing`.
    pub fn logging(log_headers: bool) -> Self {
        Self::new()
            .on_request(move |request| {
                tracing::debug!(
                    method = %request.method(),
                    url = %request.url(),
                    body_len = request.body().len(),
                    "Sending HTTP request"
                );
                if log_headers {
                    for (name, value) in request.headers() {
                        tracing::trace!(header = %name, value = ?value, "Request header");
                    }
                }
            })
            .on_response(move |response| {
                tracing::debug!(status = %response.status(), url = %response.url(), "Received HTTP response");
                if log_headers {
                    for (name, value) in response.headers() {
                        tracing::trace!(header = %name, value = ?value, "Response header");
                    }
                }
            })
    }

    /// Set the before-request hook.
    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(hook));
        self
    }

    /// Set the after-response hook.
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Response) + Send + Sync + 'static,
    {
        self.on_response = Some(Arc::new(hook));
        self
    }

    /// Set the final-error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<Response>, HttpClientError, u32) -> Result<Response> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Whether a final-error hook is installed.
    pub fn has_on_error(&self) -> bool {
        self.on_error.is_some()
    }

    pub(crate) fn before_request(&self, request: &Request) {
        if let Some(hook) = &self.on_request {
            hook(request);
        }
    }

    pub(crate) fn after_response(&self, response: &Response) {
        if let Some(hook) = &self.on_response {
            hook(response);
        }
    }

    /// Route a final failure through the error hook, or fail with `err`.
    pub(crate) fn final_error(
        &self,
        response: Option<Response>,
        err: HttpClientError,
        attempts: u32,
    ) -> Result<Response> {
        match &self.on_error {
            Some(hook) => hook(response, err, attempts),
            None => {
                // Dropping the response closes its body.
                drop(response);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_request", &self.on_request.is_some())
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
