//! Per-call execution context: a deadline plus a cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{HttpClientError, Result};

/// Bounds one logical call and every attempt and backoff wait inside it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    token: CancellationToken,
}

impl CallContext {
    /// A context with no deadline that is only cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            timeout: Some(timeout),
            token: CancellationToken::new(),
        }
    }

    /// Tie the context to a caller-owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// The instant at which the context expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The token observed by this context.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The context's own error once it is cancelled or past its deadline.
    pub fn error(&self) -> Option<HttpClientError> {
        if self.token.is_cancelled() {
            return Some(HttpClientError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(HttpClientError::DeadlineExceeded(
                self.timeout.unwrap_or_default(),
            )),
            _ => None,
        }
    }

    /// Whether the context is cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Resolves once the context is cancelled or expired.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Sleep for `delay`, returning early with the context's error if it ends first.
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(tokio::time::sleep(delay)).await
    }

    /// Drive `future` to completion unless the context ends first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        if let Some(err) = self.error() {
            return Err(err);
        }
        tokio::select! {
            biased;
            _ = self.done() => Err(self.error().unwrap_or(HttpClientError::Cancelled)),
            output = future => Ok(output),
        }
    }
}
