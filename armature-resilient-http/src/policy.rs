//! Retry policies: decide, per attempt outcome, whether to try again.

use std::fmt;
use std::sync::Arc;

use crate::{CallContext, HttpClientError};

/// What the retry engine should do after an attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Wait for the backoff delay and attempt again.
    Retry,
    /// Stop and hand back the attempt's outcome unchanged.
    Stop,
    /// Stop and fail with this error instead of the attempt's outcome.
    Replace(HttpClientError),
}

impl RetryDecision {
    /// Whether this decision asks for another attempt.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry)
    }
}

/// Pluggable retry classifier.
///
/// `error` is `None` when the attempt produced a response.
pub trait RetryPolicy: Send + Sync {
    /// Decide what to do with one attempt's outcome.
    fn decide(&self, ctx: &CallContext, error: Option<&HttpClientError>) -> RetryDecision;
}

/// Retries transient failures; fails fast on cancellation and on
/// configuration errors (redirect limit, unsupported scheme, unknown CA).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, ctx: &CallContext, error: Option<&HttpClientError>) -> RetryDecision {
        if let Some(ctx_err) = ctx.error() {
            return RetryDecision::Replace(ctx_err);
        }

        match error {
            None => RetryDecision::Stop,
            Some(err) if err.transport_kind().is_some_and(|kind| kind.is_permanent()) => {
                RetryDecision::Stop
            }
            Some(HttpClientError::Cancelled | HttpClientError::DeadlineExceeded(_)) => {
                RetryDecision::Stop
            }
            Some(_) => RetryDecision::Retry,
        }
    }
}

/// Adapter turning a closure into a [`RetryPolicy`].
pub struct FnPolicy<F>(F);

impl<F> RetryPolicy for FnPolicy<F>
where
    F: Fn(&CallContext, Option<&HttpClientError>) -> RetryDecision + Send + Sync,
{
    fn decide(&self, ctx: &CallContext, error: Option<&HttpClientError>) -> RetryDecision {
        (self.0)(ctx, error)
    }
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPolicy(..)")
    }
}

/// Build a retry policy from a closure.
///
/// ```
/// use armature_resilient_http::{policy_fn, RetryDecision};
///
/// let always = policy_fn(|_, _| RetryDecision::Retry);
/// # let _ = always;
/// ```
pub fn policy_fn<F>(decide: F) -> FnPolicy<F>
where
    F: Fn(&CallContext, Option<&HttpClientError>) -> RetryDecision + Send + Sync,
{
    FnPolicy(decide)
}

/// The policy used when none is configured.
pub fn default_retry_policy() -> Arc<dyn RetryPolicy> {
    Arc::new(DefaultRetryPolicy)
}

/// Policy for clients spraying requests across many hosts.
pub fn host_spray_retry_policy() -> Arc<dyn RetryPolicy> {
    Arc::new(DefaultRetryPolicy)
}
