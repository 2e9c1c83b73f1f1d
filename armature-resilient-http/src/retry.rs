//! Bounded retry loop.
//!
//! The engine only sequences attempts. Whether an outcome is worth another
//! attempt is up to the [`RetryPolicy`], and how long to wait is up to the
//! [`Backoff`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{Backoff, BackoffStrategy, CallContext, Result, RetryDecision, RetryPolicy};

/// Retry budget and backoff bounds for one call.
#[derive(Clone)]
pub struct RetrySettings {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Lower bound of the backoff delay.
    pub wait_min: Duration,
    /// Upper bound of the backoff delay.
    pub wait_max: Duration,
    /// Delay calculation.
    pub backoff: Arc<dyn Backoff>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            wait_min: Duration::from_secs(1),
            wait_max: Duration::from_secs(30),
            backoff: Arc::new(BackoffStrategy::Exponential),
        }
    }
}

impl RetrySettings {
    /// Settings with `max_retries` retries and the given wait bounds.
    pub fn new(max_retries: u32, wait_min: Duration, wait_max: Duration) -> Self {
        Self {
            max_retries,
            wait_min,
            wait_max,
            ..Default::default()
        }
    }

    /// Use a different backoff.
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Delay to wait after attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt, self.wait_min, self.wait_max)
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl fmt::Debug for RetrySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySettings")
            .field("max_retries", &self.max_retries)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .finish_non_exhaustive()
    }
}

/// How a retry loop ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The policy stopped the loop, or the context ended while discarding or waiting.
    Finished {
        /// Attempts made.
        attempts: u32,
        /// Final outcome.
        result: Result<T>,
    },
    /// The policy still wanted to retry when the budget ran out.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Outcome of the last attempt.
        last: Result<T>,
    },
}

impl<T> RetryOutcome<T> {
    /// Number of attempts performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Finished { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Whether the retry budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Run `work` until the policy stops or the budget is spent.
///
/// `work` receives the 0-indexed attempt number. When the policy asks for a
/// retry on a successful outcome, the value is passed to `discard` before the
/// backoff wait. Both the discard and the wait are interrupted by `ctx`.
pub async fn run_with_retry<T, W, WFut, D, DFut>(
    ctx: &CallContext,
    settings: &RetrySettings,
    policy: &dyn RetryPolicy,
    mut work: W,
    mut discard: D,
) -> RetryOutcome<T>
where
    W: FnMut(u32) -> WFut,
    WFut: Future<Output = Result<T>>,
    D: FnMut(T) -> DFut,
    DFut: Future<Output = ()>,
{
    let mut attempt = 0;

    loop {
        let result = work(attempt).await;
        let attempts = attempt.saturating_add(1);

        match policy.decide(ctx, result.as_ref().err()) {
            RetryDecision::Stop => return RetryOutcome::Finished { attempts, result },
            RetryDecision::Replace(err) => {
                return RetryOutcome::Finished {
                    attempts,
                    result: Err(err),
                };
            }
            RetryDecision::Retry => {}
        }

        if attempt >= settings.max_retries {
            return RetryOutcome::Exhausted {
                attempts,
                last: result,
            };
        }

        let delay = settings.delay_for_attempt(attempt);
        match result {
            Ok(value) => {
                debug!(attempt = attempts, ?delay, "Retrying request after rejected response");
                if let Err(ctx_err) = ctx.run(discard(value)).await {
                    return RetryOutcome::Finished {
                        attempts,
                        result: Err(ctx_err),
                    };
                }
            }
            Err(e) => {
                debug!(attempt = attempts, ?delay, error = %e, "Retrying request due to error");
            }
        }

        if let Err(ctx_err) = ctx.sleep(delay).await {
            return RetryOutcome::Finished {
                attempts,
                result: Err(ctx_err),
            };
        }

        attempt += 1;
    }
}

/// [`run_with_retry`] for values that need no cleanup when discarded.
pub async fn retry<T, W, WFut>(
    ctx: &CallContext,
    settings: &RetrySettings,
    policy: &dyn RetryPolicy,
    work: W,
) -> RetryOutcome<T>
where
    W: FnMut(u32) -> WFut,
    WFut: Future<Output = Result<T>>,
{
    run_with_retry(ctx, settings, policy, work, |_value: T| async {}).await
}
