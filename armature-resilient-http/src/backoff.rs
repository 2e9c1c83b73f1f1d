//! Backoff strategies between retry attempts.

use rand::Rng;
use std::fmt;
use std::time::Duration;

/// Computes the wait before the next attempt.
///
/// `attempt` is 0 for the wait after the first attempt. Implementations
/// should keep the result within `[min, max]`.
pub trait Backoff: Send + Sync {
    /// Delay before attempt number `attempt + 1`.
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(u32, Duration, Duration) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration {
        self(attempt, min, max)
    }
}

/// Built-in backoff strategies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Always wait `min`.
    Constant,
    /// `min * (attempt + 1)`.
    Linear,
    /// `min * 2^attempt`.
    #[default]
    Exponential,
    /// A random delay between `min` and the exponential delay.
    ExponentialJitter,
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, min: Duration, max: Duration) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Constant => bounded(min, min, max),
            Self::Linear => {
                let total = min.saturating_mul(attempt.saturating_add(1));
                bounded(total, min, max)
            }
            Self::Exponential => exponential(attempt, min, max),
            Self::ExponentialJitter => {
                let ceiling = exponential(attempt, min, max);
                if ceiling <= min {
                    return ceiling;
                }
                let span = (ceiling - min).as_nanos().min(u64::MAX as u128) as u64;
                let offset = rand::rng().random_range(0..=span);
                min + Duration::from_nanos(offset)
            }
        }
    }
}

impl Backoff for BackoffStrategy {
    fn delay(&self, attempt: u32, min: Duration, max: Duration) -> Duration {
        self.delay_for_attempt(attempt, min, max)
    }
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Constant => "constant",
            Self::Linear => "linear",
            Self::Exponential => "exponential",
            Self::ExponentialJitter => "exponential_jitter",
        };
        f.write_str(name)
    }
}

// Overflow saturates to `max`.
fn exponential(attempt: u32, min: Duration, max: Duration) -> Duration {
    let delay = 2u32
        .checked_pow(attempt)
        .and_then(|factor| min.checked_mul(factor))
        .unwrap_or(max);
    bounded(delay, min, max)
}

fn bounded(delay: Duration, min: Duration, max: Duration) -> Duration {
    delay.max(min).min(max)
}
