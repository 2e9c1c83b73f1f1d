//! Periodic reclamation of idle connections.

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use crate::Transport;

/// Attempts between two forced idle-connection closures.
pub const IDLE_CONNECTION_THRESHOLD: u32 = 100;

/// Counts completed attempts and periodically closes the primary transport's
/// idle connections, so clients hitting many distinct hosts do not accumulate
/// one idle connection per host forever.
///
/// The counter runs from 0 to the threshold; the attempt that finds it at the
/// threshold resets it to 0 and triggers the close. It never blocks requests.
#[derive(Debug)]
pub struct IdleConnectionReaper {
    enabled: bool,
    threshold: u32,
    counter: AtomicU32,
}

impl IdleConnectionReaper {
    /// A reaper with the default threshold.
    pub fn new(enabled: bool) -> Self {
        Self::with_threshold(enabled, IDLE_CONNECTION_THRESHOLD)
    }

    /// A reaper with a custom threshold.
    pub fn with_threshold(enabled: bool, threshold: u32) -> Self {
        Self {
            enabled,
            threshold,
            counter: AtomicU32::new(0),
        }
    }

    /// Whether reaping is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current counter value.
    pub fn count(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Record one completed attempt. Returns `true` when it closed idle connections.
    pub fn on_attempt_completed(&self, transport: &dyn Transport) -> bool {
        if !self.enabled {
            return false;
        }

        let threshold = self.threshold;
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(if count < threshold { count + 1 } else { 0 })
            })
            .unwrap_or(0);

        if previous >= threshold {
            debug!(threshold, "Closing idle connections on primary transport");
            transport.close_idle_connections();
            true
        } else {
            false
        }
    }
}
