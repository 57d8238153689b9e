//! Time provider abstraction for timers and timeouts.
//!
//! All timer behavior in the crate goes through the [`TimeProvider`] seam,
//! so endpoints can be driven under tokio's paused test clock (or any other
//! clock source) without touching protocol code.

use async_trait::async_trait;
use std::time::Duration;

/// Provider trait for time operations.
///
/// Implementations handle sleeping, elapsed-time queries, and bounded
/// waiting appropriate for their environment.
#[async_trait(?Send)]
pub trait TimeProvider: Clone {
    /// Sleep for the specified duration.
    async fn sleep(&self, duration: Duration);

    /// Get elapsed time since provider creation.
    fn now(&self) -> Duration;

    /// Run a future with a timeout.
    ///
    /// Returns `Some(result)` if the future completes within the timeout,
    /// or `None` if it times out.
    async fn timeout<F, O>(&self, duration: Duration, future: F) -> Option<O>
    where
        F: std::future::Future<Output = O>;
}

/// Real time provider using Tokio's time facilities.
///
/// Under `tokio::time::pause()` (tests), sleeps resolve against the paused
/// clock, which auto-advances when the runtime is idle.
#[derive(Debug, Clone)]
pub struct TokioTimeProvider {
    /// Start time for calculating elapsed duration
    start_time: std::time::Instant,
}

impl TokioTimeProvider {
    /// Create a new Tokio time provider.
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
        }
    }
}

impl Default for TokioTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl TimeProvider for TokioTimeProvider {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> Duration {
        self.start_time.elapsed()
    }

    async fn timeout<F, O>(&self, duration: Duration, future: F) -> Option<O>
    where
        F: std::future::Future<Output = O>,
    {
        tokio::time::timeout(duration, future).await.ok()
    }
}
