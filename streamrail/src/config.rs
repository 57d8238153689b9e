//! Endpoint timing configuration.

use std::time::Duration;

/// Configuration for a transport endpoint's timers and history retention.
///
/// The defaults match the protocol's standard timings: a 1 s keepalive
/// period, a 5 s liveness window, and a single 1 s gap-recovery cycle.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Period between keepalive envelopes while connected.
    pub keep_alive: Duration,

    /// Maximum silence interval after which the peer is presumed dead.
    pub liveness_timeout: Duration,

    /// Delay between detecting a sequence gap and issuing the direct
    /// resend request for the missing item.
    pub gap_retry: Duration,

    /// Timeout for the resend request/response call itself.
    pub resend_timeout: Duration,

    /// Number of recently sent payloads retained to answer peers'
    /// resend requests. Older entries are evicted; a request for an
    /// evicted sequence number is refused.
    pub resend_history: usize,
}

impl EndpointConfig {
    /// Create a configuration with explicit values.
    pub fn new(
        keep_alive: Duration,
        liveness_timeout: Duration,
        gap_retry: Duration,
        resend_timeout: Duration,
        resend_history: usize,
    ) -> Self {
        Self {
            keep_alive,
            liveness_timeout,
            gap_retry,
            resend_timeout,
            resend_history,
        }
    }

    /// Set the keepalive send period.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the resend history depth.
    pub fn with_resend_history(mut self, depth: usize) -> Self {
        self.resend_history = depth;
        self
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_millis(1000),
            liveness_timeout: Duration::from_millis(5000),
            gap_retry: Duration::from_millis(1000),
            resend_timeout: Duration::from_millis(1000),
            resend_history: 128,
        }
    }
}
