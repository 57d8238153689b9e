//! Error types for transport operations.

use std::time::Duration;

use crate::codec::CodecError;
use crate::endpoint::LifecycleState;
use crate::substrate::SubstrateError;

/// Errors surfaced by endpoints and stream adapters.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Lifecycle method called out of order or twice. A programming error:
    /// never retried, surfaced immediately to the caller.
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidState {
        /// State the endpoint was in.
        from: LifecycleState,
        /// State the operation required or tried to enter.
        to: LifecycleState,
    },

    /// A detected sequence gap could not be closed via the direct resend
    /// request. Fatal for the connection.
    #[error("sequence gap at {seq} could not be recovered")]
    GapUnrecoverable {
        /// The sequence number that could not be obtained.
        seq: i64,
    },

    /// No inbound traffic at all within the liveness window. Fatal for the
    /// connection.
    #[error("no traffic from peer within {timeout:?}")]
    LivenessTimeout {
        /// The liveness window that elapsed.
        timeout: Duration,
    },

    /// Substrate operation failed.
    #[error("substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    /// Envelope or payload serialization failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
