//! # Streamrail
//!
//! Reliable ordered event streaming over a fire-and-forget pub/sub substrate.
//!
//! The substrate is assumed to provide only topic publish/subscribe with
//! at-most-once, unordered delivery, plus point-to-point request/response
//! with a timeout. On top of that, streamrail reconstructs TCP-like stream
//! semantics between a producer and a consumer:
//!
//! - **Ordering**: payloads are delivered to the application in strictly
//!   increasing, contiguous sequence order, with no duplicates.
//! - **Gap recovery**: a missing sequence number is fetched from the peer's
//!   retained send history via a direct request; an unanswerable gap
//!   terminates the connection.
//! - **Liveness**: periodic keepalives carry the sender's sequence number,
//!   so silence (or a gap) is detected even without payload traffic.
//!
//! This crate provides:
//! - **TransportEndpoint**: the reliability engine, one per connection
//!   direction, owning a private mailbox, sequence counters, a reorder
//!   buffer, and timers
//! - **Stream adapters**: producer/consumer bindings turning an application
//!   event source into a remotely consumable, cancellable sequence
//! - **Substrate trait**: the injected pub/sub capability, with an
//!   in-process [`MemorySubstrate`] implementation
//!
//! Everything is single-threaded and cooperative: endpoint state lives in
//! `Rc`/`Cell`/`RefCell`, background work runs on local tasks, and the only
//! suspension points are substrate calls and timer sleeps. Run it on a
//! current-thread runtime inside a `LocalSet`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Pluggable message serialization.
pub mod codec;

/// Endpoint timing configuration.
pub mod config;

/// Transport endpoint reliability engine.
pub mod endpoint;

/// Wire envelopes and gap-recovery request types.
pub mod envelope;

/// Error types for transport operations.
pub mod error;

/// Mailbox addressing.
pub mod mailbox;

/// Producer/consumer stream adapters.
pub mod stream;

/// Pub/sub substrate abstraction and in-process implementation.
pub mod substrate;

/// Task spawning abstraction for single-threaded runtimes.
pub mod task;

/// Time provider abstraction for timers and timeouts.
pub mod time;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Codec exports
pub use codec::{CodecError, JsonCodec, MessageCodec};

// Configuration exports
pub use config::EndpointConfig;

// Endpoint exports
pub use endpoint::{CloseReason, EndpointEvent, LifecycleState, TransportEndpoint};

// Envelope exports
pub use envelope::{Envelope, ResendReply, ResendRequest};

// Error exports
pub use error::TransportError;

// Mailbox exports
pub use mailbox::MailboxAddress;

// Stream adapter exports
pub use stream::{ChannelSource, EventSource, SourceError, StreamConsumer, serve_stream};

// Substrate exports
pub use substrate::{InboundRequest, MemorySubstrate, Substrate, SubstrateError, Subscription};

// Provider exports
pub use task::{TaskProvider, TokioTaskProvider};
pub use time::{TimeProvider, TokioTimeProvider};
