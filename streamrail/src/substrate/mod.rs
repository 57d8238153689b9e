//! Pub/sub substrate abstraction.
//!
//! The substrate is the injected messaging capability the transport runs
//! on. It provides exactly three primitives, none of which guarantee
//! ordering or delivery:
//!
//! - `publish`: fire-and-forget topic publish
//! - `subscribe`/`unsubscribe`: claim a mailbox topic and receive whatever
//!   arrives on it
//! - `request`: point-to-point call with timeout, answered by the live
//!   subscriber of the target mailbox (used only for gap recovery)
//!
//! Endpoints are generic over [`Substrate`] so they can run over any
//! messaging fabric; [`MemorySubstrate`] is the in-process implementation.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::mailbox::MailboxAddress;

mod memory;

pub use memory::MemorySubstrate;

/// Errors from substrate operations.
#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    /// Another subscriber already owns the address.
    #[error("address already subscribed: {0}")]
    AddressInUse(MailboxAddress),

    /// No subscriber owns the address (request target is gone).
    #[error("no subscriber at address: {0}")]
    UnknownAddress(MailboxAddress),

    /// The request was not answered within the timeout.
    #[error("request timed out")]
    RequestTimeout,

    /// The responder dropped the request without answering.
    #[error("request refused by responder")]
    RequestRefused,

    /// The substrate has been shut down.
    #[error("substrate closed")]
    Closed,
}

/// A point-to-point request delivered to a mailbox's subscriber.
///
/// Carries a reply promise: call [`InboundRequest::respond`] to answer, or
/// drop the request to refuse it (the requester observes
/// [`SubstrateError::RequestRefused`]).
#[derive(Debug)]
pub struct InboundRequest {
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

impl InboundRequest {
    /// Create a request with its reply channel. Used by substrate
    /// implementations.
    pub fn new(payload: Vec<u8>, reply: oneshot::Sender<Vec<u8>>) -> Self {
        Self { payload, reply }
    }

    /// The request payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Answer the request, consuming it.
    pub fn respond(self, payload: Vec<u8>) {
        // Requester may have timed out and gone away; nothing to do then.
        let _ = self.reply.send(payload);
    }
}

/// Inbound channels for a claimed mailbox.
///
/// Dropping the subscription does not release the address; call
/// [`Substrate::unsubscribe`] for that.
#[derive(Debug)]
pub struct Subscription {
    /// Envelopes published to the mailbox, in arrival order (which carries
    /// no guarantee relative to publish order).
    pub messages: mpsc::UnboundedReceiver<Vec<u8>>,

    /// Point-to-point requests addressed to the mailbox.
    pub requests: mpsc::UnboundedReceiver<InboundRequest>,
}

/// The injected pub/sub capability.
///
/// All methods deal in opaque byte payloads; envelope encoding is the
/// endpoint's concern.
#[async_trait(?Send)]
pub trait Substrate: Clone + 'static {
    /// Publish bytes to a mailbox, fire-and-forget.
    ///
    /// Publishing to an address with no subscriber is not an error; the
    /// payload is silently dropped, exactly as a lossy fabric would.
    ///
    /// # Errors
    ///
    /// Returns an error only for substrate-level failures (e.g. shutdown).
    async fn publish(
        &self,
        address: MailboxAddress,
        payload: Vec<u8>,
    ) -> Result<(), SubstrateError>;

    /// Claim a mailbox and receive its traffic.
    ///
    /// # Errors
    ///
    /// Returns `AddressInUse` if the address already has a subscriber.
    async fn subscribe(&self, address: MailboxAddress) -> Result<Subscription, SubstrateError>;

    /// Release a mailbox. Releasing an unclaimed address is a no-op.
    fn unsubscribe(&self, address: MailboxAddress);

    /// Point-to-point request to a mailbox's live subscriber.
    ///
    /// # Errors
    ///
    /// Returns `UnknownAddress` if nobody subscribes to the address,
    /// `RequestTimeout` if no answer arrives in time, and `RequestRefused`
    /// if the responder dropped the request.
    async fn request(
        &self,
        address: MailboxAddress,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, SubstrateError>;
}
