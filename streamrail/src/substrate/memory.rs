//! In-process substrate implementation.
//!
//! [`MemorySubstrate`] is a real, usable pub/sub fabric for endpoints that
//! live in the same process, and doubles as the test substrate: it exposes
//! fault-injection hooks (a loss filter and a request-refusal switch) so
//! protocol behavior under message loss and unreachable peers can be
//! exercised deterministically.

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{InboundRequest, Substrate, SubstrateError, Subscription};
use crate::mailbox::MailboxAddress;
use crate::time::{TimeProvider, TokioTimeProvider};

/// Predicate deciding whether a published payload is dropped in flight.
type LossFilter = Box<dyn Fn(&MailboxAddress, &[u8]) -> bool>;

/// Sender halves of a claimed mailbox.
struct MailboxSenders {
    messages: mpsc::UnboundedSender<Vec<u8>>,
    requests: mpsc::UnboundedSender<InboundRequest>,
}

#[derive(Default)]
struct MemoryState {
    mailboxes: HashMap<MailboxAddress, MailboxSenders>,
    loss_filter: Option<LossFilter>,
    refuse_requests: bool,
}

/// Single-process pub/sub substrate.
///
/// Cheap to clone; all clones share the same mailbox table. Uses interior
/// mutability (`Rc<RefCell<..>>`) for the crate's single-threaded model.
pub struct MemorySubstrate<T: TimeProvider = TokioTimeProvider> {
    state: Rc<RefCell<MemoryState>>,
    time: T,
}

impl<T: TimeProvider> Clone for MemorySubstrate<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            time: self.time.clone(),
        }
    }
}

impl MemorySubstrate<TokioTimeProvider> {
    /// Create a substrate backed by tokio's clock.
    pub fn new() -> Self {
        Self::with_time(TokioTimeProvider::new())
    }
}

impl Default for MemorySubstrate<TokioTimeProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeProvider> MemorySubstrate<T> {
    /// Create a substrate with an explicit time provider (used for request
    /// timeouts).
    pub fn with_time(time: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(MemoryState::default())),
            time,
        }
    }

    /// Number of currently claimed mailboxes.
    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().mailboxes.len()
    }

    /// Install a loss filter: published payloads for which the predicate
    /// returns `true` are dropped in flight.
    pub fn set_loss_filter<F>(&self, filter: F)
    where
        F: Fn(&MailboxAddress, &[u8]) -> bool + 'static,
    {
        self.state.borrow_mut().loss_filter = Some(Box::new(filter));
    }

    /// Remove any installed loss filter.
    pub fn clear_loss_filter(&self) {
        self.state.borrow_mut().loss_filter = None;
    }

    /// When enabled, all requests fail immediately with `RequestRefused`,
    /// simulating an unreachable or amnesiac responder.
    pub fn set_refuse_requests(&self, refuse: bool) {
        self.state.borrow_mut().refuse_requests = refuse;
    }
}

impl<T: TimeProvider + 'static> MemorySubstrate<T> {
    fn request_sender(
        &self,
        address: MailboxAddress,
    ) -> Result<mpsc::UnboundedSender<InboundRequest>, SubstrateError> {
        let state = self.state.borrow();
        if state.refuse_requests {
            return Err(SubstrateError::RequestRefused);
        }
        state
            .mailboxes
            .get(&address)
            .map(|senders| senders.requests.clone())
            .ok_or(SubstrateError::UnknownAddress(address))
    }
}

#[async_trait(?Send)]
impl<T: TimeProvider + 'static> Substrate for MemorySubstrate<T> {
    async fn publish(
        &self,
        address: MailboxAddress,
        payload: Vec<u8>,
    ) -> Result<(), SubstrateError> {
        let state = self.state.borrow();

        if let Some(filter) = &state.loss_filter {
            if filter(&address, &payload) {
                tracing::debug!(mailbox = %address, bytes = payload.len(), "loss filter dropped payload");
                return Ok(());
            }
        }

        match state.mailboxes.get(&address) {
            Some(senders) => {
                // Subscriber may have dropped its receiver; fire-and-forget
                // means that is indistinguishable from loss.
                let _ = senders.messages.send(payload);
            }
            None => {
                tracing::debug!(mailbox = %address, "publish to unclaimed mailbox dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, address: MailboxAddress) -> Result<Subscription, SubstrateError> {
        let mut state = self.state.borrow_mut();
        if state.mailboxes.contains_key(&address) {
            return Err(SubstrateError::AddressInUse(address));
        }

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        state.mailboxes.insert(
            address,
            MailboxSenders {
                messages: message_tx,
                requests: request_tx,
            },
        );

        tracing::debug!(mailbox = %address, "mailbox subscribed");
        Ok(Subscription {
            messages: message_rx,
            requests: request_rx,
        })
    }

    fn unsubscribe(&self, address: MailboxAddress) {
        if self.state.borrow_mut().mailboxes.remove(&address).is_some() {
            tracing::debug!(mailbox = %address, "mailbox unsubscribed");
        }
    }

    async fn request(
        &self,
        address: MailboxAddress,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, SubstrateError> {
        let request_tx = self.request_sender(address)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        if request_tx
            .send(InboundRequest::new(payload, reply_tx))
            .is_err()
        {
            return Err(SubstrateError::UnknownAddress(address));
        }

        match self.time.timeout(timeout, reply_rx).await {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(_)) => Err(SubstrateError::RequestRefused),
            None => Err(SubstrateError::RequestTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(n: u64) -> MailboxAddress {
        MailboxAddress::new(n, n)
    }

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let substrate = MemorySubstrate::new();
        let addr = address(1);

        let mut subscription = substrate.subscribe(addr).await.expect("subscribe");
        substrate
            .publish(addr, b"hello".to_vec())
            .await
            .expect("publish");

        let received = subscription.messages.recv().await.expect("message");
        assert_eq!(received, b"hello");
    }

    #[tokio::test]
    async fn test_subscribe_twice_fails() {
        let substrate = MemorySubstrate::new();
        let addr = address(2);

        let _subscription = substrate.subscribe(addr).await.expect("subscribe");
        let result = substrate.subscribe(addr).await;
        assert!(matches!(result, Err(SubstrateError::AddressInUse(_))));
    }

    #[tokio::test]
    async fn test_publish_to_unclaimed_mailbox_is_dropped() {
        let substrate = MemorySubstrate::new();

        // Fire-and-forget: no subscriber is not an error.
        substrate
            .publish(address(3), b"nobody home".to_vec())
            .await
            .expect("publish");
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_address() {
        let substrate = MemorySubstrate::new();
        let addr = address(4);

        let _subscription = substrate.subscribe(addr).await.expect("subscribe");
        assert_eq!(substrate.subscriber_count(), 1);

        substrate.unsubscribe(addr);
        assert_eq!(substrate.subscriber_count(), 0);

        // Address can be claimed again
        let _subscription = substrate.subscribe(addr).await.expect("resubscribe");

        // Releasing an unclaimed address is a no-op
        substrate.unsubscribe(address(999));
    }

    #[tokio::test]
    async fn test_request_reply() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let substrate = MemorySubstrate::new();
                let addr = address(5);
                let mut subscription = substrate.subscribe(addr).await.expect("subscribe");

                tokio::task::spawn_local(async move {
                    let request = subscription.requests.recv().await.expect("request");
                    assert_eq!(request.payload(), b"ping");
                    request.respond(b"pong".to_vec());
                });

                let reply = substrate
                    .request(addr, b"ping".to_vec(), Duration::from_secs(1))
                    .await
                    .expect("request");
                assert_eq!(reply, b"pong");
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_unknown_address() {
        let substrate = MemorySubstrate::new();
        let result = substrate
            .request(address(6), b"ping".to_vec(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SubstrateError::UnknownAddress(_))));
    }

    #[tokio::test]
    async fn test_request_refused_when_dropped() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let substrate = MemorySubstrate::new();
                let addr = address(7);
                let mut subscription = substrate.subscribe(addr).await.expect("subscribe");

                tokio::task::spawn_local(async move {
                    let request = subscription.requests.recv().await.expect("request");
                    drop(request); // refuse without answering
                });

                let result = substrate
                    .request(addr, b"ping".to_vec(), Duration::from_secs(1))
                    .await;
                assert!(matches!(result, Err(SubstrateError::RequestRefused)));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let substrate = MemorySubstrate::new();
        let addr = address(8);

        // Subscriber exists but never drains its request queue.
        let _subscription = substrate.subscribe(addr).await.expect("subscribe");

        let result = substrate
            .request(addr, b"ping".to_vec(), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(SubstrateError::RequestTimeout)));
    }

    #[tokio::test]
    async fn test_loss_filter_drops_payloads() {
        let substrate = MemorySubstrate::new();
        let addr = address(9);
        let mut subscription = substrate.subscribe(addr).await.expect("subscribe");

        substrate.set_loss_filter(|_, payload| payload == b"lost");
        substrate
            .publish(addr, b"lost".to_vec())
            .await
            .expect("publish");
        substrate
            .publish(addr, b"kept".to_vec())
            .await
            .expect("publish");

        let received = subscription.messages.recv().await.expect("message");
        assert_eq!(received, b"kept");

        substrate.clear_loss_filter();
        substrate
            .publish(addr, b"lost".to_vec())
            .await
            .expect("publish");
        let received = subscription.messages.recv().await.expect("message");
        assert_eq!(received, b"lost");
    }

    #[tokio::test]
    async fn test_refuse_requests_switch() {
        let substrate = MemorySubstrate::new();
        let addr = address(10);
        let _subscription = substrate.subscribe(addr).await.expect("subscribe");

        substrate.set_refuse_requests(true);
        let result = substrate
            .request(addr, b"ping".to_vec(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(SubstrateError::RequestRefused)));
    }
}
