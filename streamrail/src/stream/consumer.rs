//! Consumer-side stream adapter.

use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::codec::MessageCodec;
use crate::config::EndpointConfig;
use crate::endpoint::{CloseReason, EndpointEvent, TransportEndpoint};
use crate::error::TransportError;
use crate::mailbox::MailboxAddress;
use crate::substrate::Substrate;
use crate::task::TaskProvider;
use crate::time::TimeProvider;

/// A typed, cancellable sequence of events delivered from a remote
/// producer.
///
/// Construct with [`StreamConsumer::open`], then pull items with
/// [`next`](StreamConsumer::next). The sequence terminates either cleanly
/// (`None`: the producer completed or stopped) or with a terminal error
/// (`Some(Err(..))`: liveness timeout or unrecoverable gap), so callers can
/// decide whether to resubscribe.
///
/// Dropping the consumer stops its endpoint, which propagates cancellation
/// to the producer side.
pub struct StreamConsumer<Item, S, T, P, C>
where
    Item: DeserializeOwned,
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    endpoint: TransportEndpoint<S, T, P, C>,
    events: mpsc::UnboundedReceiver<EndpointEvent>,
    codec: C,
    done: bool,
    _item: PhantomData<Item>,
}

impl<Item, S, T, P, C> StreamConsumer<Item, S, T, P, C>
where
    Item: DeserializeOwned,
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    /// Perform the rendezvous handshake and open the stream.
    ///
    /// `rendezvous` is the external RPC collaborator: it receives this
    /// consumer's fresh mailbox address and returns the remote producer's
    /// mailbox address (typically by invoking the producer's
    /// [`serve_stream`](crate::serve_stream) handler).
    ///
    /// # Errors
    ///
    /// Surfaces endpoint lifecycle and substrate errors, plus whatever the
    /// rendezvous call itself returns.
    pub async fn open<F, Fut>(
        substrate: S,
        time: T,
        tasks: P,
        codec: C,
        config: EndpointConfig,
        rendezvous: F,
    ) -> Result<Self, TransportError>
    where
        F: FnOnce(MailboxAddress) -> Fut,
        Fut: Future<Output = Result<MailboxAddress, TransportError>>,
    {
        let (endpoint, events) =
            TransportEndpoint::new(substrate, time, tasks, codec.clone(), config);
        endpoint.start().await?;
        let producer = rendezvous(endpoint.local_address()).await?;
        endpoint.connect(producer)?;

        Ok(Self {
            endpoint,
            events,
            codec,
            done: false,
            _item: PhantomData,
        })
    }

    /// Pull the next event.
    ///
    /// - `Some(Ok(item))`: the next in-order event
    /// - `Some(Err(e))`: a terminal transport failure, or a per-item decode
    ///   failure (the stream continues after the latter)
    /// - `None`: clean end of stream
    pub async fn next(&mut self) -> Option<Result<Item, TransportError>> {
        if self.done {
            return None;
        }
        match self.events.recv().await {
            Some(EndpointEvent::Delivery(bytes)) => Some(
                self.codec
                    .decode::<Item>(&bytes)
                    .map_err(TransportError::from),
            ),
            Some(EndpointEvent::Closed(CloseReason::Signal)) => {
                self.done = true;
                None
            }
            Some(EndpointEvent::Closed(CloseReason::Error(e))) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                None
            }
        }
    }

    /// Cancel the stream: stops the endpoint, which notifies the producer.
    /// Subsequent `next` calls return `None`. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        self.done = true;
        if !self.endpoint.state().is_terminal() {
            if let Err(e) = self.endpoint.stop() {
                tracing::debug!(error = %e, "endpoint already stopped");
            }
        }
    }

    /// This consumer's mailbox address (the rendezvous value it offered).
    pub fn local_address(&self) -> MailboxAddress {
        self.endpoint.local_address()
    }
}

impl<Item, S, T, P, C> Drop for StreamConsumer<Item, S, T, P, C>
where
    Item: DeserializeOwned,
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    fn drop(&mut self) {
        if !self.endpoint.state().is_terminal() {
            let _ = self.endpoint.stop();
        }
    }
}
