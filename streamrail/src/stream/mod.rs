//! Producer/consumer stream adapters.
//!
//! The adapters bind application-level event streams to transport
//! endpoints:
//!
//! - [`serve_stream`] (producer side) forwards a lazy, cancellable event
//!   source over a new endpoint and returns its mailbox address as the
//!   rendezvous value
//! - [`StreamConsumer`] performs the rendezvous handshake and republishes
//!   delivered payloads as a typed, cancellable sequence
//!
//! Items are typed end-to-end: the adapters encode/decode them with a
//! [`MessageCodec`](crate::MessageCodec), while envelope bodies stay opaque
//! bytes on the wire.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

mod consumer;
mod producer;

pub use consumer::StreamConsumer;
pub use producer::serve_stream;

/// Error produced by an application event source.
pub type SourceError = Box<dyn std::error::Error>;

/// A lazy, cancellable sequence of application events.
///
/// `next` returning `None` means the source completed; `Some(Err(..))`
/// means it failed. Either way the producer adapter stops the transport.
/// Cancellation is dropping the source.
#[async_trait(?Send)]
pub trait EventSource {
    /// The event type produced by this source.
    type Item: Serialize + 'static;

    /// Produce the next event, or `None` on completion.
    async fn next(&mut self) -> Option<Result<Self::Item, SourceError>>;
}

/// Channel-backed event source.
///
/// The simplest way to feed a produced stream: push events into the sender
/// half, drop it to complete the stream.
pub struct ChannelSource<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> ChannelSource<T> {
    /// Create a source and the sender half that feeds it.
    pub fn channel() -> (mpsc::UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { receiver: rx })
    }
}

#[async_trait(?Send)]
impl<T: Serialize + 'static> EventSource for ChannelSource<T> {
    type Item = T;

    async fn next(&mut self) -> Option<Result<T, SourceError>> {
        self.receiver.recv().await.map(Ok)
    }
}
