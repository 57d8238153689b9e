//! Producer-side stream adapter.

use tokio::sync::mpsc;

use super::EventSource;
use crate::codec::MessageCodec;
use crate::config::EndpointConfig;
use crate::endpoint::{EndpointEvent, TransportEndpoint};
use crate::error::TransportError;
use crate::mailbox::MailboxAddress;
use crate::substrate::Substrate;
use crate::task::TaskProvider;
use crate::time::TimeProvider;

/// Bind an event source to a consumer's mailbox and stream it.
///
/// This is the handler the application's RPC dispatch invokes when a remote
/// consumer asks for a stream: it constructs a transport endpoint, connects
/// it to `consumer`, and returns the endpoint's own mailbox address as the
/// rendezvous value. Streaming then happens asynchronously: each event the
/// source produces is encoded and sent; source completion or failure stops
/// the endpoint (failure is logged first); a close initiated by the
/// consumer side cancels the source by dropping it.
///
/// # Errors
///
/// Returns an error if the endpoint cannot be started or connected; once
/// this function returns `Ok`, all further failures are handled internally.
pub async fn serve_stream<Src, S, T, P, C>(
    substrate: S,
    time: T,
    tasks: P,
    codec: C,
    config: EndpointConfig,
    consumer: MailboxAddress,
    source: Src,
) -> Result<MailboxAddress, TransportError>
where
    Src: EventSource + 'static,
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    let (endpoint, events) = TransportEndpoint::new(substrate, time, tasks.clone(), codec.clone(), config);
    endpoint.start().await?;
    endpoint.connect(consumer)?;

    let local = endpoint.local_address();
    tasks.spawn_task("stream_producer", forward(endpoint, events, source, codec));
    Ok(local)
}

/// Pump the source into the endpoint until completion, failure, or a close
/// from the consumer side.
async fn forward<Src, S, T, P, C>(
    endpoint: TransportEndpoint<S, T, P, C>,
    mut events: mpsc::UnboundedReceiver<EndpointEvent>,
    mut source: Src,
    codec: C,
) where
    Src: EventSource + 'static,
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    loop {
        tokio::select! {
            item = source.next() => match item {
                Some(Ok(item)) => {
                    let bytes = match codec.encode(&item) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(error = %e, "failed to encode stream event");
                            break;
                        }
                    };
                    if let Err(e) = endpoint.send(bytes).await {
                        tracing::debug!(error = %e, "stream send failed");
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "event source failed");
                    break;
                }
                None => {
                    tracing::debug!("event source completed");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(EndpointEvent::Closed(reason)) => {
                    // Endpoint is already stopped; returning drops the
                    // source, which is its cancellation.
                    tracing::debug!(?reason, "stream closed by consumer side");
                    return;
                }
                // The producer side expects no inbound payloads.
                Some(EndpointEvent::Delivery(_)) => {}
                None => return,
            },
        }
    }

    if let Err(e) = endpoint.stop() {
        tracing::debug!(error = %e, "endpoint already stopped");
    }
}
