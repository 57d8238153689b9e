//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::future::Future;

use streamrail::{
    EndpointConfig, EndpointEvent, Envelope, JsonCodec, MailboxAddress, MemorySubstrate,
    MessageCodec, Substrate, TokioTaskProvider, TokioTimeProvider, TransportEndpoint,
};
use tokio::sync::mpsc;

/// Endpoint wired to the in-process substrate and tokio providers.
pub type TestEndpoint =
    TransportEndpoint<MemorySubstrate, TokioTimeProvider, TokioTaskProvider, JsonCodec>;

/// Run a future on a current-thread runtime inside a `LocalSet`, with the
/// clock paused so protocol timings (keepalive, liveness, gap retry) are
/// exercised deterministically and instantly.
pub fn run_local<F: Future>(future: F) -> F::Output {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to build runtime");
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, future)
}

/// Create an endpoint with default configuration on the given substrate.
pub fn make_endpoint(
    substrate: &MemorySubstrate,
) -> (TestEndpoint, mpsc::UnboundedReceiver<EndpointEvent>) {
    TransportEndpoint::new(
        substrate.clone(),
        TokioTimeProvider::new(),
        TokioTaskProvider,
        JsonCodec,
        EndpointConfig::default(),
    )
}

/// Publish a raw payload envelope into a mailbox, simulating substrate
/// traffic from a peer.
pub async fn publish_msg(substrate: &MemorySubstrate, addr: MailboxAddress, seq: i64, body: &[u8]) {
    let bytes = JsonCodec
        .encode(&Envelope::Msg {
            seq,
            body: body.to_vec(),
        })
        .expect("encode");
    substrate.publish(addr, bytes).await.expect("publish");
}

/// Publish a raw keepalive envelope into a mailbox.
pub async fn publish_ka(substrate: &MemorySubstrate, addr: MailboxAddress, seq: i64) {
    let bytes = JsonCodec.encode(&Envelope::Ka { seq }).expect("encode");
    substrate.publish(addr, bytes).await.expect("publish");
}

/// Publish a raw stop envelope into a mailbox.
pub async fn publish_stop(substrate: &MemorySubstrate, addr: MailboxAddress) {
    let bytes = JsonCodec.encode(&Envelope::Stop).expect("encode");
    substrate.publish(addr, bytes).await.expect("publish");
}

/// Await the next event and require it to be an in-order delivery.
pub async fn next_delivery(events: &mut mpsc::UnboundedReceiver<EndpointEvent>) -> Vec<u8> {
    match events.recv().await {
        Some(EndpointEvent::Delivery(body)) => body,
        other => panic!("expected delivery, got {:?}", other),
    }
}

/// Loss filter predicate dropping payload envelopes with the given
/// sequence number (keepalives and stop notices pass through).
pub fn drop_msg_with_seq(seq: i64) -> impl Fn(&MailboxAddress, &[u8]) -> bool {
    move |_, payload| {
        JsonCodec
            .decode::<Envelope>(payload)
            .map(|envelope| matches!(envelope, Envelope::Msg { seq: s, .. } if s == seq))
            .unwrap_or(false)
    }
}
