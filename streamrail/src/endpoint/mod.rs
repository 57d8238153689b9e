//! Transport endpoint reliability engine.
//!
//! A [`TransportEndpoint`] is one side of a logical connection. It owns a
//! private mailbox on the substrate, sequence counters for both directions,
//! a reorder buffer, a retained send history, and three timers (keepalive,
//! liveness, gap recovery). Payloads handed to [`TransportEndpoint::send`]
//! are published fire-and-forget; all reliability is reconstructed on the
//! receiving side, which delivers payloads to its consumer in strictly
//! increasing, contiguous sequence order with no duplicates.
//!
//! # Lifecycle
//!
//! `new` → [`start`](TransportEndpoint::start) (subscribe the mailbox) →
//! [`connect`](TransportEndpoint::connect) (bind the peer, begin protocol
//! operation) → [`stop`](TransportEndpoint::stop) (terminal). Each
//! transition is single-use; misuse fails fast with
//! [`TransportError::InvalidState`].
//!
//! # Concurrency
//!
//! Single-threaded and cooperative: state lives in `Cell`/`RefCell` inside
//! an `Rc`, background work (inbound pump, timer sleepers) runs on local
//! tasks holding a `Weak` reference, and stale timer wakeups are filtered
//! through epoch-tokened timer handles. `stop` synchronously disarms all
//! timers and releases the subscription before returning.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};
use tokio::sync::mpsc;

use crate::codec::MessageCodec;
use crate::config::EndpointConfig;
use crate::envelope::{Envelope, ResendReply, ResendRequest};
use crate::error::TransportError;
use crate::mailbox::MailboxAddress;
use crate::substrate::{InboundRequest, Substrate, Subscription};
use crate::task::TaskProvider;
use crate::time::TimeProvider;

mod lifecycle;
mod timer;

pub use lifecycle::LifecycleState;

use timer::TimerHandle;

/// Notification emitted by an endpoint toward its owner.
#[derive(Debug)]
pub enum EndpointEvent {
    /// An in-order payload ready for the consumer.
    Delivery(Vec<u8>),

    /// The endpoint closed. Emitted at most once; the endpoint is
    /// `Stopped` afterward.
    Closed(CloseReason),
}

/// Why an endpoint closed.
#[derive(Debug)]
pub enum CloseReason {
    /// Graceful termination: the peer sent a stop notice.
    Signal,

    /// Fatal termination: liveness timeout or unrecoverable gap.
    Error(TransportError),
}

/// One side of a reliable ordered connection over the substrate.
///
/// Cheap to clone; all clones share the same endpoint state.
pub struct TransportEndpoint<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    inner: Rc<EndpointInner<S, T, P, C>>,
}

impl<S, T, P, C> Clone for TransportEndpoint<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct EndpointInner<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    /// Self-reference handed to background tasks so they never keep the
    /// endpoint alive on their own.
    weak: Weak<EndpointInner<S, T, P, C>>,

    substrate: S,
    time: T,
    tasks: P,
    codec: C,
    config: EndpointConfig,

    /// Inbound mailbox, assigned at construction, immutable.
    local: MailboxAddress,

    /// Peer mailbox, unset until `connect`, immutable afterward.
    remote: Cell<Option<MailboxAddress>>,

    state: Cell<LifecycleState>,

    /// Highest sequence number assigned to an outbound payload, -1 if none.
    sent_seq: Cell<i64>,

    /// Highest sequence number observed from the peer, -1 if none.
    received_seq: Cell<i64>,

    /// Highest sequence number delivered to the consumer in order, -1 if
    /// none. Invariant: `received_processed_seq <= received_seq`.
    received_processed_seq: Cell<i64>,

    /// Payloads received out of order (or before the peer was known),
    /// keyed by sequence number.
    reorder: RefCell<BTreeMap<i64, Vec<u8>>>,

    /// Recently sent payloads retained to answer peers' resend requests.
    resend_history: RefCell<VecDeque<(i64, Vec<u8>)>>,

    events: mpsc::UnboundedSender<EndpointEvent>,

    keep_alive_timer: TimerHandle,
    gap_timer: TimerHandle,
    liveness_timer: TimerHandle,
}

impl<S, T, P, C> TransportEndpoint<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    /// Create an endpoint with a fresh random mailbox address.
    ///
    /// Returns the endpoint and the event stream its owner consumes:
    /// in-order payload deliveries plus the final close notification.
    pub fn new(
        substrate: S,
        time: T,
        tasks: P,
        codec: C,
        config: EndpointConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EndpointEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Rc::new_cyclic(|weak| EndpointInner {
            weak: weak.clone(),
            substrate,
            time,
            tasks,
            codec,
            config,
            local: MailboxAddress::random(),
            remote: Cell::new(None),
            state: Cell::new(LifecycleState::Init),
            sent_seq: Cell::new(-1),
            received_seq: Cell::new(-1),
            received_processed_seq: Cell::new(-1),
            reorder: RefCell::new(BTreeMap::new()),
            resend_history: RefCell::new(VecDeque::new()),
            events: events_tx,
            keep_alive_timer: TimerHandle::new(),
            gap_timer: TimerHandle::new(),
            liveness_timer: TimerHandle::new(),
        });
        (Self { inner }, events_rx)
    }

    /// This endpoint's inbound mailbox address.
    pub fn local_address(&self) -> MailboxAddress {
        self.inner.local
    }

    /// The peer's mailbox address, if `connect` has run.
    pub fn remote_address(&self) -> Option<MailboxAddress> {
        self.inner.remote.get()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Subscribe the mailbox and begin accepting inbound traffic.
    ///
    /// Envelopes arriving before [`connect`](Self::connect) are buffered by
    /// sequence number without validation, since no peer baseline exists
    /// yet.
    ///
    /// # Errors
    ///
    /// `InvalidState` if called more than once or after `stop`; substrate
    /// errors if the mailbox cannot be subscribed.
    pub async fn start(&self) -> Result<(), TransportError> {
        let from = self.inner.state.get();
        if !from.can_transition_to(LifecycleState::Started) {
            return Err(TransportError::InvalidState {
                from,
                to: LifecycleState::Started,
            });
        }

        let subscription = self.inner.substrate.subscribe(self.inner.local).await?;
        self.inner.transition(LifecycleState::Started)?;

        let weak = Rc::downgrade(&self.inner);
        self.inner
            .tasks
            .spawn_task("endpoint_inbound", inbound_pump(weak, subscription));
        Ok(())
    }

    /// Bind the peer's mailbox and begin active protocol operation.
    ///
    /// Flushes any payloads buffered before the peer was known, applying
    /// gap and liveness bookkeeping retroactively, then arms the keepalive
    /// and liveness timers.
    ///
    /// # Errors
    ///
    /// `InvalidState` if called before `start`, twice, or after `stop`.
    pub fn connect(&self, remote: MailboxAddress) -> Result<(), TransportError> {
        let inner = &self.inner;
        inner.transition(LifecycleState::Connected)?;
        inner.remote.set(Some(remote));
        tracing::debug!(endpoint = %inner.local, peer = %remote, "connected to peer");

        // Re-register sequence numbers observed while buffered so the
        // flush below sees the same state as live reception would have.
        let buffered: Vec<i64> = inner.reorder.borrow().keys().copied().collect();
        for seq in buffered {
            inner.note_received_seq(seq);
        }
        inner.drain_ready();

        inner.arm_keep_alive_timer();
        inner.arm_liveness_timer();
        inner.check_gap();
        Ok(())
    }

    /// Publish a payload to the peer, fire-and-forget.
    ///
    /// Assigns the next sequence number, records the payload in the resend
    /// history, and publishes. No acknowledgment is awaited; the receiver
    /// reconstructs reliability via gap recovery.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the endpoint is not connected; substrate errors if
    /// the publish itself fails.
    pub async fn send(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let inner = &self.inner;
        let state = inner.state.get();
        let (LifecycleState::Connected, Some(remote)) = (state, inner.remote.get()) else {
            return Err(TransportError::InvalidState {
                from: state,
                to: LifecycleState::Connected,
            });
        };

        let seq = inner.sent_seq.get() + 1;
        inner.sent_seq.set(seq);

        if inner.config.resend_history > 0 {
            let mut history = inner.resend_history.borrow_mut();
            if history.len() >= inner.config.resend_history {
                history.pop_front();
            }
            history.push_back((seq, body.clone()));
        }

        let bytes = inner.codec.encode(&Envelope::Msg { seq, body })?;
        tracing::trace!(endpoint = %inner.local, seq, "publishing payload");
        inner.substrate.publish(remote, bytes).await?;
        Ok(())
    }

    /// Tear the endpoint down. Terminal.
    ///
    /// Synchronously disarms all timers and releases the subscription, then
    /// best-effort publishes a stop notice to the peer (unacknowledged; the
    /// peer's liveness timeout is the fallback detector).
    ///
    /// # Errors
    ///
    /// `InvalidState` if called twice.
    pub fn stop(&self) -> Result<(), TransportError> {
        self.inner.transition(LifecycleState::Stopped)?;
        self.inner.teardown();
        Ok(())
    }
}

impl<S, T, P, C> EndpointInner<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    /// Single mutation point for the lifecycle state.
    fn transition(&self, to: LifecycleState) -> Result<(), TransportError> {
        let from = self.state.get();
        if !from.can_transition_to(to) {
            return Err(TransportError::InvalidState { from, to });
        }
        self.state.set(to);
        tracing::debug!(endpoint = %self.local, ?from, ?to, "lifecycle transition");
        Ok(())
    }

    fn note_received_seq(&self, seq: i64) {
        if seq > self.received_seq.get() {
            self.received_seq.set(seq);
        }
    }

    /// Decode and dispatch one unit of mailbox traffic.
    fn on_inbound(&self, bytes: Vec<u8>) {
        match self.codec.decode::<Envelope>(&bytes) {
            Ok(envelope) => self.on_envelope(envelope),
            Err(e) => {
                tracing::warn!(endpoint = %self.local, error = %e, "failed to decode envelope")
            }
        }
    }

    fn on_envelope(&self, envelope: Envelope) {
        match self.state.get() {
            LifecycleState::Started => {
                // No peer baseline yet: buffer payloads, ignore the rest.
                if let Envelope::Msg { seq, body } = envelope {
                    self.reorder.borrow_mut().entry(seq).or_insert(body);
                }
            }
            LifecycleState::Connected => match envelope {
                Envelope::Stop => {
                    tracing::debug!(endpoint = %self.local, "peer sent stop");
                    self.close(CloseReason::Signal);
                }
                Envelope::Msg { seq, body } => {
                    self.arm_liveness_timer();
                    self.note_received_seq(seq);
                    self.on_msg(seq, body);
                }
                Envelope::Ka { seq } => {
                    self.arm_liveness_timer();
                    self.note_received_seq(seq);
                    self.check_gap();
                }
            },
            LifecycleState::Init | LifecycleState::Stopped => {}
        }
    }

    /// Payload handling: deliver in order, buffer ahead-of-order, discard
    /// stale, then re-evaluate the gap timer.
    fn on_msg(&self, seq: i64, body: Vec<u8>) {
        let next = self.received_processed_seq.get() + 1;
        if seq < next {
            tracing::trace!(endpoint = %self.local, seq, "duplicate or stale payload discarded");
        } else {
            // Idempotent against duplicates of buffered payloads.
            self.reorder.borrow_mut().entry(seq).or_insert(body);
            self.drain_ready();
        }
        self.check_gap();
    }

    /// Deliver the contiguous run starting at `received_processed_seq + 1`.
    /// Any progress cancels a pending gap-recovery timer.
    fn drain_ready(&self) {
        let mut progressed = false;
        loop {
            let next = self.received_processed_seq.get() + 1;
            let body = self.reorder.borrow_mut().remove(&next);
            match body {
                Some(body) => {
                    self.received_processed_seq.set(next);
                    progressed = true;
                    tracing::trace!(endpoint = %self.local, seq = next, "delivering payload");
                    let _ = self.events.send(EndpointEvent::Delivery(body));
                }
                None => break,
            }
        }
        if progressed {
            self.gap_timer.disarm();
        }
    }

    /// Arm the gap-recovery timer if a gap is open and no timer is pending.
    fn check_gap(&self) {
        if self.received_processed_seq.get() < self.received_seq.get()
            && !self.gap_timer.is_armed()
        {
            self.arm_gap_timer();
        }
    }

    fn arm_gap_timer(&self) {
        let token = self.gap_timer.arm();
        let weak = self.weak.clone();
        self.tasks.spawn_task("gap_recovery_timer", async move {
            let Some(inner) = weak.upgrade() else { return };
            let time = inner.time.clone();
            let delay = inner.config.gap_retry;
            drop(inner);

            time.sleep(delay).await;

            let Some(inner) = weak.upgrade() else { return };
            if !inner.gap_timer.is_current(token) {
                return;
            }
            inner.gap_timer.disarm();
            inner.recover_gap().await;
        });
    }

    /// Ask the peer's live handler for the missing payload. A failure with
    /// no interleaved progress is fatal; a failure after a duplicate closed
    /// the gap in the meantime is silently dropped.
    async fn recover_gap(&self) {
        let missing = self.received_processed_seq.get() + 1;
        let Some(remote) = self.remote.get() else {
            return;
        };
        let request = match self.codec.encode(&ResendRequest { seq: missing }) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(endpoint = %self.local, error = %e, "failed to encode resend request");
                return;
            }
        };

        tracing::debug!(endpoint = %self.local, seq = missing, "requesting resend for sequence gap");
        let result = self
            .substrate
            .request(remote, request, self.config.resend_timeout)
            .await;

        if self.state.get().is_terminal() {
            return;
        }

        let outcome = match result {
            Ok(bytes) => self
                .codec
                .decode::<ResendReply>(&bytes)
                .map_err(TransportError::from),
            Err(e) => Err(TransportError::from(e)),
        };

        match outcome {
            Ok(reply) => {
                tracing::debug!(endpoint = %self.local, seq = reply.seq, "gap recovered via resend");
                self.on_msg(reply.seq, reply.body);
            }
            Err(e) => {
                if self.received_processed_seq.get() + 1 == missing {
                    tracing::warn!(
                        endpoint = %self.local,
                        seq = missing,
                        error = %e,
                        "resend failed with no progress, peer presumed unreachable"
                    );
                    self.close(CloseReason::Error(TransportError::GapUnrecoverable {
                        seq: missing,
                    }));
                } else {
                    tracing::debug!(endpoint = %self.local, seq = missing, "resend failed but a duplicate closed the gap");
                }
            }
        }
    }

    /// Restart the liveness window. Any mailbox traffic counts.
    fn arm_liveness_timer(&self) {
        let token = self.liveness_timer.arm();
        let weak = self.weak.clone();
        self.tasks.spawn_task("liveness_timer", async move {
            let Some(inner) = weak.upgrade() else { return };
            let time = inner.time.clone();
            let timeout = inner.config.liveness_timeout;
            drop(inner);

            time.sleep(timeout).await;

            let Some(inner) = weak.upgrade() else { return };
            if !inner.liveness_timer.is_current(token) {
                return;
            }
            inner.liveness_timer.disarm();
            tracing::warn!(endpoint = %inner.local, ?timeout, "liveness timeout, peer presumed dead");
            inner.close(CloseReason::Error(TransportError::LivenessTimeout {
                timeout,
            }));
        });
    }

    /// Periodic keepalive carrying the current outbound sequence number, so
    /// the peer can detect gaps even without payload traffic.
    fn arm_keep_alive_timer(&self) {
        let token = self.keep_alive_timer.arm();
        let weak = self.weak.clone();
        self.tasks.spawn_task("keep_alive_timer", async move {
            loop {
                let Some(inner) = weak.upgrade() else { return };
                let time = inner.time.clone();
                let period = inner.config.keep_alive;
                drop(inner);

                time.sleep(period).await;

                let Some(inner) = weak.upgrade() else { return };
                if !inner.keep_alive_timer.is_current(token) {
                    return;
                }
                let Some(remote) = inner.remote.get() else {
                    return;
                };
                let envelope = Envelope::Ka {
                    seq: inner.sent_seq.get(),
                };
                let bytes = match inner.codec.encode(&envelope) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode keepalive");
                        return;
                    }
                };
                let substrate = inner.substrate.clone();
                drop(inner);
                if let Err(e) = substrate.publish(remote, bytes).await {
                    tracing::debug!(error = %e, "keepalive publish failed");
                }
            }
        });
    }

    /// Serve a peer's resend request from the retained send history.
    /// Dropping the request without answering refuses it.
    fn on_resend_request(&self, request: InboundRequest) {
        let resend = match self.codec.decode::<ResendRequest>(request.payload()) {
            Ok(resend) => resend,
            Err(e) => {
                tracing::warn!(endpoint = %self.local, error = %e, "undecodable resend request dropped");
                return;
            }
        };

        let body = self
            .resend_history
            .borrow()
            .iter()
            .find(|(seq, _)| *seq == resend.seq)
            .map(|(_, body)| body.clone());

        match body {
            Some(body) => {
                tracing::debug!(endpoint = %self.local, seq = resend.seq, "serving resend from history");
                match self.codec.encode(&ResendReply {
                    seq: resend.seq,
                    body,
                }) {
                    Ok(bytes) => request.respond(bytes),
                    Err(e) => tracing::warn!(error = %e, "failed to encode resend reply"),
                }
            }
            None => {
                tracing::debug!(endpoint = %self.local, seq = resend.seq, "resend request for unretained sequence refused");
            }
        }
    }

    /// Fatal-path funnel: notify the owner once, then tear down.
    fn close(&self, reason: CloseReason) {
        if self.state.get().is_terminal() {
            return;
        }
        tracing::debug!(endpoint = %self.local, ?reason, "closing endpoint");
        let _ = self.events.send(EndpointEvent::Closed(reason));
        if self.transition(LifecycleState::Stopped).is_ok() {
            self.teardown();
        }
    }

    /// Disarm every timer, release the subscription, and best-effort notify
    /// the peer. Must not await: callers rely on teardown completing before
    /// they return.
    fn teardown(&self) {
        self.keep_alive_timer.disarm();
        self.gap_timer.disarm();
        self.liveness_timer.disarm();
        self.substrate.unsubscribe(self.local);

        let Some(remote) = self.remote.get() else {
            return;
        };
        let bytes = match self.codec.encode(&Envelope::Stop) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode stop notice");
                return;
            }
        };
        let substrate = self.substrate.clone();
        self.tasks.spawn_task("stop_notify", async move {
            if let Err(e) = substrate.publish(remote, bytes).await {
                tracing::debug!(error = %e, "stop notice publish failed");
            }
        });
    }
}

impl<S, T, P, C> Drop for EndpointInner<S, T, P, C>
where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    fn drop(&mut self) {
        // Last-owner cleanup for endpoints dropped without an explicit
        // stop. No stop notice: spawning is not available during drop.
        if !self.state.get().is_terminal() {
            self.keep_alive_timer.disarm();
            self.gap_timer.disarm();
            self.liveness_timer.disarm();
            self.substrate.unsubscribe(self.local);
        }
    }
}

/// Drives one endpoint's subscription: envelopes and resend requests are
/// dispatched into the endpoint until it is dropped or unsubscribed.
async fn inbound_pump<S, T, P, C>(
    weak: Weak<EndpointInner<S, T, P, C>>,
    mut subscription: Subscription,
) where
    S: Substrate,
    T: TimeProvider + 'static,
    P: TaskProvider + 'static,
    C: MessageCodec,
{
    loop {
        tokio::select! {
            message = subscription.messages.recv() => match message {
                Some(bytes) => {
                    let Some(inner) = weak.upgrade() else { return };
                    inner.on_inbound(bytes);
                }
                None => return,
            },
            request = subscription.requests.recv() => match request {
                Some(request) => {
                    let Some(inner) = weak.upgrade() else { return };
                    inner.on_resend_request(request);
                }
                None => return,
            },
        }
    }
}
