//! Endpoint lifecycle state machine.

/// Endpoint lifecycle state machine.
///
/// # State Transitions
///
/// ```text
/// Init → Started → Connected → Stopped
///      ↓         ↓
///      Stopped   Stopped
/// ```
///
/// # Validation Rules
///
/// - Transitions are one-directional; each transition method (`start`,
///   `connect`, `stop`) is single-use
/// - An out-of-order or repeated transition fails fast with
///   `TransportError::InvalidState` and never mutates state
///
/// # Invariants
///
/// - Payloads flow only in `Connected`
/// - `Stopped` is terminal: timers disarmed, subscription released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, mailbox not yet subscribed.
    Init,

    /// Mailbox subscribed, peer unknown. Inbound payloads are buffered
    /// without sequence validation.
    Started,

    /// Peer bound; full protocol operation (delivery, keepalive, liveness,
    /// gap recovery).
    Connected,

    /// Torn down, no longer usable.
    Stopped,
}

impl LifecycleState {
    /// Check if transition to the next state is valid.
    ///
    /// # Valid Transitions
    ///
    /// - Init → Started
    /// - Started → Connected
    /// - Init, Started, Connected → Stopped
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Init, Started)
                | (Started, Connected)
                | (Init, Stopped)
                | (Started, Stopped)
                | (Connected, Stopped)
        )
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped)
    }
}
