//! Single-owner timer handles.
//!
//! Each endpoint timer (keepalive, liveness, gap recovery) is tracked by a
//! [`TimerHandle`]: arming hands out an epoch token, and the spawned sleeper
//! checks the token when it wakes. Re-arming or disarming invalidates every
//! outstanding sleeper, so a stale timer firing after a state change is a
//! no-op rather than a race.

use std::cell::Cell;

/// Armed/disarmed state for one logical timer.
///
/// Disarming an already-disarmed timer is a no-op, never an error.
#[derive(Debug, Default)]
pub(crate) struct TimerHandle {
    epoch: Cell<u64>,
    armed: Cell<bool>,
}

impl TimerHandle {
    /// Create a disarmed handle.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arm the timer, invalidating any previous arming. Returns the token
    /// the sleeper must present when it fires.
    pub(crate) fn arm(&self) -> u64 {
        let token = self.epoch.get().wrapping_add(1);
        self.epoch.set(token);
        self.armed.set(true);
        token
    }

    /// Disarm the timer. Safe to call redundantly.
    pub(crate) fn disarm(&self) {
        self.armed.set(false);
    }

    /// Whether the timer is currently armed.
    pub(crate) fn is_armed(&self) -> bool {
        self.armed.get()
    }

    /// Whether a sleeper holding `token` is still the current arming.
    pub(crate) fn is_current(&self, token: u64) -> bool {
        self.armed.get() && self.epoch.get() == token
    }
}
