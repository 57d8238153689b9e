//! Mailbox addressing.
//!
//! A [`MailboxAddress`] names a topic on the pub/sub substrate. Exactly one
//! transport endpoint subscribes to a given address at a time; addresses are
//! random 128-bit identifiers, collision-free for practical purposes.

use serde::{Deserialize, Serialize};

/// Opaque 128-bit identifier for an endpoint's inbound topic.
///
/// # Examples
///
/// ```
/// use streamrail::MailboxAddress;
///
/// let a = MailboxAddress::random();
/// let b = MailboxAddress::random();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxAddress {
    /// First 64 bits.
    pub first: u64,
    /// Second 64 bits.
    pub second: u64,
}

impl MailboxAddress {
    /// Create an address with explicit values.
    ///
    /// Mostly useful for deterministic addresses in tests; production
    /// endpoints use [`MailboxAddress::random`].
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Generate a fresh random address.
    pub fn random() -> Self {
        Self {
            first: rand::random(),
            second: rand::random(),
        }
    }
}

impl std::fmt::Display for MailboxAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}
