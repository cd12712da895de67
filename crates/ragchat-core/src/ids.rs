//! Identifier types for chat messages.
//!
//! Message IDs are assigned from a monotonic counter so that creation order
//! is also display order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a single chat message.
///
/// IDs compare in creation order: a message created later always has a
/// greater ID than any message created before it by the same allocator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create a `MessageId` from its raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Return the raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Monotonic allocator for [`MessageId`] values.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Create an allocator that starts at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Hand out the next identifier.
    pub fn next_id(&mut self) -> MessageId {
        // `Default` starts at 0; skip it so 0 never names a real message.
        if self.next == 0 {
            self.next = 1;
        }
        let id = MessageId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic() {
        let mut ids = IdAllocator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn default_allocator_skips_zero() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.next_id().get(), 1);
    }

    #[test]
    fn display_format() {
        assert_eq!(MessageId::from_raw(7).to_string(), "msg-7");
        assert_eq!(format!("{:?}", MessageId::from_raw(7)), "MessageId(7)");
    }

    #[test]
    fn serializes_as_number() {
        let json = serde_json::to_string(&MessageId::from_raw(42)).unwrap();
        assert_eq!(json, "42");
    }
}
