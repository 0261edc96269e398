//! Type-safe identifiers for multiplexing entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time:
//! a [`ChannelId`] is a sequence index, a [`RequestId`] is a wire-level
//! correlation id, a [`SubscriptionId`] is a listener handle. All three
//! are cheap `Copy` integers underneath.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of channels a single multiplexor can host.
///
/// Bounded by the single-decimal-digit id encoding (see `mux::encoding`).
pub const MAX_CHANNELS: usize = 10;

// ============================================================================
// ChannelId
// ============================================================================

/// Index of a channel within its multiplexor, in `[0, 9]`.
///
/// Assigned at creation as the channel's position in the channel list and
/// never reused; the value is the low decimal digit of every request id the
/// channel puts on the shared transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u8);

impl ChannelId {
    /// Creates a channel id, returning `None` if out of range.
    #[inline]
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if (value as usize) < MAX_CHANNELS {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Returns the raw digit value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns the id as a list index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Wire-level request/response correlation id.
///
/// A `RequestId` is either *plain* (as issued by a channel's consumer) or
/// *encoded* (plain id and channel digit combined for the shared
/// transport); the type does not distinguish the two, the encoding
/// functions in `mux::encoding` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Creates a request id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Handle identifying a registered listener.
///
/// Returned by every listener registration and consumed by removal.
/// Handles are process-unique, drawn from one atomic counter, so a handle
/// from one registry can never accidentally match an entry in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription id.
    #[must_use]
    pub fn generate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
