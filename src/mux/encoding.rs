//! Request id pair-encoding.
//!
//! One shared transport carries requests from up to 10 channels, so every
//! outbound request id is combined with the issuing channel's digit:
//!
//! ```text
//! encoded = id * 10 + channel        channel = encoded mod 10
//!                                    id      = encoded div 10
//! ```
//!
//! The low decimal digit routes the response back to its channel; the rest
//! is the id the consumer issued. The radix is part of the wire contract —
//! widening it would admit more channels but breaks peers expecting the
//! digit scheme.
//!
//! The scheme assumes consumer-issued ids are small non-negative integers.
//! It does not detect a caller that issues ids already multiplied by 10;
//! such ids decode to another channel's digit and mis-route silently.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::{ChannelId, RequestId};

// ============================================================================
// Constants
// ============================================================================

/// Radix of the channel digit; bounds channels per multiplexor.
pub const CHANNEL_RADIX: u64 = 10;

// ============================================================================
// Encoding
// ============================================================================

/// Combines a consumer-issued id with the channel digit for the wire.
#[inline]
#[must_use]
pub const fn encode(id: RequestId, channel: ChannelId) -> RequestId {
    RequestId::new(id.value() * CHANNEL_RADIX + channel.value() as u64)
}

/// Splits a wire id back into `(consumer id, channel)`.
#[inline]
#[must_use]
pub const fn decode(encoded: RequestId) -> (RequestId, ChannelId) {
    let digit = (encoded.value() % CHANNEL_RADIX) as u8;
    let id = RequestId::new(encoded.value() / CHANNEL_RADIX);

    // digit < CHANNEL_RADIX by construction
    match ChannelId::new(digit) {
        Some(channel) => (id, channel),
        None => unreachable!(),
    }
}

// ============================================================================
// Tests
// ============================================================================
