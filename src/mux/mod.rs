//! Core multiplexing engine.
//!
//! One shared transport, up to 10 virtual channels:
//!
//! ```text
//! consumer ──► Channel::send ──► Multiplexor::send ──► transport
//!                                  (id ← id*10 + c)
//!
//! transport ──► Multiplexor::on_message ─┬─ response ──► channel c = id mod 10
//!                                        └─ notification ──► every channel's
//!                                                            domain gate
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Virtual connection facade with domain gating and buffering |
//! | `config` | [`MuxConfig`] |
//! | `encoding` | Request id pair-encoding |
//! | `multiplexor` | Shared-transport owner and router |

// ============================================================================
// Submodules
// ============================================================================

/// Virtual connection facade.
pub mod channel;

/// Multiplexor configuration.
pub mod config;

/// Request id pair-encoding.
pub mod encoding;

/// Shared-transport owner and message router.
pub mod multiplexor;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Channel, MessageSubscriber};
pub use config::{DEFAULT_EVICTION_WINDOW, MuxConfig};
pub use encoding::{CHANNEL_RADIX, decode, encode};
pub use multiplexor::Multiplexor;
