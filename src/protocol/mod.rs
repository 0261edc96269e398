//! Wire-level message types.
//!
//! The multiplexing layer treats messages as opaque JSON, interpreting
//! exactly two things: the presence of an integer `id` (response vs.
//! notification) and the `Domain.member` shape of a `method` name.
//!
//! # Message Shapes
//!
//! | Message | Fields | Direction |
//! |---------|--------|-----------|
//! | Request | `id`, `method`, `params?` | channel → runtime |
//! | Response | `id`, `result?` / `error?` | runtime → one channel |
//! | Notification | `method`, `params?` | runtime → all eligible channels |
//!
//! Everything except the `id` field passes through bit-compatibly.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Inbound classification and method splitting |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound message classification.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{DEBUGGER_DOMAIN, Envelope, enable_domain, split_method};
