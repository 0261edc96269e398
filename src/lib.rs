//! cdp-mux - Channel multiplexor for Chrome-Remote-Debugging-style protocols.
//!
//! This library multiplexes a single bidirectional JSON-message transport
//! (request/response pairs correlated by a numeric `id`, plus unsolicited
//! `method`-named notifications) into up to 10 independent virtual
//! connections ("channels"). Each channel behaves, from its consumer's
//! point of view, like a private connection to the debugged runtime: it
//! receives only the responses to its own requests, and only the
//! notifications for the protocol domains it has enabled.
//!
//! # How it works
//!
//! - **Id encoding**: an outgoing request id `i` from channel `c` travels
//!   on the wire as `i*10 + c`; the low decimal digit routes the response
//!   back. This caps channels at 10 per multiplexor.
//! - **Domain gating**: a notification's domain is the prefix before the
//!   first dot of its `method`. Sending `Domain.enable` through a channel
//!   marks the domain enabled there; until then, that channel buffers the
//!   domain's notifications.
//! - **Time-bounded buffering**: the buffer lives for a grace window
//!   (60 s by default) from the channel's first subscription; enabling a
//!   domain flushes its backlog in arrival order, and when the window
//!   closes everything unflushed is discarded for good.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cdp_mux::{Multiplexor, MuxConfig, Result, WsTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = WsTransport::connect("ws://127.0.0.1:9222/devtools/page/1").await?;
//!     let mux = Multiplexor::new(transport, MuxConfig::new());
//!
//!     let channel = mux.add_channel("devtools")?;
//!     channel.on_message(Arc::new(|message: &serde_json::Value| {
//!         println!("<- {message}");
//!     }));
//!
//!     // Enable a domain; buffered Network notifications (if any) flush
//!     // to the subscriber before this call returns.
//!     channel.send(r#"{"id":1,"method":"Network.enable"}"#).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`mux`] | Multiplexing engine: [`Multiplexor`], [`Channel`], id encoding |
//! | [`protocol`] | Wire-level message classification |
//! | [`transport`] | Transport boundary and WebSocket implementation |
//!
//! # Scope
//!
//! This layer interprets nothing beyond the domain prefix of a method
//! name and the presence of an `id`. It provides no request timeouts,
//! retries, or cancellation, and no ordering guarantee across channels —
//! only within one.

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for multiplexing entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Core multiplexing engine.
///
/// [`Multiplexor`] owns the shared transport and routes; [`Channel`] is
/// the per-consumer facade.
pub mod mux;

/// Wire-level message classification.
///
/// Internal mechanics, exposed for integration at the transport boundary.
pub mod protocol;

/// Transport boundary.
///
/// The [`Transport`] trait plus the WebSocket implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Engine types
pub use mux::{CHANNEL_RADIX, Channel, MessageSubscriber, Multiplexor, MuxConfig};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ChannelId, MAX_CHANNELS, RequestId, SubscriptionId};

// Transport types
pub use transport::{LifecycleHandler, MessageHandler, Transport, TransportEvent, WsTransport};
