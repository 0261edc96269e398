//! Transport boundary.
//!
//! The multiplexor does not own the physical connection; it talks to a
//! [`Transport`]: a duplex message connection that can send serialized
//! messages, hand every inbound message to one registered handler, and
//! fan out lifecycle events (`open`/`close`/`error`) to listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐                           ┌──────────────────┐
//! │ Multiplexor  │  set_message_handler      │  WsTransport     │
//! │              │◄──────────────────────────│  (event loop)    │
//! │              │  send(raw)                │                  │
//! │              │──────────────────────────►│  WebSocket       │
//! └──────────────┘                           └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `ws` | WebSocket transport implementation |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::SubscriptionId;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket transport.
pub mod ws;

// ============================================================================
// Re-exports
// ============================================================================

pub use ws::WsTransport;

// ============================================================================
// Types
// ============================================================================

/// Handler for inbound transport messages.
///
/// Returning an error marks the message as a fatal protocol violation;
/// the transport logs it and stops delivering.
pub type MessageHandler = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Listener for transport lifecycle events.
///
/// The argument is an uninterpreted detail string: close reason, error
/// description, empty for `open`.
pub type LifecycleHandler = Arc<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// TransportEvent
// ============================================================================

/// Lifecycle events a transport emits outside message traffic.
///
/// Passed through the multiplexor uninterpreted and unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    /// Connection established.
    Open,
    /// Connection closed (remote or local).
    Close,
    /// Connection-level error.
    Error,
}

// ============================================================================
// Transport
// ============================================================================

/// A duplex message connection the multiplexor can sit on.
///
/// Implementations must be safe to share across tasks; the multiplexor
/// calls [`Transport::send`] concurrently with inbound delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one serialized message to the peer.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the transport is unusable.
    async fn send(&self, raw: String) -> Result<()>;

    /// Installs the handler invoked once per inbound message.
    ///
    /// A later call replaces the previous handler.
    fn set_message_handler(&self, handler: MessageHandler);

    /// Registers a lifecycle listener, returning its removal handle.
    fn add_listener(&self, event: TransportEvent, handler: LifecycleHandler) -> SubscriptionId;

    /// Removes a lifecycle listener. Returns `true` if the handle matched.
    fn remove_listener(&self, event: TransportEvent, id: SubscriptionId) -> bool;
}

// ============================================================================
// Test Support
// ============================================================================
