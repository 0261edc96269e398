//! Error types for the multiplexing layer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_mux::{Multiplexor, Result};
//!
//! fn example(mux: &Multiplexor) -> Result<()> {
//!     let channel = mux.add_channel("devtools")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Protocol (fatal) | [`Error::MalformedMessage`], [`Error::MalformedMethodName`], [`Error::UnknownChannelForResponse`], [`Error::ChannelSentMessageWithoutId`] |
//! | Capacity | [`Error::ChannelLimitExceeded`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Url`] |
//!
//! Fatal protocol variants signal a breach of the assumptions shared with
//! the peer on the other side of the transport. They are logged with the
//! offending raw payload at the call site and returned as error values the
//! caller cannot ignore.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ChannelId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging; protocol variants
/// carry the raw payload that triggered them.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors (fatal)
    // ========================================================================
    /// Inbound message carries neither `id` nor `method`.
    ///
    /// Cannot be classified as a response or a notification. Should never
    /// occur if both ends honor the protocol.
    #[error("Malformed message (no id, no method): {payload}")]
    MalformedMessage {
        /// Raw payload that failed classification.
        payload: String,
    },

    /// Notification `method` does not split into exactly `Domain.member`.
    #[error("Malformed method name {method:?}: {payload}")]
    MalformedMethodName {
        /// The offending method string.
        method: String,
        /// Raw payload the method arrived in.
        payload: String,
    },

    /// Response `id` decoded to a channel index with no channel.
    ///
    /// Either the peer invented an id or a caller issued an id outside the
    /// encoding's assumptions.
    #[error("Response for unknown channel {channel_id}: {payload}")]
    UnknownChannelForResponse {
        /// Decoded channel index with no channel behind it.
        channel_id: ChannelId,
        /// Raw response payload.
        payload: String,
    },

    /// A channel attempted to send a message with no `id`.
    ///
    /// Only requests flow from channel to transport; a message without an
    /// id has no response to correlate and cannot be id-rewritten.
    #[error("Channel {channel:?} sent message without id: {payload}")]
    ChannelSentMessageWithoutId {
        /// Name of the offending channel.
        channel: String,
        /// Raw outgoing payload.
        payload: String,
    },

    // ========================================================================
    // Capacity Errors
    // ========================================================================
    /// `add_channel` called with all channel slots taken.
    ///
    /// The single-decimal-digit id encoding caps channels at 10.
    #[error("Channel limit exceeded: {limit} channels already exist")]
    ChannelLimitExceeded {
        /// The fixed channel capacity.
        limit: usize,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a malformed message error.
    #[inline]
    pub fn malformed_message(payload: impl Into<String>) -> Self {
        Self::MalformedMessage {
            payload: payload.into(),
        }
    }

    /// Creates a malformed method name error.
    #[inline]
    pub fn malformed_method_name(method: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::MalformedMethodName {
            method: method.into(),
            payload: payload.into(),
        }
    }

    /// Creates an unknown channel error.
    #[inline]
    pub fn unknown_channel(channel_id: ChannelId, payload: impl Into<String>) -> Self {
        Self::UnknownChannelForResponse {
            channel_id,
            payload: payload.into(),
        }
    }

    /// Creates a message-without-id error.
    #[inline]
    pub fn message_without_id(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::ChannelSentMessageWithoutId {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// Creates a channel limit error.
    #[inline]
    pub const fn channel_limit(limit: usize) -> Self {
        Self::ChannelLimitExceeded { limit }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is an unrecoverable protocol violation.
    ///
    /// Fatal errors mean one side broke the documented wire assumptions;
    /// the transport should not be trusted afterwards.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. }
                | Self::MalformedMethodName { .. }
                | Self::UnknownChannelForResponse { .. }
                | Self::ChannelSentMessageWithoutId { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors are ordinary failures the caller can handle
    /// without abandoning the transport.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ChannelLimitExceeded { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
