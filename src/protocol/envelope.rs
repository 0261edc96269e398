//! Inbound message classification.
//!
//! Every message arriving on the shared transport is either a *response*
//! (carries an integer `id`) or a *notification* (carries a
//! `Domain.member` method and no `id`). Classification looks only at
//! those two fields; the payload itself stays an untouched
//! [`serde_json::Value`] so unknown protocol fields survive the trip.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Domain subject to per-channel suppression (see `MuxConfig`).
pub const DEBUGGER_DOMAIN: &str = "Debugger";

/// Method suffix that marks a domain-enable request.
const ENABLE_SUFFIX: &str = ".enable";

// ============================================================================
// Envelope
// ============================================================================

/// A classified inbound message.
#[derive(Debug, Clone)]
pub enum Envelope {
    /// Response to a previously sent request.
    ///
    /// `id` is the encoded wire id; the owning channel is its low decimal
    /// digit.
    Response {
        /// Encoded correlation id.
        id: RequestId,
        /// Full message payload, `id` field still encoded.
        message: Value,
    },

    /// Unsolicited notification.
    Notification {
        /// Domain prefix of the method (`"Network"` in `"Network.requestWillBeSent"`).
        domain: String,
        /// Full message payload.
        message: Value,
    },
}

impl Envelope {
    /// Classifies a raw transport message.
    ///
    /// Responses win classification: a message carrying both `id` and
    /// `method` (an echoed request) is treated as a response.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedMessage`] if `raw` is not JSON, carries neither
    ///   `id` nor `method`, or carries an `id` that is not a non-negative
    ///   integer
    /// - [`Error::MalformedMethodName`] if `method` is not exactly
    ///   `Domain.member`
    pub fn classify(raw: &str) -> Result<Self> {
        let message: Value =
            serde_json::from_str(raw).map_err(|_| Error::malformed_message(raw))?;

        if let Some(id_value) = message.get("id") {
            let id = id_value
                .as_u64()
                .ok_or_else(|| Error::malformed_message(raw))?;

            return Ok(Self::Response {
                id: RequestId::new(id),
                message,
            });
        }

        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return Err(Error::malformed_message(raw));
        };

        let Some((domain, _member)) = split_method(method) else {
            return Err(Error::malformed_method_name(method, raw));
        };

        Ok(Self::Notification {
            domain: domain.to_string(),
            message,
        })
    }
}

// ============================================================================
// Method Helpers
// ============================================================================

/// Splits a method name into `(domain, member)`.
///
/// Returns `None` unless the name has exactly two dot-separated parts.
///
/// # Example
///
/// ```
/// use cdp_mux::protocol::split_method;
///
/// assert_eq!(split_method("Network.enable"), Some(("Network", "enable")));
/// assert_eq!(split_method("Network"), None);
/// assert_eq!(split_method("a.b.c"), None);
/// ```
#[inline]
#[must_use]
pub fn split_method(method: &str) -> Option<(&str, &str)> {
    let (domain, member) = method.split_once('.')?;
    if member.contains('.') {
        return None;
    }
    Some((domain, member))
}

/// Returns the domain of a `Domain.enable` method, `None` for any other.
///
/// # Example
///
/// ```
/// use cdp_mux::protocol::enable_domain;
///
/// assert_eq!(enable_domain("Network.enable"), Some("Network"));
/// assert_eq!(enable_domain("Network.disable"), None);
/// ```
#[inline]
#[must_use]
pub fn enable_domain(method: &str) -> Option<&str> {
    method.strip_suffix(ENABLE_SUFFIX).filter(|d| !d.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
