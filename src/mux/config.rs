//! Multiplexor configuration.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default grace period for enabling domains after first subscribing.
pub const DEFAULT_EVICTION_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// MuxConfig
// ============================================================================

/// Configuration for a [`Multiplexor`](super::Multiplexor).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cdp_mux::MuxConfig;
///
/// let config = MuxConfig::new()
///     .evict_after(Duration::from_secs(30))
///     .suppress_debugger_for("tools");
/// ```
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// How long a channel may buffer notifications for domains it has not
    /// yet enabled, measured from its first `"message"` subscription.
    /// When the window closes the buffers are discarded for good.
    pub evict_after: Duration,

    /// Channel-name substring gating Debugger-domain notifications.
    ///
    /// Channels whose name contains this substring never see (and never
    /// buffer) `Debugger.*` notifications. `None` disables the filter.
    pub suppress_debugger_for: Option<String>,
}

impl MuxConfig {
    /// Creates a config with defaults: 60 s eviction window, no
    /// suppression.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            evict_after: DEFAULT_EVICTION_WINDOW,
            suppress_debugger_for: None,
        }
    }

    /// Sets the buffer eviction window.
    #[inline]
    #[must_use]
    pub const fn evict_after(mut self, window: Duration) -> Self {
        self.evict_after = window;
        self
    }

    /// Suppresses Debugger notifications for channels whose name contains
    /// `substring`.
    #[inline]
    #[must_use]
    pub fn suppress_debugger_for(mut self, substring: impl Into<String>) -> Self {
        self.suppress_debugger_for = Some(substring.into());
        self
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
