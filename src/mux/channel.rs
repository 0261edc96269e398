//! Virtual connection facade.
//!
//! A [`Channel`] is handed to a single logical consumer and behaves like a
//! private connection to the debugged runtime: requests sent through it
//! come back only to it, and notifications arrive only for the domains it
//! has enabled (signalled by sending a `Domain.enable` request).
//!
//! # Buffering
//!
//! Notifications for a not-yet-enabled domain are buffered in arrival
//! order and replayed when the domain's enable request goes out. The
//! buffer is time-bounded: a one-shot eviction timer starts at the first
//! `"message"` subscription, and when it fires the channel is tombstoned —
//! buffered history is discarded and future not-yet-enabled notifications
//! are dropped instead of buffered. A consumer is expected to enable every
//! domain it cares about within the window (60 s by default).
//!
//! A channel that is never subscribed to never starts the timer and
//! buffers without bound. That is a deliberate trade-off inherited from
//! the protocol contract, not an oversight. Arming the timer spawns a
//! task, so the first subscription on a channel must happen inside a
//! tokio runtime.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelId, SubscriptionId};
use crate::protocol::enable_domain;
use crate::transport::{LifecycleHandler, TransportEvent};

use super::Multiplexor;

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback for messages delivered on a channel.
///
/// Receives the decoded message: responses with the consumer's original
/// `id` restored, notifications exactly as they arrived.
pub type MessageSubscriber = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// PendingBuffers
// ============================================================================

/// Buffering state machine for not-yet-enabled domains.
///
/// `Buffering` is the initial state; the eviction timer moves the channel
/// to `Tombstoned` exactly once, discarding all buffered history. There is
/// no way back.
enum PendingBuffers {
    /// Notifications for not-yet-enabled domains accumulate per domain.
    Buffering(FxHashMap<String, Vec<Value>>),
    /// Eviction fired; unflushed history is gone, nothing buffers anymore.
    Tombstoned,
}

// ============================================================================
// ChannelState
// ============================================================================

/// Mutable channel state, all behind one lock.
struct ChannelState {
    /// Domains this channel has enabled. Grows monotonically.
    enabled: FxHashSet<String>,
    /// Per-domain backlog of notifications awaiting an enable.
    pending: PendingBuffers,
    /// Message subscribers in registration order.
    subscribers: Vec<(SubscriptionId, MessageSubscriber)>,
    /// One-shot eviction timer, armed at the first subscription.
    evict_task: Option<JoinHandle<()>>,
}

// ============================================================================
// Channel
// ============================================================================

/// One virtual connection multiplexed over the shared transport.
///
/// Created via [`Multiplexor::add_channel`]; lives as long as its
/// multiplexor. Cheap to share (`Arc`), all methods take `&self`.
pub struct Channel {
    /// Identifying name, assigned at creation.
    name: String,
    /// Sequence index within the multiplexor, also the wire id digit.
    id: ChannelId,
    /// Owning multiplexor (weak: the multiplexor owns the channels).
    mux: Weak<Multiplexor>,
    /// Eviction window, from the multiplexor's config.
    evict_after: Duration,
    /// Interior state.
    state: Mutex<ChannelState>,
}

impl Channel {
    /// Creates a channel. Called only by [`Multiplexor::add_channel`].
    pub(crate) fn new(
        name: impl Into<String>,
        id: ChannelId,
        mux: Weak<Multiplexor>,
        evict_after: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            id,
            mux,
            evict_after,
            state: Mutex::new(ChannelState {
                enabled: FxHashSet::default(),
                pending: PendingBuffers::Buffering(FxHashMap::default()),
                subscribers: Vec::new(),
                evict_task: None,
            }),
        })
    }

    /// Returns the channel's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the channel's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a request toward the debugged runtime.
    ///
    /// The request's `id` is rewritten for the shared transport; the
    /// matching response comes back through this channel's subscribers
    /// with the original `id` restored.
    ///
    /// A method ending in `.enable` marks its domain enabled for this
    /// channel (idempotently) once the request has been forwarded, and
    /// flushes any notifications buffered for that domain in arrival
    /// order before this call returns. The gate stays closed while the
    /// forward is in flight, so a notification arriving mid-forward lands
    /// in the buffer and replays behind the existing backlog rather than
    /// jumping ahead of it.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `message` is not valid JSON
    /// - [`Error::ChannelSentMessageWithoutId`] if `message` has no
    ///   integer `id` (only requests flow this way)
    /// - [`Error::ConnectionClosed`] if the multiplexor is gone
    pub async fn send(&self, message: &str) -> Result<()> {
        let message: Value = serde_json::from_str(message)?;

        let enable = message
            .get("method")
            .and_then(Value::as_str)
            .and_then(enable_domain)
            .map(str::to_string);

        let mux = self.mux.upgrade().ok_or(Error::ConnectionClosed)?;
        mux.send(self, message).await?;

        if let Some(domain) = enable {
            self.enable_and_flush(&domain);
        }

        Ok(())
    }

    // ========================================================================
    // Subscribing
    // ========================================================================

    /// Registers a subscriber for messages delivered on this channel.
    ///
    /// The first registration ever arms the one-shot eviction timer; when
    /// it fires, all not-yet-flushed notification buffers are discarded
    /// for good (see module docs).
    ///
    /// # Panics
    ///
    /// The eviction timer runs as a spawned task, so the first
    /// registration on a channel must happen inside a tokio runtime.
    pub fn on_message(self: &Arc<Self>, subscriber: MessageSubscriber) -> SubscriptionId {
        let id = SubscriptionId::generate();
        let mut state = self.state.lock();
        state.subscribers.push((id, subscriber));

        if state.evict_task.is_none() && matches!(state.pending, PendingBuffers::Buffering(_)) {
            let channel = Arc::downgrade(self);
            // The window is measured from the subscription itself, not
            // from whenever the spawned task first gets polled.
            let deadline = tokio::time::Instant::now() + self.evict_after;
            state.evict_task = Some(tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(channel) = channel.upgrade() {
                    channel.tombstone();
                }
            }));
        }

        id
    }

    /// Removes a previously registered subscriber.
    ///
    /// Returns `true` if the handle matched a registration.
    pub fn remove_listener(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
        state.subscribers.len() != before
    }

    /// Registers a listener for a transport lifecycle event.
    ///
    /// These are not multiplexed: the registration passes through to the
    /// shared transport verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the multiplexor is gone.
    pub fn on_transport_event(
        &self,
        event: TransportEvent,
        handler: LifecycleHandler,
    ) -> Result<SubscriptionId> {
        let mux = self.mux.upgrade().ok_or(Error::ConnectionClosed)?;
        Ok(mux.add_transport_listener(event, handler))
    }

    /// Removes a transport lifecycle listener registered through this
    /// channel (or the multiplexor; the registry is shared).
    pub fn remove_transport_listener(&self, event: TransportEvent, id: SubscriptionId) -> bool {
        self.mux
            .upgrade()
            .is_some_and(|mux| mux.remove_transport_listener(event, id))
    }

    // ========================================================================
    // Delivery (multiplexor-facing)
    // ========================================================================

    /// Delivers a decoded response to every subscriber. No domain gating:
    /// a response always belongs to this channel by id decoding.
    pub(crate) fn deliver(&self, message: &Value) {
        let subscribers = self.snapshot_subscribers();
        for subscriber in &subscribers {
            subscriber(message);
        }
    }

    /// Domain-gated notification delivery.
    ///
    /// Enabled domain: deliver live. Not enabled: buffer, unless the
    /// channel is tombstoned, in which case the notification is dropped.
    pub(crate) fn dispatch(&self, domain: &str, message: &Value) {
        let subscribers = {
            let mut state = self.state.lock();

            if !state.enabled.contains(domain) {
                match &mut state.pending {
                    PendingBuffers::Buffering(buffers) => {
                        trace!(channel = %self.name, %domain, "Buffering notification");
                        buffers
                            .entry(domain.to_string())
                            .or_default()
                            .push(message.clone());
                    }
                    PendingBuffers::Tombstoned => {
                        trace!(channel = %self.name, %domain, "Dropping notification (tombstoned)");
                    }
                }
                return;
            }

            state
                .subscribers
                .iter()
                .map(|(_, s)| Arc::clone(s))
                .collect::<Vec<_>>()
        };

        for subscriber in &subscribers {
            subscriber(message);
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Marks a domain enabled and drains its backlog under a single lock
    /// acquisition, then re-dispatches each drained payload in arrival
    /// order through the normal gated path. Opening the gate and draining
    /// together means no notification can slip between the two and deliver
    /// ahead of the backlog.
    fn enable_and_flush(&self, domain: &str) {
        let drained = {
            let mut state = self.state.lock();
            if state.enabled.insert(domain.to_string()) {
                debug!(channel = %self.name, %domain, "Domain enabled");
            }
            match &mut state.pending {
                PendingBuffers::Buffering(buffers) => buffers.remove(domain),
                PendingBuffers::Tombstoned => None,
            }
        };

        let Some(drained) = drained else { return };

        debug!(
            channel = %self.name,
            %domain,
            count = drained.len(),
            "Flushing buffered notifications"
        );
        for message in &drained {
            self.dispatch(domain, message);
        }
    }

    /// Discards all buffered history and stops buffering permanently.
    fn tombstone(&self) {
        let mut state = self.state.lock();

        if let PendingBuffers::Buffering(buffers) = &state.pending {
            let dropped: usize = buffers.values().map(Vec::len).sum();
            if dropped > 0 {
                warn!(
                    channel = %self.name,
                    dropped,
                    "Eviction window closed with unflushed notifications"
                );
            } else {
                debug!(channel = %self.name, "Eviction window closed");
            }
            state.pending = PendingBuffers::Tombstoned;
        }
    }

    fn snapshot_subscribers(&self) -> Vec<MessageSubscriber> {
        self.state
            .lock()
            .subscribers
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        // Cancel the eviction timer so a torn-down channel leaves no task
        // behind.
        if let Some(task) = self.state.lock().evict_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use async_trait::async_trait;

    use crate::mux::{Multiplexor, MuxConfig};
    use crate::transport::testing::MockTransport;
    use crate::transport::{MessageHandler, Transport};

    fn make_channel() -> (Arc<Multiplexor>, Arc<Channel>) {
        let transport = MockTransport::new();
        let mux = Multiplexor::new(transport as Arc<dyn Transport>, MuxConfig::new());
        let channel = mux.add_channel("test").expect("add channel");
        (mux, channel)
    }

    fn capture() -> (MessageSubscriber, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscriber: MessageSubscriber = Arc::new(move |message: &Value| {
            sink.lock().push(message.clone());
        });
        (subscriber, seen)
    }

    #[tokio::test]
    async fn test_enable_flushes_backlog_in_order() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        channel.on_message(sub);

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":1}}"#)
            .expect("buffer");
        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":2}}"#)
            .expect("buffer");
        mux.on_message(r#"{"method":"Page.loadEventFired","params":{}}"#)
            .expect("buffer");
        assert!(seen.lock().is_empty());

        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");

        // Backlog replayed in arrival order, Page still buffered.
        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0]["params"]["n"], json!(1));
            assert_eq!(seen[1]["params"]["n"], json!(2));
        }

        // Anything arriving after the enable delivers live, after the
        // replayed backlog.
        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":3}}"#)
            .expect("live");
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2]["params"]["n"], json!(3));
    }

    #[tokio::test]
    async fn test_backlog_replays_before_mid_enable_arrival() {
        /// Transport whose `send` feeds a live notification back through
        /// the multiplexor while the enable request is still in flight.
        struct MidSendTransport {
            inject: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        }

        #[async_trait]
        impl Transport for MidSendTransport {
            async fn send(&self, _raw: String) -> Result<()> {
                if let Some(inject) = self.inject.lock().take() {
                    inject();
                }
                Ok(())
            }

            fn set_message_handler(&self, _handler: MessageHandler) {}

            fn add_listener(
                &self,
                _event: TransportEvent,
                _handler: LifecycleHandler,
            ) -> SubscriptionId {
                SubscriptionId::generate()
            }

            fn remove_listener(&self, _event: TransportEvent, _id: SubscriptionId) -> bool {
                false
            }
        }

        let transport = Arc::new(MidSendTransport {
            inject: Mutex::new(None),
        });
        let mux = Multiplexor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            MuxConfig::new(),
        );
        let channel = mux.add_channel("test").expect("add channel");
        let (sub, seen) = capture();
        channel.on_message(sub);

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":1}}"#)
            .expect("buffer");

        let mux_inject = Arc::downgrade(&mux);
        *transport.inject.lock() = Some(Box::new(move || {
            if let Some(mux) = mux_inject.upgrade() {
                mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":2}}"#)
                    .expect("inject");
            }
        }));

        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");

        // The notification that arrived while the enable was in flight
        // found the gate still closed, so it buffered and replays after
        // the pre-enable backlog.
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0]["params"]["n"], json!(1));
        assert_eq!(seen[1]["params"]["n"], json!(2));
    }

    #[test]
    #[should_panic(expected = "Tokio 1.x runtime")]
    fn test_first_subscription_outside_runtime_panics() {
        let (_mux, channel) = make_channel();
        let (sub, _seen) = capture();
        channel.on_message(sub);
    }

    #[tokio::test]
    async fn test_second_enable_flushes_nothing() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        channel.on_message(sub);

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("buffer");

        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        assert_eq!(seen.lock().len(), 1);

        channel
            .send(r#"{"id":2,"method":"Network.enable"}"#)
            .await
            .expect("enable again");
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_discards_backlog() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        channel.on_message(sub);

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("buffer");

        // Let the 60s window close.
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        // The backlog is gone for good; enabling delivers nothing...
        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        assert!(seen.lock().is_empty());

        // ...but live delivery for enabled domains still works.
        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("live");
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tombstoned_channel_drops_new_notifications() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        channel.on_message(sub);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        // Arrives after the tombstone, for a never-enabled domain: dropped,
        // not buffered, so a later enable replays nothing.
        mux.on_message(r#"{"method":"Page.loadEventFired","params":{}}"#)
            .expect("drop");
        channel
            .send(r#"{"id":1,"method":"Page.enable"}"#)
            .await
            .expect("enable");
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_subscription_means_no_eviction() {
        let (mux, channel) = make_channel();

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("buffer");

        // No subscriber yet, so no timer runs; the backlog survives
        // arbitrarily long.
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;

        let (sub, seen) = capture();
        channel.on_message(sub);
        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");

        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        let id = channel.on_message(sub);

        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("live");
        assert_eq!(seen.lock().len(), 1);

        assert!(channel.remove_listener(id));
        assert!(!channel.remove_listener(id));

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("live");
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_in_registration_order() {
        let (mux, channel) = make_channel();

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            channel.on_message(Arc::new(move |_: &Value| {
                order.lock().push(tag);
            }));
        }

        channel
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{}}"#)
            .expect("live");

        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_responses_bypass_domain_gate() {
        let (mux, channel) = make_channel();
        let (sub, seen) = capture();
        channel.on_message(sub);

        // No domain enabled; a response still delivers.
        mux.on_message(r#"{"id":30,"result":{}}"#).expect("route");

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["id"], json!(3));
    }
}
