//! Shared-transport owner and message router.
//!
//! The [`Multiplexor`] owns the ordered channel list and the inbound
//! classification path: responses are routed to exactly the channel whose
//! digit is encoded in their `id`, notifications fan out to every
//! channel's domain gate in creation order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{ChannelId, MAX_CHANNELS, RequestId, SubscriptionId};
use crate::protocol::{DEBUGGER_DOMAIN, Envelope};
use crate::transport::{LifecycleHandler, Transport, TransportEvent};

use super::channel::Channel;
use super::config::MuxConfig;
use super::encoding::{decode, encode};

// ============================================================================
// Multiplexor
// ============================================================================

/// Multiplexes one shared transport into up to 10 virtual channels.
///
/// Construction wires the multiplexor in as the transport's message
/// handler; every inbound message flows through [`Multiplexor::on_message`]
/// from then on.
///
/// # Thread Safety
///
/// `Multiplexor` is `Send + Sync`; channel mutation and routing are guarded
/// by short-lived locks, and subscriber callbacks run outside them.
pub struct Multiplexor {
    /// The single shared duplex connection.
    transport: Arc<dyn Transport>,
    /// Configuration (eviction window, Debugger suppression).
    config: MuxConfig,
    /// Channels in creation order; index == channel id. Append-only.
    channels: Mutex<Vec<Arc<Channel>>>,
}

impl Multiplexor {
    /// Creates a multiplexor over `transport`.
    ///
    /// Registers the returned multiplexor as the transport's message
    /// handler (through a weak reference, so dropping the multiplexor
    /// detaches it).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: MuxConfig) -> Arc<Self> {
        let mux = Arc::new(Self {
            transport,
            config,
            channels: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&mux);
        mux.transport.set_message_handler(Box::new(move |raw| {
            weak.upgrade().map_or(Ok(()), |mux| mux.on_message(raw))
        }));

        mux
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Creates a channel named `name`.
    ///
    /// The channel's id is its position in the creation sequence. Channels
    /// cannot be removed; they live as long as the multiplexor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelLimitExceeded`] once 10 channels exist —
    /// the id encoding has room for a single decimal digit.
    pub fn add_channel(self: &Arc<Self>, name: impl Into<String>) -> Result<Arc<Channel>> {
        let mut channels = self.channels.lock();

        let Some(id) = u8::try_from(channels.len())
            .ok()
            .and_then(ChannelId::new)
        else {
            warn!(limit = MAX_CHANNELS, "Channel limit reached");
            return Err(Error::channel_limit(MAX_CHANNELS));
        };

        let channel = Channel::new(
            name,
            id,
            Arc::downgrade(self),
            self.config.evict_after,
        );
        debug!(channel = %channel.name(), %id, "Channel added");
        channels.push(Arc::clone(&channel));

        Ok(channel)
    }

    /// Returns the number of channels created so far.
    #[inline]
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Forwards a channel's request on the shared transport.
    ///
    /// Rewrites `id` to carry the channel digit. Called by
    /// [`Channel::send`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelSentMessageWithoutId`] if the message has
    /// no non-negative integer `id` — only requests flow from channel to
    /// transport.
    pub(crate) async fn send(&self, channel: &Channel, mut message: Value) -> Result<()> {
        let Some(id) = message.get("id").and_then(Value::as_u64) else {
            let payload = message.to_string();
            error!(
                channel = %channel.name(),
                payload = %payload,
                "Channel sent message without id"
            );
            return Err(Error::message_without_id(channel.name(), payload));
        };

        let encoded = encode(RequestId::new(id), channel.id());
        message["id"] = Value::from(encoded.value());

        trace!(channel = %channel.name(), id, %encoded, "Forwarding request");
        self.transport.send(message.to_string()).await
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Classifies and routes one inbound transport message.
    ///
    /// Responses go to exactly the channel encoded in their `id`, with the
    /// consumer's original `id` restored; notifications fan out to every
    /// channel's domain gate in creation order.
    ///
    /// # Errors
    ///
    /// All fatal protocol violations surface here:
    /// [`Error::MalformedMessage`], [`Error::MalformedMethodName`],
    /// [`Error::UnknownChannelForResponse`]. Each is logged with the full
    /// offending payload before being returned.
    pub fn on_message(&self, raw: &str) -> Result<()> {
        let envelope = match Envelope::classify(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(payload = %raw, %err, "Unclassifiable message from transport");
                return Err(err);
            }
        };

        match envelope {
            Envelope::Response { id, mut message } => {
                let (inner_id, channel_id) = decode(id);

                let channel = self.channels.lock().get(channel_id.index()).cloned();
                let Some(channel) = channel else {
                    error!(
                        payload = %raw,
                        %channel_id,
                        "Response decodes to a channel that was never created"
                    );
                    return Err(Error::unknown_channel(channel_id, raw));
                };

                message["id"] = Value::from(inner_id.value());
                trace!(channel = %channel.name(), id = %inner_id, "Routing response");
                channel.deliver(&message);
                Ok(())
            }

            Envelope::Notification { domain, message } => {
                let channels = self.channels.lock().clone();
                for channel in &channels {
                    if self.is_suppressed(channel, &domain) {
                        trace!(
                            channel = %channel.name(),
                            %domain,
                            "Notification suppressed"
                        );
                        continue;
                    }
                    channel.dispatch(&domain, &message);
                }
                Ok(())
            }
        }
    }

    /// Content filter: Debugger notifications are withheld from channels
    /// whose name contains the configured substring.
    fn is_suppressed(&self, channel: &Channel, domain: &str) -> bool {
        domain == DEBUGGER_DOMAIN
            && self
                .config
                .suppress_debugger_for
                .as_deref()
                .is_some_and(|s| !s.is_empty() && channel.name().contains(s))
    }

    // ========================================================================
    // Lifecycle Passthrough
    // ========================================================================

    /// Registers a listener for a transport lifecycle event
    /// (`open`/`close`/`error`). Not multiplexed, not domain-gated.
    pub fn add_transport_listener(
        &self,
        event: TransportEvent,
        handler: LifecycleHandler,
    ) -> SubscriptionId {
        self.transport.add_listener(event, handler)
    }

    /// Removes a transport lifecycle listener.
    pub fn remove_transport_listener(&self, event: TransportEvent, id: SubscriptionId) -> bool {
        self.transport.remove_listener(event, id)
    }
}

impl std::fmt::Debug for Multiplexor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexor")
            .field("channels", &self.channel_count())
            .field("config", &self.config)
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

    use crate::mux::channel::MessageSubscriber;
    use crate::transport::testing::MockTransport;

    fn make_mux(config: MuxConfig) -> (Arc<MockTransport>, Arc<Multiplexor>) {
        let transport = MockTransport::new();
        let mux = Multiplexor::new(Arc::clone(&transport) as Arc<dyn Transport>, config);
        (transport, mux)
    }

    fn capture() -> (MessageSubscriber, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscriber: MessageSubscriber = Arc::new(move |message: &Value| {
            sink.lock().push(message.clone());
        });
        (subscriber, seen)
    }

    #[test]
    fn test_channel_limit() {
        let (_transport, mux) = make_mux(MuxConfig::new());

        for i in 0..MAX_CHANNELS {
            let channel = mux.add_channel(format!("channel-{i}")).expect("add");
            assert_eq!(channel.id().index(), i);
        }
        assert_eq!(mux.channel_count(), MAX_CHANNELS);

        let err = mux.add_channel("one-too-many").unwrap_err();
        assert!(matches!(err, Error::ChannelLimitExceeded { limit: 10 }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_send_rewrites_id() {
        let (transport, mux) = make_mux(MuxConfig::new());
        let _ch0 = mux.add_channel("first").expect("add");
        let ch1 = mux.add_channel("second").expect("add");

        ch1.send(r#"{"id":5,"method":"Network.enable"}"#)
            .await
            .expect("send");

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);

        // id 5 from channel digit 1: 5*10 + 1
        let frame: Value = serde_json::from_str(&sent[0]).expect("parse");
        assert_eq!(frame["id"], json!(51));
        assert_eq!(frame["method"], json!("Network.enable"));
    }

    #[tokio::test]
    async fn test_send_without_id_is_fatal() {
        let (transport, mux) = make_mux(MuxConfig::new());
        let channel = mux.add_channel("tools").expect("add");

        let err = channel
            .send(r#"{"method":"Network.requestWillBeSent"}"#)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ChannelSentMessageWithoutId { .. }));
        assert!(err.is_fatal());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_response_routed_to_owner_only() {
        let (_transport, mux) = make_mux(MuxConfig::new());
        let ch0 = mux.add_channel("first").expect("add");
        let ch1 = mux.add_channel("second").expect("add");

        let (sub0, seen0) = capture();
        let (sub1, seen1) = capture();
        ch0.on_message(sub0);
        ch1.on_message(sub1);

        // Wire id 51 decodes to channel digit 1, original id 5.
        mux.on_message(r#"{"id":51,"result":{"ok":true}}"#)
            .expect("route");

        assert!(seen0.lock().is_empty());

        let seen1 = seen1.lock();
        assert_eq!(seen1.len(), 1);
        assert_eq!(seen1[0]["id"], json!(5));
        assert_eq!(seen1[0]["result"]["ok"], json!(true));
    }

    #[test]
    fn test_response_for_missing_channel_is_fatal() {
        let (_transport, mux) = make_mux(MuxConfig::new());
        let _ch0 = mux.add_channel("only").expect("add");

        let err = mux.on_message(r#"{"id":7,"result":{}}"#).unwrap_err();

        match err {
            Error::UnknownChannelForResponse { channel_id, .. } => {
                assert_eq!(channel_id.value(), 7);
            }
            other => panic!("expected unknown channel error, got {other}"),
        }
    }

    #[test]
    fn test_malformed_inbound_is_fatal() {
        let (_transport, mux) = make_mux(MuxConfig::new());

        let err = mux.on_message(r#"{"params":{}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));

        let err = mux.on_message(r#"{"method":"noDomain"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMethodName { .. }));
    }

    #[tokio::test]
    async fn test_notification_fanout_respects_gates() {
        let (_transport, mux) = make_mux(MuxConfig::new());
        let enabled = mux.add_channel("enabled").expect("add");
        let buffering = mux.add_channel("buffering").expect("add");

        let (sub_a, seen_a) = capture();
        let (sub_b, seen_b) = capture();
        enabled.on_message(sub_a);
        buffering.on_message(sub_b);

        enabled
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");

        mux.on_message(r#"{"method":"Network.requestWillBeSent","params":{"n":1}}"#)
            .expect("fan out");

        // Live on the enabled channel, buffered (not delivered) on the other.
        assert_eq!(seen_a.lock().len(), 1);
        assert!(seen_b.lock().is_empty());

        // Enabling later replays the backlog.
        buffering
            .send(r#"{"id":1,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_debugger_suppression_scenario() {
        let config = MuxConfig::new().suppress_debugger_for("tools");
        let (_transport, mux) = make_mux(config);

        let debugger = mux.add_channel("debugger").expect("add");
        let tools = mux.add_channel("tools").expect("add");

        let (sub_d, seen_d) = capture();
        let (sub_t, seen_t) = capture();
        debugger.on_message(sub_d);
        tools.on_message(sub_t);

        debugger
            .send(r#"{"id":1,"method":"Debugger.enable"}"#)
            .await
            .expect("enable");
        tools
            .send(r#"{"id":1,"method":"Debugger.enable"}"#)
            .await
            .expect("enable");

        mux.on_message(r#"{"method":"Debugger.paused","params":{}}"#)
            .expect("fan out");

        // Delivered to "debugger", withheld from "tools" despite the enable.
        assert_eq!(seen_d.lock().len(), 1);
        assert!(seen_t.lock().is_empty());

        // Suppression is Debugger-only; other domains flow to "tools".
        tools
            .send(r#"{"id":2,"method":"Network.enable"}"#)
            .await
            .expect("enable");
        mux.on_message(r#"{"method":"Network.loadingFinished","params":{}}"#)
            .expect("fan out");
        assert_eq!(seen_t.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_suppression_does_not_buffer_either() {
        let config = MuxConfig::new().suppress_debugger_for("tools");
        let (_transport, mux) = make_mux(config);
        let tools = mux.add_channel("tools").expect("add");

        let (sub, seen) = capture();
        tools.on_message(sub);

        // Not enabled yet; a suppressed notification must not land in the
        // buffer to be replayed by a later enable.
        mux.on_message(r#"{"method":"Debugger.paused","params":{}}"#)
            .expect("fan out");
        tools
            .send(r#"{"id":1,"method":"Debugger.enable"}"#)
            .await
            .expect("enable");

        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_transport_listener_passthrough() {
        let (transport, mux) = make_mux(MuxConfig::new());

        let fired = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&fired);
        let id = mux.add_transport_listener(
            TransportEvent::Close,
            Arc::new(move |detail: &str| {
                sink.lock().push(detail.to_string());
            }),
        );

        transport.emit(TransportEvent::Close, "remote close");
        assert_eq!(*fired.lock(), vec!["remote close".to_string()]);

        assert!(mux.remove_transport_listener(TransportEvent::Close, id));
        transport.emit(TransportEvent::Close, "again");
        assert_eq!(fired.lock().len(), 1);
    }
}
