use crate::adapters::redis::{PubSubMessage, RedisClient};
use crate::domain::event::EventEnvelope;
use crate::domain::notification::Notification;
use crate::domain::party::Party;
use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

const CONVERSATION_PREFIX: &str = "chat:conversation:";
const RECIPIENT_PREFIX: &str = "chat:recipient:";
const CHANNEL_PATTERN: &str = "chat:*";

#[derive(Clone, Debug)]
struct Metrics {
    publishes_total: Counter<u64>,
    received_total: Counter<u64>,
    unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
    gc_duration_seconds: Histogram<f64>,
    gc_reclaimed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            publishes_total: meter
                .u64_counter("broadcast_publishes_total")
                .with_description("Live events published, by target and outcome")
                .build(),
            received_total: meter
                .u64_counter("broadcast_relay_received_total")
                .with_description("Events received from the pubsub relay")
                .build(),
            unrouted_total: meter
                .u64_counter("broadcast_unrouted_total")
                .with_description("Events with no local subscribers")
                .build(),
            active_channels: meter
                .i64_up_down_counter("broadcast_active_channels")
                .with_description("Number of live local channels")
                .build(),
            gc_duration_seconds: meter
                .f64_histogram("broadcast_gc_duration_seconds")
                .with_description("Time taken to perform a single GC iteration")
                .build(),
            gc_reclaimed_total: meter
                .u64_counter("broadcast_gc_reclaimed_total")
                .with_description("Total number of idle channels reclaimed by GC")
                .build(),
        }
    }
}

type ConversationChannels = DashMap<Uuid, broadcast::Sender<Arc<EventEnvelope>>>;
type RecipientChannels = DashMap<Party, broadcast::Sender<Arc<Notification>>>;

/// Best-effort live fan-out to conversation topics and private recipient channels.
///
/// Nothing is queued for absent subscribers. With a relay every event goes through
/// Redis and comes back via the pattern listener, so all nodes see it; otherwise it
/// is dispatched to local channels directly.
#[derive(Debug)]
pub struct Broadcaster {
    conversations: Arc<ConversationChannels>,
    recipients: Arc<RecipientChannels>,
    relay: Option<Arc<RedisClient>>,
    capacity: usize,
    metrics: Metrics,
}

impl Broadcaster {
    #[must_use]
    pub fn local(capacity: usize) -> Self {
        Self {
            conversations: Arc::new(DashMap::new()),
            recipients: Arc::new(DashMap::new()),
            relay: None,
            capacity: capacity.max(1),
            metrics: Metrics::new(),
        }
    }

    /// Creates a broadcaster that relays through Redis and starts the dispatcher task.
    ///
    /// # Errors
    /// Returns an error if the pattern subscription fails.
    pub async fn with_relay(
        relay: Arc<RedisClient>,
        capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        let mut broadcaster = Self::local(capacity);
        let mut pubsub_rx = relay.subscribe(CHANNEL_PATTERN).await?;
        broadcaster.relay = Some(relay);

        let conversations = Arc::clone(&broadcaster.conversations);
        let recipients = Arc::clone(&broadcaster.recipients);
        let metrics = broadcaster.metrics.clone();
        let mut shutdown = shutdown;

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        msg = pubsub_rx.recv() => match msg {
                            Ok(msg) => route_relayed(&msg, &conversations, &recipients, &metrics),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!(missed = n, "Broadcast relay dispatcher lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
            .instrument(tracing::info_span!("broadcast_dispatcher")),
        );

        Ok(broadcaster)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn subscribe_conversation(&self, conversation_id: Uuid) -> broadcast::Receiver<Arc<EventEnvelope>> {
        self.conversations
            .entry(conversation_id)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[KeyValue::new("target", "conversation")]);
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn subscribe_recipient(&self, recipient: Party) -> broadcast::Receiver<Arc<Notification>> {
        self.recipients
            .entry(recipient)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[KeyValue::new("target", "recipient")]);
                broadcast::channel(self.capacity).0
            })
            .subscribe()
    }

    /// Delivers an event to the conversation's live subscribers. Failures are logged.
    #[tracing::instrument(
        level = "debug",
        skip(self, event),
        fields(conversation_id = %event.conversation_id, event_type = ?event.event_type)
    )]
    pub async fn publish_to_conversation(&self, event: EventEnvelope) {
        let event = Arc::new(event);
        if let Some(relay) = &self.relay {
            let channel = format!("{CONVERSATION_PREFIX}{}", event.conversation_id);
            match serde_json::to_vec(event.as_ref()) {
                Ok(payload) => match relay.publish(&channel, payload).await {
                    Ok(()) => {
                        self.record_publish("conversation", "relayed");
                        return;
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to relay conversation event, delivering locally"),
                },
                Err(e) => tracing::error!(error = %e, "Failed to encode conversation event"),
            }
        }
        dispatch_conversation(&self.conversations, event, &self.metrics);
        self.record_publish("conversation", "local");
    }

    /// Pushes a notification to its recipient's private channel. Failures are logged.
    #[tracing::instrument(
        level = "debug",
        skip(self, notification),
        fields(notification_id = %notification.id, recipient = %notification.recipient())
    )]
    pub async fn publish_to_recipient(&self, notification: &Notification) {
        let notification = Arc::new(notification.clone());
        if let Some(relay) = &self.relay {
            let channel = recipient_channel(notification.recipient());
            match serde_json::to_vec(notification.as_ref()) {
                Ok(payload) => match relay.publish(&channel, payload).await {
                    Ok(()) => {
                        self.record_publish("recipient", "relayed");
                        return;
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to relay notification, delivering locally"),
                },
                Err(e) => tracing::error!(error = %e, "Failed to encode notification"),
            }
        }
        dispatch_recipient(&self.recipients, notification, &self.metrics);
        self.record_publish("recipient", "local");
    }

    /// Removes channels that no longer have receivers. Returns how many were reclaimed.
    pub fn perform_gc(&self) -> u64 {
        let start = std::time::Instant::now();
        let mut reclaimed = 0u64;

        self.conversations.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[KeyValue::new("target", "conversation")]);
                reclaimed += 1;
            }
            active
        });
        self.recipients.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[KeyValue::new("target", "recipient")]);
                reclaimed += 1;
            }
            active
        });

        self.metrics.gc_duration_seconds.record(start.elapsed().as_secs_f64(), &[]);
        if reclaimed > 0 {
            self.metrics.gc_reclaimed_total.add(reclaimed, &[]);
        }
        reclaimed
    }

    #[must_use]
    pub fn active_channels(&self) -> usize {
        self.conversations.len() + self.recipients.len()
    }

    #[must_use]
    pub const fn is_relayed(&self) -> bool {
        self.relay.is_some()
    }

    fn record_publish(&self, target: &'static str, status: &'static str) {
        self.metrics.publishes_total.add(1, &[KeyValue::new("target", target), KeyValue::new("status", status)]);
    }
}

fn recipient_channel(recipient: Party) -> String {
    format!("{RECIPIENT_PREFIX}{}:{}", recipient.kind, recipient.id)
}

fn parse_recipient(suffix: &str) -> Option<Party> {
    let (kind, id) = suffix.split_once(':')?;
    Some(Party::new(id.parse().ok()?, kind.parse().ok()?))
}

fn dispatch_conversation(channels: &ConversationChannels, event: Arc<EventEnvelope>, metrics: &Metrics) {
    match channels.get(&event.conversation_id) {
        // A send error only means every receiver has gone away since the lookup.
        Some(tx) => {
            let _ = tx.send(event);
        }
        None => metrics.unrouted_total.add(1, &[KeyValue::new("target", "conversation")]),
    }
}

fn dispatch_recipient(channels: &RecipientChannels, notification: Arc<Notification>, metrics: &Metrics) {
    match channels.get(&notification.recipient()) {
        Some(tx) => {
            let _ = tx.send(notification);
        }
        None => metrics.unrouted_total.add(1, &[KeyValue::new("target", "recipient")]),
    }
}

fn route_relayed(
    msg: &PubSubMessage,
    conversations: &ConversationChannels,
    recipients: &RecipientChannels,
    metrics: &Metrics,
) {
    if msg.channel.starts_with(CONVERSATION_PREFIX) {
        match serde_json::from_slice::<EventEnvelope>(&msg.payload) {
            Ok(event) => {
                metrics.received_total.add(1, &[KeyValue::new("target", "conversation")]);
                dispatch_conversation(conversations, Arc::new(event), metrics);
            }
            Err(e) => tracing::warn!(error = %e, channel = %msg.channel, "Dropping malformed relayed event"),
        }
    } else if let Some(suffix) = msg.channel.strip_prefix(RECIPIENT_PREFIX) {
        match (parse_recipient(suffix), serde_json::from_slice::<Notification>(&msg.payload)) {
            (Some(recipient), Ok(notification)) if notification.recipient() == recipient => {
                metrics.received_total.add(1, &[KeyValue::new("target", "recipient")]);
                dispatch_recipient(recipients, Arc::new(notification), metrics);
            }
            _ => tracing::warn!(channel = %msg.channel, "Dropping malformed relayed notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::{NewNotification, NotificationType};
    use crate::domain::party::PartyKind;
    use time::OffsetDateTime;

    fn typing(conversation_id: Uuid) -> EventEnvelope {
        EventEnvelope::typing(conversation_id, Party::requester(1), true, OffsetDateTime::now_utc())
    }

    #[tokio::test]
    async fn events_reach_only_their_conversation() {
        let broadcaster = Broadcaster::local(8);
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut rx_a = broadcaster.subscribe_conversation(a);
        let mut rx_b = broadcaster.subscribe_conversation(b);

        broadcaster.publish_to_conversation(typing(a)).await;

        assert_eq!(rx_a.recv().await.expect("event").conversation_id, a);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let broadcaster = Broadcaster::local(8);
        broadcaster.publish_to_conversation(typing(Uuid::now_v7())).await;
        assert_eq!(broadcaster.active_channels(), 0);
    }

    #[tokio::test]
    async fn recipient_channels_are_keyed_by_kind_and_id() {
        let broadcaster = Broadcaster::local(8);
        let mut server = broadcaster.subscribe_recipient(Party::server(5));
        let mut requester = broadcaster.subscribe_recipient(Party::requester(5));

        let notification = Notification::new(
            NewNotification {
                recipient: Party::server(5),
                conversation_id: None,
                message_id: None,
                notification_type: NotificationType::OrderUpdate,
                title: "Order update".into(),
                body: "Ready".into(),
            },
            OffsetDateTime::now_utc(),
        );
        broadcaster.publish_to_recipient(&notification).await;

        assert_eq!(server.recv().await.expect("notification").recipient_kind, PartyKind::Server);
        assert!(requester.try_recv().is_err());
    }

    #[tokio::test]
    async fn gc_reclaims_channels_without_receivers() {
        let broadcaster = Broadcaster::local(8);
        let kept = broadcaster.subscribe_conversation(Uuid::now_v7());
        drop(broadcaster.subscribe_conversation(Uuid::now_v7()));
        drop(broadcaster.subscribe_recipient(Party::requester(1)));

        assert_eq!(broadcaster.perform_gc(), 2);
        assert_eq!(broadcaster.active_channels(), 1);
        drop(kept);
    }

    #[test]
    fn recipient_channel_names_round_trip() {
        let party = Party::server(42);
        let channel = recipient_channel(party);
        assert_eq!(channel, "chat:recipient:SERVER:42");
        assert_eq!(parse_recipient(channel.trim_start_matches(RECIPIENT_PREFIX)), Some(party));
    }
}
