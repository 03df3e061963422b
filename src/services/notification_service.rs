use crate::adapters::store::Store;
use crate::domain::notification::{NewNotification, Notification, NotificationType};
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::Party;
use crate::domain::text;
use crate::error::{AppError, Result};
use crate::services::broadcaster::Broadcaster;
use crate::services::clock::Clock;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    marked_read_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            created_total: meter
                .u64_counter("notifications_created_total")
                .with_description("Notifications stored, by type")
                .build(),
            marked_read_total: meter
                .u64_counter("notifications_marked_read_total")
                .with_description("Notifications moved to read")
                .build(),
        }
    }
}

/// Durable per-recipient notices plus a best-effort push to the recipient's live channel.
#[derive(Clone, Debug)]
pub struct NotificationService {
    store: Arc<dyn Store>,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl NotificationService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, broadcaster: Arc<Broadcaster>, clock: Arc<dyn Clock>) -> Self {
        Self { store, broadcaster, clock, metrics: Metrics::new() }
    }

    /// # Errors
    /// Returns an error if the notification cannot be stored.
    pub async fn notify_new_message(
        &self,
        recipient: Party,
        conversation_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<Notification> {
        self.create(NewNotification {
            recipient,
            conversation_id: Some(conversation_id),
            message_id: Some(message_id),
            notification_type: NotificationType::NewMessage,
            title: "New message".to_string(),
            body: text::notification_body(content),
        })
        .await
    }

    /// # Errors
    /// Returns an error if the notification cannot be stored.
    pub async fn notify_new_conversation(
        &self,
        recipient: Party,
        conversation_id: Uuid,
        title: Option<&str>,
    ) -> Result<Notification> {
        self.create(NewNotification {
            recipient,
            conversation_id: Some(conversation_id),
            message_id: None,
            notification_type: NotificationType::NewConversation,
            title: "New conversation".to_string(),
            body: text::notification_body(title.unwrap_or_default()),
        })
        .await
    }

    /// # Errors
    /// Returns an error if the notification cannot be stored.
    pub async fn notify_order_update(
        &self,
        recipient: Party,
        conversation_id: Option<Uuid>,
        title: &str,
        body: &str,
    ) -> Result<Notification> {
        self.create(NewNotification {
            recipient,
            conversation_id,
            message_id: None,
            notification_type: NotificationType::OrderUpdate,
            title: title.to_string(),
            body: text::notification_body(body),
        })
        .await
    }

    #[tracing::instrument(
        level = "debug",
        err(level = "warn"),
        skip(self, draft),
        fields(recipient = %draft.recipient, notification_type = ?draft.notification_type)
    )]
    async fn create(&self, draft: NewNotification) -> Result<Notification> {
        let notification_type = draft.notification_type;
        let notification = self.store.insert_notification(Notification::new(draft, self.clock.now())).await?;
        self.metrics.created_total.add(1, &[KeyValue::new("type", notification_type.as_str())]);

        self.broadcaster.publish_to_recipient(&notification).await;
        Ok(notification)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if absent, `AppError::AccessDenied` if owned by someone else.
    pub async fn get(&self, id: Uuid, caller: Party) -> Result<Notification> {
        let notification = self.store.find_notification(id).await?.ok_or(AppError::NotFound("Notification"))?;
        if notification.recipient() != caller {
            return Err(AppError::AccessDenied);
        }
        Ok(notification)
    }

    /// Marks one notification read. Already-read notifications keep their first `read_at`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if absent, `AppError::AccessDenied` if owned by someone else.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn mark_read(&self, id: Uuid, caller: Party) -> Result<Notification> {
        let notification = self.get(id, caller).await?;
        if notification.is_read {
            return Ok(notification);
        }
        let notification = self.store.mark_notification_read(id, self.clock.now()).await?;
        self.metrics.marked_read_total.add(1, &[]);
        Ok(notification)
    }

    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn mark_all_read(&self, caller: Party) -> Result<u64> {
        let count = self.store.mark_all_notifications_read(caller, self.clock.now()).await?;
        self.metrics.marked_read_total.add(count, &[]);
        Ok(count)
    }

    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn mark_conversation_read(&self, conversation_id: Uuid, caller: Party) -> Result<u64> {
        let count = self.store.mark_conversation_notifications_read(conversation_id, caller, self.clock.now()).await?;
        self.metrics.marked_read_total.add(count, &[]);
        Ok(count)
    }

    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn clear_all(&self, caller: Party) -> Result<u64> {
        self.store.delete_notifications(caller).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn count_unread(&self, caller: Party) -> Result<u64> {
        self.store.count_unread_notifications(caller).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn list(&self, caller: Party, unread_only: bool, page: PageRequest) -> Result<Page<Notification>> {
        self.store.list_notifications(caller, unread_only, page).await
    }

    /// Deletes notifications that were read before `cutoff`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn purge_read_before(&self, cutoff: OffsetDateTime) -> Result<u64> {
        self.store.purge_read_notifications(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::services::clock::ManualClock;
    use time::Duration;

    fn service() -> (NotificationService, Arc<Broadcaster>, Arc<ManualClock>) {
        let broadcaster = Arc::new(Broadcaster::local(8));
        let clock = Arc::new(ManualClock::default());
        let service = NotificationService::new(
            Arc::new(MemoryStore::new()),
            Arc::clone(&broadcaster),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (service, broadcaster, clock)
    }

    #[tokio::test]
    async fn new_message_notification_is_stored_and_pushed() {
        let (service, broadcaster, _) = service();
        let server = Party::server(2);
        let mut live = broadcaster.subscribe_recipient(server);

        let long = "x".repeat(600);
        let stored = service
            .notify_new_message(server, Uuid::now_v7(), Uuid::now_v7(), &long)
            .await
            .expect("notification stored");

        assert_eq!(stored.body.chars().count(), 500);
        assert!(stored.body.ends_with("..."));
        assert_eq!(live.recv().await.expect("pushed").id, stored.id);
        assert_eq!(service.count_unread(server).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn mutations_are_idempotent_and_owner_only() {
        let (service, _, clock) = service();
        let requester = Party::requester(1);
        let n = service
            .notify_order_update(requester, None, "Order update", "Your order is on its way")
            .await
            .expect("stored");

        assert!(matches!(service.mark_read(n.id, Party::server(1)).await, Err(AppError::AccessDenied)));

        let first = service.mark_read(n.id, requester).await.expect("read");
        clock.advance(Duration::minutes(1));
        let second = service.mark_read(n.id, requester).await.expect("read again");
        assert_eq!(first.read_at, second.read_at);

        assert_eq!(service.mark_all_read(requester).await.expect("all"), 0);
        assert_eq!(service.clear_all(requester).await.expect("clear"), 1);
        assert_eq!(service.clear_all(requester).await.expect("clear again"), 0);
    }

    #[tokio::test]
    async fn conversation_scoped_read_leaves_other_conversations_unread() {
        let (service, _, _) = service();
        let server = Party::server(2);
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        service.notify_new_message(server, a, Uuid::now_v7(), "one").await.expect("a");
        service.notify_new_message(server, b, Uuid::now_v7(), "two").await.expect("b");

        assert_eq!(service.mark_conversation_read(a, server).await.expect("mark"), 1);
        let unread = service.list(server, true, PageRequest::default()).await.expect("list");
        assert_eq!(unread.total, 1);
        assert_eq!(unread.items[0].conversation_id, Some(b));
    }

    #[tokio::test]
    async fn purge_only_removes_old_read_notifications() {
        let (service, _, clock) = service();
        let requester = Party::requester(1);
        let old = service.notify_order_update(requester, None, "t", "old").await.expect("old");
        service.notify_order_update(requester, None, "t", "unread").await.expect("unread");
        service.mark_read(old.id, requester).await.expect("read");

        clock.advance(Duration::days(31));
        let removed = service.purge_read_before(clock.now() - Duration::days(30)).await.expect("purge");
        assert_eq!(removed, 1);
        assert_eq!(service.count_unread(requester).await.expect("count"), 1);
    }
}
