use crate::adapters::store::{Opening, Store};
use crate::config::{MessagingConfig, StatusPolicy};
use crate::domain::conversation::{Conversation, ConversationStatus};
use crate::domain::event::{EventEnvelope, EventType, ReadReceipt};
use crate::domain::message::{Message, MessageStatus, MessageType, NewMessage, ReceiptOutcome};
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind, SenderKind};
use crate::domain::text;
use crate::error::{AppError, Result};
use crate::services::access_guard;
use crate::services::ChatCore;
use crate::services::broadcaster::Broadcaster;
use crate::services::clock::Clock;
use crate::services::notification_service::NotificationService;
use crate::services::ordering::OrderingGate;
use crate::services::retry::StoreRetry;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Sender id stamped on messages authored by the platform itself.
pub const SYSTEM_SENDER_ID: i64 = 0;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    receipts_total: Counter<u64>,
    edits_total: Counter<u64>,
    deletes_total: Counter<u64>,
    fanout_failures_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            sent_total: meter
                .u64_counter("messages_sent_total")
                .with_description("Messages persisted, by sender kind")
                .build(),
            receipts_total: meter
                .u64_counter("message_receipts_total")
                .with_description("Messages moved to DELIVERED or READ")
                .build(),
            edits_total: meter.u64_counter("message_edits_total").with_description("Messages edited").build(),
            deletes_total: meter
                .u64_counter("message_deletes_total")
                .with_description("Messages soft-deleted, by scope")
                .build(),
            fanout_failures_total: meter
                .u64_counter("message_fanout_failures_total")
                .with_description("Notifications that could not be created after a committed send")
                .build(),
        }
    }
}

/// A message as submitted by a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), message_type: MessageType::Text, attachment_url: None }
    }
}

#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn Store>,
    broadcaster: Arc<Broadcaster>,
    notifications: NotificationService,
    gate: Arc<OrderingGate>,
    retry: StoreRetry,
    clock: Arc<dyn Clock>,
    config: MessagingConfig,
    status_policy: StatusPolicy,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        core: ChatCore,
        notifications: NotificationService,
        config: MessagingConfig,
        status_policy: StatusPolicy,
    ) -> Self {
        let ChatCore { store, broadcaster, gate, retry, clock } = core;
        Self { store, broadcaster, notifications, gate, retry, clock, config, status_policy, metrics: Metrics::new() }
    }

    /// Persists a participant's message, bumps the other side's unread counter and the
    /// preview in the same store transaction, then fans out.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for blank or oversized content,
    /// `AppError::NotFound` if the conversation does not exist,
    /// `AppError::AccessDenied` if `sender` is not a participant,
    /// `AppError::InvalidStatusTransition` for an archived conversation under the strict policy.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, outgoing),
        fields(sender = %sender, message_id = tracing::field::Empty)
    )]
    pub async fn send(&self, conversation_id: Uuid, sender: Party, outgoing: OutgoingMessage) -> Result<Message> {
        let draft = self.draft(conversation_id, sender, outgoing)?;
        let (message, conversation) = self.append(draft, Some(&sender)).await?;
        tracing::Span::current().record("message_id", tracing::field::display(message.id));

        self.notify_recipient(&message, &conversation, sender).await;
        Ok(message)
    }

    /// Checks a participant's message and shapes it for storage. Nothing is written.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for blank or oversized content or a participant
    /// posing as the system.
    pub(crate) fn draft(&self, conversation_id: Uuid, sender: Party, outgoing: OutgoingMessage) -> Result<NewMessage> {
        if outgoing.message_type == MessageType::SystemNotification {
            return Err(AppError::Validation("system notifications cannot be sent by participants".into()));
        }
        self.validate_content(&outgoing.content, outgoing.attachment_url.is_some())?;

        Ok(NewMessage {
            conversation_id,
            sender_id: sender.id,
            sender_kind: sender.kind.into(),
            content: outgoing.content,
            message_type: outgoing.message_type,
            attachment_url: outgoing.attachment_url,
        })
    }

    /// Stamps a draft with the current time and derives its preview. Call it under the
    /// conversation's gate so timestamps follow commit order.
    pub(crate) fn compose(&self, draft: NewMessage) -> Opening {
        let message = Message::new(draft, self.clock.now());
        let preview = text::preview(&summary(&message));
        Opening { message, preview }
    }

    /// Announces a committed participant message to the conversation topic.
    pub(crate) async fn publish_new(&self, message: &Message) {
        self.metrics.sent_total.add(1, &[KeyValue::new("sender_kind", message.sender_kind.as_str())]);
        self.broadcaster.publish_to_conversation(EventEnvelope::message(EventType::NewMessage, message, message.sent_at)).await;
    }

    /// Best-effort: the message is already committed, so a failure is only logged.
    pub(crate) async fn notify_recipient(&self, message: &Message, conversation: &Conversation, sender: Party) {
        let recipient = conversation.party(sender.kind.other());
        if let Err(e) =
            self.notifications.notify_new_message(recipient, conversation.id, message.id, &summary(message)).await
        {
            tracing::warn!(error = %e, "Failed to create new-message notification");
            self.metrics.fanout_failures_total.add(1, &[]);
        }
    }

    /// Posts a platform message. It counts as unread for both sides.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for blank or oversized content,
    /// `AppError::NotFound` if the conversation does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self, content))]
    pub async fn send_system(&self, conversation_id: Uuid, content: String) -> Result<Message> {
        self.validate_content(&content, false)?;

        let draft = NewMessage {
            conversation_id,
            sender_id: SYSTEM_SENDER_ID,
            sender_kind: SenderKind::System,
            content,
            message_type: MessageType::SystemNotification,
            attachment_url: None,
        };
        let (message, conversation) = self.append(draft, None).await?;

        for recipient in [conversation.party(PartyKind::Requester), conversation.party(PartyKind::Server)] {
            if let Err(e) = self
                .notifications
                .notify_order_update(recipient, Some(conversation.id), "Order update", &message.content)
                .await
            {
                tracing::warn!(error = %e, recipient = %recipient, "Failed to create order-update notification");
                self.metrics.fanout_failures_total.add(1, &[]);
            }
        }
        Ok(message)
    }

    async fn append(&self, draft: NewMessage, sender: Option<&Party>) -> Result<(Message, Conversation)> {
        let _turn = self.gate.enter(draft.conversation_id).await;

        let conversation = self.load_conversation(draft.conversation_id).await?;
        if let Some(sender) = sender {
            access_guard::authorize(&conversation, sender)?;
        }
        if self.status_policy == StatusPolicy::Strict && conversation.status == ConversationStatus::Archived {
            return Err(AppError::InvalidStatusTransition("ARCHIVED conversations take no new messages".into()));
        }

        let Opening { message, preview } = self.compose(draft);
        let store = &self.store;
        let (message, conversation) = self
            .retry
            .run("append_message", move || store.append_message(message.clone(), preview.clone()))
            .await?;

        self.publish_new(&message).await;
        Ok((message, conversation))
    }

    /// One page of history. Paging runs newest-first; the page itself is returned oldest-first.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    pub async fn list_page(&self, conversation_id: Uuid, viewer: Party, page: PageRequest) -> Result<Page<Message>> {
        self.authorized(conversation_id, &viewer).await?;
        let mut page = self
            .store
            .list_messages_newest_first(conversation_id, page.clamped(self.config.max_page_size))
            .await?;
        page.items.reverse();
        Ok(page)
    }

    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    pub async fn list_all(&self, conversation_id: Uuid, viewer: Party) -> Result<Vec<Message>> {
        self.authorized(conversation_id, &viewer).await?;
        self.store.list_messages(conversation_id, None).await
    }

    /// Every live message sent strictly after `after`, oldest first. Used to resync after a gap.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    pub async fn list_after(&self, conversation_id: Uuid, viewer: Party, after: OffsetDateTime) -> Result<Vec<Message>> {
        self.authorized(conversation_id, &viewer).await?;
        self.store.list_messages(conversation_id, Some(after)).await
    }

    /// Moves the other side's `SENT` messages to `DELIVERED`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(reader = %reader))]
    pub async fn mark_delivered(&self, conversation_id: Uuid, reader: Party) -> Result<ReceiptOutcome> {
        let _turn = self.gate.enter(conversation_id).await;
        self.authorized(conversation_id, &reader).await?;

        let at = self.clock.now();
        let store = &self.store;
        let outcome = self
            .retry
            .run("mark_delivered", move || store.mark_delivered(conversation_id, reader.kind, at))
            .await?;

        if !outcome.message_ids.is_empty() {
            self.publish_receipt(conversation_id, reader, MessageStatus::Delivered, &outcome, at).await;
        }
        Ok(outcome)
    }

    /// Moves the other side's unread messages to `READ`, resets the reader's counter and
    /// marks the reader's notifications for the conversation read, atomically.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(reader = %reader))]
    pub async fn mark_read(&self, conversation_id: Uuid, reader: Party) -> Result<ReceiptOutcome> {
        let _turn = self.gate.enter(conversation_id).await;
        self.authorized(conversation_id, &reader).await?;

        let at = self.clock.now();
        let store = &self.store;
        let (outcome, _) =
            self.retry.run("mark_read", move || store.mark_read(conversation_id, reader, at)).await?;

        if !outcome.message_ids.is_empty() {
            self.publish_receipt(conversation_id, reader, MessageStatus::Read, &outcome, at).await;
        }
        Ok(outcome)
    }

    async fn publish_receipt(
        &self,
        conversation_id: Uuid,
        reader: Party,
        status: MessageStatus,
        outcome: &ReceiptOutcome,
        at: OffsetDateTime,
    ) {
        let count = outcome.message_ids.len() as u64;
        self.metrics.receipts_total.add(count, &[KeyValue::new("status", status.as_str())]);

        let event_type = if status == MessageStatus::Read { EventType::MessageRead } else { EventType::MessageDelivered };
        let receipt = ReadReceipt { reader, status, message_ids: outcome.message_ids.clone(), at };
        self.broadcaster.publish_to_conversation(EventEnvelope::receipt(conversation_id, event_type, receipt)).await;
    }

    /// Replaces the content of the editor's own message within the edit window.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message is absent or deleted,
    /// `AppError::AccessDenied` unless `editor` wrote it,
    /// `AppError::EditWindowExpired` once the window has passed.
    #[tracing::instrument(err(level = "warn"), skip(self, content), fields(editor = %editor))]
    pub async fn edit(&self, message_id: Uuid, editor: Party, content: String) -> Result<Message> {
        self.validate_content(&content, false)?;

        let conversation_id = self.load_message(message_id).await?.conversation_id;
        let _turn = self.gate.enter(conversation_id).await;
        // Re-read under the gate: a delete may have committed while we waited.
        let existing = self.load_message(message_id).await?;

        if !existing.is_authored_by(&editor) {
            return Err(AppError::AccessDenied);
        }
        let now = self.clock.now();
        let window = Duration::seconds(self.config.edit_window_secs);
        if !existing.within_window(window, now) {
            return Err(AppError::EditWindowExpired(window.whole_minutes()));
        }

        let store = &self.store;
        let content = content.as_str();
        let edited =
            self.retry.run("update_message_content", move || store.update_message_content(message_id, content, now)).await?;

        self.metrics.edits_total.add(1, &[]);
        self.broadcaster.publish_to_conversation(EventEnvelope::message(EventType::MessageEdited, &edited, now)).await;
        Ok(edited)
    }

    /// Soft-deletes the caller's own message. Deleting for everyone is limited to the delete
    /// window; deleting for oneself is not. Repeating a delete is a no-op, except that a
    /// message deleted for oneself can still be deleted for everyone.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message is absent,
    /// `AppError::AccessDenied` unless `caller` wrote it,
    /// `AppError::DeleteWindowExpired` for a late delete-for-everyone.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn delete(&self, message_id: Uuid, caller: Party, for_everyone: bool) -> Result<()> {
        let conversation_id = self.find_message(message_id).await?.conversation_id;
        let _turn = self.gate.enter(conversation_id).await;
        let existing = self.find_message(message_id).await?;

        if !existing.is_authored_by(&caller) {
            return Err(AppError::AccessDenied);
        }
        let now = self.clock.now();
        let window = Duration::seconds(self.config.delete_window_secs);
        if for_everyone && !existing.within_window(window, now) {
            return Err(AppError::DeleteWindowExpired(window.whole_minutes()));
        }
        if existing.is_deleted && (existing.deleted_for_everyone || !for_everyone) {
            return Ok(());
        }

        let store = &self.store;
        let (deleted, _) =
            self.retry.run("soft_delete_message", move || store.soft_delete_message(message_id, for_everyone)).await?;

        let scope = if for_everyone { "everyone" } else { "self" };
        self.metrics.deletes_total.add(1, &[KeyValue::new("scope", scope)]);
        self.broadcaster.publish_to_conversation(EventEnvelope::message(EventType::MessageDeleted, &deleted, now)).await;
        Ok(())
    }

    /// Case-insensitive content search over live messages, newest first.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for a blank query, `AppError::NotFound` or `AppError::AccessDenied`.
    pub async fn search(
        &self,
        conversation_id: Uuid,
        viewer: Party,
        query: &str,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("search query must not be blank".into()));
        }
        self.authorized(conversation_id, &viewer).await?;
        self.store.search_messages(conversation_id, query, page.clamped(self.config.max_page_size)).await
    }

    /// Publishes a typing indicator. Nothing is stored.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` or `AppError::AccessDenied`.
    pub async fn typing(&self, conversation_id: Uuid, party: Party, is_typing: bool) -> Result<()> {
        self.authorized(conversation_id, &party).await?;
        self.broadcaster
            .publish_to_conversation(EventEnvelope::typing(conversation_id, party, is_typing, self.clock.now()))
            .await;
        Ok(())
    }

    async fn load_conversation(&self, id: Uuid) -> Result<Conversation> {
        self.store.find_conversation(id).await?.ok_or(AppError::NotFound("Conversation"))
    }

    async fn authorized(&self, conversation_id: Uuid, caller: &Party) -> Result<Conversation> {
        let conversation = self.load_conversation(conversation_id).await?;
        access_guard::authorize(&conversation, caller)?;
        Ok(conversation)
    }

    async fn find_message(&self, id: Uuid) -> Result<Message> {
        self.store.find_message(id).await?.ok_or(AppError::NotFound("Message"))
    }

    async fn load_message(&self, id: Uuid) -> Result<Message> {
        match self.store.find_message(id).await? {
            Some(message) if !message.is_deleted => Ok(message),
            _ => Err(AppError::NotFound("Message")),
        }
    }

    fn validate_content(&self, content: &str, has_attachment: bool) -> Result<()> {
        if content.trim().is_empty() && !has_attachment {
            return Err(AppError::Validation("message content must not be blank".into()));
        }
        let max = self.config.max_content_chars;
        if content.chars().count() > max {
            return Err(AppError::Validation(format!("message content exceeds {max} characters")));
        }
        Ok(())
    }
}

/// Text used for previews and notification bodies; attachments without a caption show their type.
fn summary(message: &Message) -> String {
    if message.content.trim().is_empty() { format!("[{}]", message.message_type) } else { message.content.clone() }
}
