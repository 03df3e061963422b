use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus};
use crate::domain::message::{Message, ReceiptOutcome};
use crate::domain::notification::Notification;
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind};
use crate::error::Result;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// A conversation's first message, stored in the same transaction as the conversation.
#[derive(Debug, Clone)]
pub struct Opening {
    pub message: Message,
    pub preview: String,
}

#[derive(Debug, Clone)]
pub struct Opened {
    pub conversation: Conversation,
    /// `false` when an existing order conversation was returned instead.
    pub created: bool,
    pub message: Option<Message>,
}

/// Transactional persistence for conversations, messages and notifications.
///
/// Every method that touches a conversation's counters or its messages' statuses is a
/// single atomic unit serialized on the conversation record. Soft-deleted messages are
/// never returned by the read methods.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<()>;

    /// Inserts a conversation together with its optional first message. When it carries an
    /// order id and a conversation for the same (requester, server, order) already exists,
    /// that one is returned untouched and `opening` is discarded.
    async fn insert_conversation(&self, conversation: Conversation, opening: Option<Opening>) -> Result<Opened>;

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    async fn find_conversation_by_order(
        &self,
        requester_id: i64,
        server_id: i64,
        order_id: i64,
    ) -> Result<Option<Conversation>>;

    async fn update_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        at: OffsetDateTime,
    ) -> Result<Conversation>;

    async fn assign_agent(&self, id: Uuid, agent_id: Option<i64>, at: OffsetDateTime) -> Result<Conversation>;

    /// Conversations where `party` participates, most recently updated first.
    async fn list_conversations(
        &self,
        party: Party,
        filter: &ConversationFilter,
        page: PageRequest,
    ) -> Result<Page<Conversation>>;

    async fn increment_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation>;

    async fn reset_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation>;

    async fn update_last_message(&self, id: Uuid, preview: &str, at: OffsetDateTime) -> Result<Conversation>;

    /// Persists a message, bumps the unread counter of every side it counts for and
    /// updates the preview, all in one transaction.
    async fn append_message(&self, message: Message, preview: String) -> Result<(Message, Conversation)>;

    /// Moves every `SENT` message not from `reader_side` to `DELIVERED`.
    async fn mark_delivered(
        &self,
        conversation_id: Uuid,
        reader_side: PartyKind,
        at: OffsetDateTime,
    ) -> Result<ReceiptOutcome>;

    /// Moves every unread message not from the reader's side to `READ`, resets the reader's
    /// counter and marks the reader's notifications for the conversation read.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader: Party,
        at: OffsetDateTime,
    ) -> Result<(ReceiptOutcome, Conversation)>;

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>>;

    /// Replaces the content of a live message. A deleted message is `NotFound`.
    async fn update_message_content(&self, id: Uuid, content: &str, edited_at: OffsetDateTime) -> Result<Message>;

    /// Flags a message deleted. A message that was still unread is taken off the counters.
    /// Deleting an already deleted message only widens its scope to everyone.
    async fn soft_delete_message(&self, id: Uuid, for_everyone: bool) -> Result<(Message, Conversation)>;

    /// Newest-first page of a conversation's messages.
    async fn list_messages_newest_first(&self, conversation_id: Uuid, page: PageRequest) -> Result<Page<Message>>;

    /// Oldest-first messages, optionally only those sent strictly after `after`.
    async fn list_messages(&self, conversation_id: Uuid, after: Option<OffsetDateTime>) -> Result<Vec<Message>>;

    /// Case-insensitive substring search, newest first.
    async fn search_messages(&self, conversation_id: Uuid, query: &str, page: PageRequest) -> Result<Page<Message>>;

    async fn insert_notification(&self, notification: Notification) -> Result<Notification>;

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>>;

    async fn mark_notification_read(&self, id: Uuid, at: OffsetDateTime) -> Result<Notification>;

    async fn mark_all_notifications_read(&self, recipient: Party, at: OffsetDateTime) -> Result<u64>;

    async fn mark_conversation_notifications_read(
        &self,
        conversation_id: Uuid,
        recipient: Party,
        at: OffsetDateTime,
    ) -> Result<u64>;

    async fn delete_notifications(&self, recipient: Party) -> Result<u64>;

    async fn count_unread_notifications(&self, recipient: Party) -> Result<u64>;

    async fn list_notifications(
        &self,
        recipient: Party,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>>;

    /// Removes notifications read before `read_before`.
    async fn purge_read_notifications(&self, read_before: OffsetDateTime) -> Result<u64>;
}
