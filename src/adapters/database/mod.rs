pub mod conversation_repo;
pub mod message_repo;
pub mod notification_repo;
pub mod records;

use crate::adapters::store::{Opened, Opening, Store};
use crate::config::DatabaseConfig;
use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus};
use crate::domain::message::{Message, MessageStatus, ReceiptOutcome};
use crate::domain::notification::Notification;
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind, SenderKind};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use conversation_repo::ConversationRepository;
use message_repo::MessageRepository;
use notification_repo::NotificationRepository;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if no URL is configured or the connection fails.
pub async fn init_pool(config: &DatabaseConfig) -> std::result::Result<DbPool, sqlx::Error> {
    let url = config.url.as_deref().ok_or_else(|| sqlx::Error::Configuration("database url is not set".into()))?;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url)
        .await
}

/// Applies the embedded schema migrations.
///
/// # Errors
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}

/// Postgres-backed store. Counter and status mutations lock the conversation row first,
/// so concurrent writers to one conversation are serialized by the database.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: DbPool,
    conversations: ConversationRepository,
    messages: MessageRepository,
    notifications: NotificationRepository,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self {
            pool,
            conversations: ConversationRepository::new(),
            messages: MessageRepository::new(),
            notifications: NotificationRepository::new(),
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn count_deltas(sender_kind: SenderKind, delta: i64) -> (i64, i64) {
    let requester = if sender_kind.counts_for(PartyKind::Requester) { delta } else { 0 };
    let server = if sender_kind.counts_for(PartyKind::Server) { delta } else { 0 };
    (requester, server)
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_conversation(&self, conversation: Conversation, opening: Option<Opening>) -> Result<Opened> {
        let mut tx = self.pool.begin().await?;

        let Some(created) = self.conversations.insert(&mut tx, &conversation).await? else {
            tx.rollback().await?;
            let order_id =
                conversation.order_id.ok_or_else(|| AppError::Internal("insert skipped without order".into()))?;
            let mut conn = self.pool.acquire().await?;
            let existing = self
                .conversations
                .find_by_order(&mut conn, conversation.requester_id, conversation.server_id, order_id)
                .await?
                .ok_or(AppError::NotFound("Conversation"))?;
            return Ok(Opened { conversation: existing, created: false, message: None });
        };

        let opened = match opening {
            Some(Opening { message, preview }) => {
                let message = self.messages.create(&mut tx, &message).await?;
                let (requester, server) = count_deltas(message.sender_kind, 1);
                self.conversations.adjust_unread(&mut tx, created.id, requester, server).await?;
                let conversation =
                    self.conversations.set_last_message(&mut tx, created.id, &preview, message.sent_at).await?;
                Opened { conversation, created: true, message: Some(message) }
            }
            None => Opened { conversation: created, created: true, message: None },
        };

        tx.commit().await?;
        Ok(opened)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.find(&mut conn, id).await
    }

    async fn find_conversation_by_order(
        &self,
        requester_id: i64,
        server_id: i64,
        order_id: i64,
    ) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.find_by_order(&mut conn, requester_id, server_id, order_id).await
    }

    async fn update_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        at: OffsetDateTime,
    ) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.update_status(&mut conn, id, status, at).await
    }

    async fn assign_agent(&self, id: Uuid, agent_id: Option<i64>, at: OffsetDateTime) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.set_agent(&mut conn, id, agent_id, at).await
    }

    async fn list_conversations(
        &self,
        party: Party,
        filter: &ConversationFilter,
        page: PageRequest,
    ) -> Result<Page<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.list_for_party(&mut conn, party, filter, page).await
    }

    async fn increment_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        let (requester, server) = match side {
            PartyKind::Requester => (1, 0),
            PartyKind::Server => (0, 1),
        };
        self.conversations.adjust_unread(&mut conn, id, requester, server).await
    }

    async fn reset_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.reset_unread(&mut conn, id, side).await
    }

    async fn update_last_message(&self, id: Uuid, preview: &str, at: OffsetDateTime) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.conversations.set_last_message(&mut conn, id, preview, at).await
    }

    async fn append_message(&self, message: Message, preview: String) -> Result<(Message, Conversation)> {
        let mut tx = self.pool.begin().await?;

        self.conversations.lock(&mut tx, message.conversation_id).await?;
        let message = self.messages.create(&mut tx, &message).await?;
        let (requester, server) = count_deltas(message.sender_kind, 1);
        self.conversations.adjust_unread(&mut tx, message.conversation_id, requester, server).await?;
        let conversation =
            self.conversations.set_last_message(&mut tx, message.conversation_id, &preview, message.sent_at).await?;

        tx.commit().await?;
        Ok((message, conversation))
    }

    async fn mark_delivered(
        &self,
        conversation_id: Uuid,
        reader_side: PartyKind,
        at: OffsetDateTime,
    ) -> Result<ReceiptOutcome> {
        let mut tx = self.pool.begin().await?;

        self.conversations.lock(&mut tx, conversation_id).await?;
        let rows =
            self.messages.advance_status(&mut tx, conversation_id, reader_side, MessageStatus::Delivered, at).await?;

        tx.commit().await?;
        Ok(ReceiptOutcome { message_ids: rows.into_iter().map(|r| r.id).collect(), notifications_read: 0 })
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader: Party,
        at: OffsetDateTime,
    ) -> Result<(ReceiptOutcome, Conversation)> {
        let mut tx = self.pool.begin().await?;

        self.conversations.lock(&mut tx, conversation_id).await?;
        let rows = self.messages.advance_status(&mut tx, conversation_id, reader.kind, MessageStatus::Read, at).await?;
        let system_read = rows.iter().filter(|r| r.sender_kind == SenderKind::System.as_str()).count();

        let mut conversation = self.conversations.reset_unread(&mut tx, conversation_id, reader.kind).await?;
        if system_read > 0 {
            let delta = -i64::try_from(system_read).unwrap_or(i64::MAX);
            let (requester, server) = match reader.kind.other() {
                PartyKind::Requester => (delta, 0),
                PartyKind::Server => (0, delta),
            };
            conversation = self.conversations.adjust_unread(&mut tx, conversation_id, requester, server).await?;
        }
        let notifications_read =
            self.notifications.mark_all_read(&mut tx, reader, Some(conversation_id), at).await?;

        tx.commit().await?;
        let outcome = ReceiptOutcome { message_ids: rows.into_iter().map(|r| r.id).collect(), notifications_read };
        Ok((outcome, conversation))
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.find(&mut conn, id).await
    }

    async fn update_message_content(&self, id: Uuid, content: &str, edited_at: OffsetDateTime) -> Result<Message> {
        let mut conn = self.pool.acquire().await?;
        self.messages.update_content(&mut conn, id, content, edited_at).await
    }

    async fn soft_delete_message(&self, id: Uuid, for_everyone: bool) -> Result<(Message, Conversation)> {
        let mut tx = self.pool.begin().await?;

        let current = self.messages.find(&mut tx, id).await?.ok_or(AppError::NotFound("Message"))?;
        // Lock order matches the write paths: conversation first, then message.
        let mut conversation = self.conversations.lock(&mut tx, current.conversation_id).await?;
        let before = self.messages.lock(&mut tx, id).await?;
        let message = self.messages.soft_delete(&mut tx, id, for_everyone).await?;

        if !before.is_deleted && before.status != MessageStatus::Read {
            let (requester, server) = count_deltas(before.sender_kind, -1);
            conversation = self.conversations.adjust_unread(&mut tx, before.conversation_id, requester, server).await?;
        }

        tx.commit().await?;
        Ok((message, conversation))
    }

    async fn list_messages_newest_first(&self, conversation_id: Uuid, page: PageRequest) -> Result<Page<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.page_newest_first(&mut conn, conversation_id, page).await
    }

    async fn list_messages(&self, conversation_id: Uuid, after: Option<OffsetDateTime>) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.list_oldest_first(&mut conn, conversation_id, after).await
    }

    async fn search_messages(&self, conversation_id: Uuid, query: &str, page: PageRequest) -> Result<Page<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.messages.search(&mut conn, conversation_id, query, page).await
    }

    async fn insert_notification(&self, notification: Notification) -> Result<Notification> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.create(&mut conn, &notification).await
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.find(&mut conn, id).await
    }

    async fn mark_notification_read(&self, id: Uuid, at: OffsetDateTime) -> Result<Notification> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.mark_read(&mut conn, id, at).await
    }

    async fn mark_all_notifications_read(&self, recipient: Party, at: OffsetDateTime) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.mark_all_read(&mut conn, recipient, None, at).await
    }

    async fn mark_conversation_notifications_read(
        &self,
        conversation_id: Uuid,
        recipient: Party,
        at: OffsetDateTime,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.mark_all_read(&mut conn, recipient, Some(conversation_id), at).await
    }

    async fn delete_notifications(&self, recipient: Party) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.delete_all(&mut conn, recipient).await
    }

    async fn count_unread_notifications(&self, recipient: Party) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.count_unread(&mut conn, recipient).await
    }

    async fn list_notifications(
        &self,
        recipient: Party,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.list(&mut conn, recipient, unread_only, page).await
    }

    async fn purge_read_notifications(&self, read_before: OffsetDateTime) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        self.notifications.delete_read_before(&mut conn, read_before).await
    }
}
