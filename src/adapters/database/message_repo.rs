use crate::adapters::database::conversation_repo::escape_like;
use crate::adapters::database::records::MessageRecord;
use crate::adapters::database::records::message::MESSAGE_COLUMNS;
use crate::domain::message::{Message, MessageStatus};
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::PartyKind;
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

/// Rows moved by a receipt transition.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TransitionedRow {
    pub(crate) id: Uuid,
    pub(crate) sender_kind: String,
}

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a new message.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message), fields(message_id = %message.id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, message: &Message) -> Result<Message> {
        let sql = format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, sender_kind, content, message_type, status,
                                  attachment_url, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let result = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message.id)
            .bind(message.conversation_id)
            .bind(message.sender_id)
            .bind(message.sender_kind.as_str())
            .bind(&message.content)
            .bind(message.message_type.as_str())
            .bind(message.status.as_str())
            .bind(&message.attachment_url)
            .bind(message.sent_at)
            .fetch_one(conn)
            .await;

        match result {
            Ok(record) => Message::try_from(record),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Foreign key violation: conversation_id does not exist
                Err(AppError::NotFound("Conversation"))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let record = sqlx::query_as::<_, MessageRecord>(&sql).bind(id).fetch_optional(conn).await?;
        record.map(Message::try_from).transpose()
    }

    /// Locks a message row for the rest of the transaction.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock(&self, conn: &mut PgConnection, id: Uuid) -> Result<Message> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1 FOR UPDATE");
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Message"))?;
        Message::try_from(record)
    }

    #[tracing::instrument(level = "debug", skip(self, conn, content))]
    pub(crate) async fn update_content(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> Result<Message> {
        let sql = format!(
            r#"
            UPDATE messages
            SET content = $2, edited_at = $3
            WHERE id = $1 AND NOT is_deleted
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id)
            .bind(content)
            .bind(edited_at)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Message"))?;
        Message::try_from(record)
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn soft_delete(&self, conn: &mut PgConnection, id: Uuid, for_everyone: bool) -> Result<Message> {
        let sql = format!(
            r#"
            UPDATE messages
            SET is_deleted = TRUE, deleted_for_everyone = deleted_for_everyone OR $2
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id)
            .bind(for_everyone)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Message"))?;
        Message::try_from(record)
    }

    /// Advances every live message not from `reader_side` whose status is below `target`.
    /// `DELIVERED` only moves `SENT` rows; `READ` moves anything not yet read.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn advance_status(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        reader_side: PartyKind,
        target: MessageStatus,
        at: OffsetDateTime,
    ) -> Result<Vec<TransitionedRow>> {
        let status_guard = match target {
            MessageStatus::Read => "status <> 'READ'",
            MessageStatus::Delivered | MessageStatus::Sent => "status = 'SENT'",
        };
        let read_at = if target == MessageStatus::Read { "$4" } else { "read_at" };
        let sql = format!(
            r#"
            UPDATE messages
            SET status = $3,
                delivered_at = COALESCE(delivered_at, $4),
                read_at = {read_at}
            WHERE conversation_id = $1
              AND sender_kind <> $2
              AND NOT is_deleted
              AND {status_guard}
            RETURNING id, sender_kind
            "#
        );
        let mut rows = sqlx::query_as::<_, TransitionedRow>(&sql)
            .bind(conversation_id)
            .bind(reader_side.as_str())
            .bind(target.as_str())
            .bind(at)
            .fetch_all(conn)
            .await?;
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn page_newest_first(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        self.page(conn, conversation_id, None, page).await
    }

    #[tracing::instrument(level = "debug", skip(self, conn, query))]
    pub(crate) async fn search(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        query: &str,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        self.page(conn, conversation_id, Some(escape_like(query)), page).await
    }

    /// Pages with a separate `COUNT(*)`, so `total` stays right for pages past the end.
    async fn page(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        pattern: Option<String>,
        page: PageRequest,
    ) -> Result<Page<Message>> {
        let matching = |param: u8| {
            if pattern.is_some() { format!("AND content ILIKE '%' || ${param} || '%'") } else { String::new() }
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND NOT is_deleted {}",
            matching(2)
        );
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(conversation_id);
        if let Some(pattern) = &pattern {
            count = count.bind(pattern.clone());
        }
        let total = count.fetch_one(&mut *conn).await?;

        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1 AND NOT is_deleted {}
            ORDER BY sent_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            matching(4)
        );
        let mut query = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(conversation_id)
            .bind(i64::from(page.size))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        if let Some(pattern) = pattern {
            query = query.bind(pattern);
        }
        let records = query.fetch_all(&mut *conn).await?;

        let items = records.into_iter().map(Message::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, u64::try_from(total).unwrap_or(0)))
    }

    /// Live messages oldest first, optionally strictly after `after`.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_oldest_first(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        after: Option<OffsetDateTime>,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_id = $1
              AND NOT is_deleted
              AND ($2::timestamptz IS NULL OR sent_at > $2)
            ORDER BY sent_at ASC, id ASC
            "#
        );
        let records =
            sqlx::query_as::<_, MessageRecord>(&sql).bind(conversation_id).bind(after).fetch_all(conn).await?;
        records.into_iter().map(Message::try_from).collect()
    }
}
