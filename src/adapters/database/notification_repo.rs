use crate::adapters::database::records::NotificationRecord;
use crate::adapters::database::records::notification::NOTIFICATION_COLUMNS;
use crate::domain::notification::Notification;
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::Party;
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct NotificationRepository {}

impl NotificationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    #[tracing::instrument(level = "debug", skip(self, conn, notification), fields(notification_id = %notification.id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, notification: &Notification) -> Result<Notification> {
        let sql = format!(
            r#"
            INSERT INTO notifications (id, recipient_id, recipient_kind, conversation_id, message_id,
                                       notification_type, title, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(notification.id)
            .bind(notification.recipient_id)
            .bind(notification.recipient_kind.as_str())
            .bind(notification.conversation_id)
            .bind(notification.message_id)
            .bind(notification.notification_type.as_str())
            .bind(&notification.title)
            .bind(&notification.body)
            .bind(notification.created_at)
            .fetch_one(conn)
            .await?;
        Notification::try_from(record)
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let record = sqlx::query_as::<_, NotificationRecord>(&sql).bind(id).fetch_optional(conn).await?;
        record.map(Notification::try_from).transpose()
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_read(&self, conn: &mut PgConnection, id: Uuid, at: OffsetDateTime) -> Result<Notification> {
        let sql = format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $2)
            WHERE id = $1
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(conn)
            .await?
            .ok_or(AppError::NotFound("Notification"))?;
        Notification::try_from(record)
    }

    /// Marks a recipient's unread notifications read, optionally only for one conversation.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_all_read(
        &self,
        conn: &mut PgConnection,
        recipient: Party,
        conversation_id: Option<Uuid>,
        at: OffsetDateTime,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = $3
            WHERE recipient_id = $1
              AND recipient_kind = $2
              AND NOT is_read
              AND ($4::uuid IS NULL OR conversation_id = $4)
            "#,
        )
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .bind(at)
        .bind(conversation_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_all(&self, conn: &mut PgConnection, recipient: Party) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE recipient_id = $1 AND recipient_kind = $2")
            .bind(recipient.id)
            .bind(recipient.kind.as_str())
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn count_unread(&self, conn: &mut PgConnection, recipient: Party) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND recipient_kind = $2 AND NOT is_read",
        )
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .fetch_one(conn)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list(
        &self,
        conn: &mut PgConnection,
        recipient: Party,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND recipient_kind = $2 AND (NOT $3 OR NOT is_read)",
        )
        .bind(recipient.id)
        .bind(recipient.kind.as_str())
        .bind(unread_only)
        .fetch_one(&mut *conn)
        .await?;

        let sql = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE recipient_id = $1 AND recipient_kind = $2 AND (NOT $3 OR NOT is_read)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        );
        let records = sqlx::query_as::<_, NotificationRecord>(&sql)
            .bind(recipient.id)
            .bind(recipient.kind.as_str())
            .bind(unread_only)
            .bind(i64::from(page.size))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&mut *conn)
            .await?;

        let items = records.into_iter().map(Notification::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, u64::try_from(total).unwrap_or(0)))
    }

    /// Deletes notifications read before the cutoff.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete_read_before(&self, conn: &mut PgConnection, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE is_read AND read_at < $1")
            .bind(cutoff)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
