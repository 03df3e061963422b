use super::parse_column;
use crate::domain::notification::Notification;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const NOTIFICATION_COLUMNS: &str = "id, recipient_id, recipient_kind, conversation_id, message_id, \
     notification_type, title, body, is_read, read_at, created_at";

#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRecord {
    pub(crate) id: Uuid,
    pub(crate) recipient_id: i64,
    pub(crate) recipient_kind: String,
    pub(crate) conversation_id: Option<Uuid>,
    pub(crate) message_id: Option<Uuid>,
    pub(crate) notification_type: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = AppError;

    fn try_from(record: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            recipient_id: record.recipient_id,
            recipient_kind: parse_column("recipient_kind", &record.recipient_kind)?,
            conversation_id: record.conversation_id,
            message_id: record.message_id,
            notification_type: parse_column("notification_type", &record.notification_type)?,
            title: record.title,
            body: record.body,
            is_read: record.is_read,
            read_at: record.read_at,
            created_at: record.created_at,
        })
    }
}
