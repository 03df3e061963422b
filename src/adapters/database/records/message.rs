use super::parse_column;
use crate::domain::message::Message;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_kind, content, message_type, status, \
     attachment_url, sent_at, delivered_at, read_at, edited_at, is_deleted, deleted_for_everyone";

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: i64,
    pub(crate) sender_kind: String,
    pub(crate) content: String,
    pub(crate) message_type: String,
    pub(crate) status: String,
    pub(crate) attachment_url: Option<String>,
    pub(crate) sent_at: OffsetDateTime,
    pub(crate) delivered_at: Option<OffsetDateTime>,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) edited_at: Option<OffsetDateTime>,
    pub(crate) is_deleted: bool,
    pub(crate) deleted_for_everyone: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            sender_kind: parse_column("sender_kind", &record.sender_kind)?,
            content: record.content,
            message_type: parse_column("message_type", &record.message_type)?,
            status: parse_column("status", &record.status)?,
            attachment_url: record.attachment_url,
            sent_at: record.sent_at,
            delivered_at: record.delivered_at,
            read_at: record.read_at,
            edited_at: record.edited_at,
            is_deleted: record.is_deleted,
            deleted_for_everyone: record.deleted_for_everyone,
        })
    }
}
