use super::parse_column;
use crate::domain::conversation::Conversation;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) const CONVERSATION_COLUMNS: &str = "id, order_id, requester_id, server_id, agent_id, title, status, \
     requester_unread, server_unread, last_message_preview, last_message_at, created_at, updated_at, archived_at";

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) order_id: Option<i64>,
    pub(crate) requester_id: i64,
    pub(crate) server_id: i64,
    pub(crate) agent_id: Option<i64>,
    pub(crate) title: Option<String>,
    pub(crate) status: String,
    pub(crate) requester_unread: i64,
    pub(crate) server_unread: i64,
    pub(crate) last_message_preview: Option<String>,
    pub(crate) last_message_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
    pub(crate) archived_at: Option<OffsetDateTime>,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = AppError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            order_id: record.order_id,
            requester_id: record.requester_id,
            server_id: record.server_id,
            agent_id: record.agent_id,
            title: record.title,
            status: parse_column("status", &record.status)?,
            requester_unread: record.requester_unread,
            server_unread: record.server_unread,
            last_message_preview: record.last_message_preview,
            last_message_at: record.last_message_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            archived_at: record.archived_at,
        })
    }
}
