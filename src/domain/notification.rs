use crate::domain::party::{Party, PartyKind};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    NewConversation,
    NewMessage,
    OrderUpdate,
    MessageRead,
    TypingIndicator,
}

impl NotificationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewConversation => "NEW_CONVERSATION",
            Self::NewMessage => "NEW_MESSAGE",
            Self::OrderUpdate => "ORDER_UPDATE",
            Self::MessageRead => "MESSAGE_READ",
            Self::TypingIndicator => "TYPING_INDICATOR",
        }
    }
}

impl FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW_CONVERSATION" => Ok(Self::NewConversation),
            "NEW_MESSAGE" => Ok(Self::NewMessage),
            "ORDER_UPDATE" => Ok(Self::OrderUpdate),
            "MESSAGE_READ" => Ok(Self::MessageRead),
            "TYPING_INDICATOR" => Ok(Self::TypingIndicator),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// A durable notice for a recipient. Conversation and message ids are weak references;
/// `body` is an immutable copy of the source text and is never re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: i64,
    pub recipient_kind: PartyKind,
    pub conversation_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    #[must_use]
    pub fn new(draft: NewNotification, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient_id: draft.recipient.id,
            recipient_kind: draft.recipient.kind,
            conversation_id: draft.conversation_id,
            message_id: draft.message_id,
            notification_type: draft.notification_type,
            title: draft.title,
            body: draft.body,
            is_read: false,
            read_at: None,
            created_at: now,
        }
    }

    #[must_use]
    pub const fn recipient(&self) -> Party {
        Party::new(self.recipient_id, self.recipient_kind)
    }

    /// Marks read once; later calls keep the first `read_at`.
    pub fn mark_read(&mut self, at: OffsetDateTime) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient: Party,
    pub conversation_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
}
