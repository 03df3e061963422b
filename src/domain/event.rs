//! Live event envelopes fanned out to conversation subscribers.
//!
//! Message payloads carry the sender fields but no ownership flag: a conversation
//! topic is watched by both sides, so each client derives "own" from its identity.

use crate::domain::conversation::{Conversation, ConversationStatus};
use crate::domain::message::{Message, MessageStatus, MessageType};
use crate::domain::party::{Party, SenderKind};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NewMessage,
    MessageEdited,
    MessageDeleted,
    MessageDelivered,
    MessageRead,
    TypingStart,
    TypingStop,
    UserOnline,
    UserOffline,
    ConversationUpdated,
}

/// Message as seen by any subscriber. Soft-deleted messages are sent with empty content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: i64,
    pub sender_kind: SenderKind,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub attachment_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    pub is_deleted: bool,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            sender_kind: message.sender_kind,
            content: if message.is_deleted { String::new() } else { message.content.clone() },
            message_type: message.message_type,
            status: message.status,
            attachment_url: if message.is_deleted { None } else { message.attachment_url.clone() },
            sent_at: message.sent_at,
            edited_at: message.edited_at,
            is_deleted: message.is_deleted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub party: Party,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub reader: Party,
    pub status: MessageStatus,
    pub message_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub status: ConversationStatus,
    pub agent_id: Option<i64>,
    pub requester_unread: i64,
    pub server_unread: i64,
    pub last_message_preview: Option<String>,
}

impl From<&Conversation> for ConversationSnapshot {
    fn from(conversation: &Conversation) -> Self {
        Self {
            status: conversation.status,
            agent_id: conversation.agent_id,
            requester_unread: conversation.requester_unread,
            server_unread: conversation.server_unread,
            last_message_preview: conversation.last_message_preview.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: EventType,
    pub conversation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing_indicator: Option<TypingIndicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_receipt: Option<ReadReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationSnapshot>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl EventEnvelope {
    const fn bare(event_type: EventType, conversation_id: Uuid, timestamp: OffsetDateTime) -> Self {
        Self {
            event_type,
            conversation_id,
            message: None,
            typing_indicator: None,
            read_receipt: None,
            presence: None,
            conversation: None,
            timestamp,
        }
    }

    #[must_use]
    pub fn message(event_type: EventType, message: &Message, timestamp: OffsetDateTime) -> Self {
        Self { message: Some(message.into()), ..Self::bare(event_type, message.conversation_id, timestamp) }
    }

    #[must_use]
    pub fn receipt(conversation_id: Uuid, event_type: EventType, receipt: ReadReceipt) -> Self {
        let timestamp = receipt.at;
        Self { read_receipt: Some(receipt), ..Self::bare(event_type, conversation_id, timestamp) }
    }

    #[must_use]
    pub fn typing(conversation_id: Uuid, party: Party, is_typing: bool, timestamp: OffsetDateTime) -> Self {
        let event_type = if is_typing { EventType::TypingStart } else { EventType::TypingStop };
        Self {
            typing_indicator: Some(TypingIndicator { party, is_typing }),
            ..Self::bare(event_type, conversation_id, timestamp)
        }
    }

    #[must_use]
    pub fn presence(conversation_id: Uuid, party: Party, online: bool, timestamp: OffsetDateTime) -> Self {
        let event_type = if online { EventType::UserOnline } else { EventType::UserOffline };
        Self { presence: Some(party), ..Self::bare(event_type, conversation_id, timestamp) }
    }

    #[must_use]
    pub fn conversation_updated(conversation: &Conversation, timestamp: OffsetDateTime) -> Self {
        Self {
            conversation: Some(conversation.into()),
            ..Self::bare(EventType::ConversationUpdated, conversation.id, timestamp)
        }
    }
}
