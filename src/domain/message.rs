use crate::domain::party::{Party, SenderKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Delivery progress. Ordered so that transitions can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Read => "READ",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "DELIVERED" => Ok(Self::Delivered),
            "READ" => Ok(Self::Read),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    File,
    SystemNotification,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::File => "FILE",
            Self::SystemNotification => "SYSTEM_NOTIFICATION",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "IMAGE" => Ok(Self::Image),
            "FILE" => Ok(Self::File),
            "SYSTEM_NOTIFICATION" => Ok(Self::SystemNotification),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
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
    pub delivered_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
    pub is_deleted: bool,
    pub deleted_for_everyone: bool,
}

impl Message {
    #[must_use]
    pub fn new(draft: NewMessage, sent_at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id: draft.conversation_id,
            sender_id: draft.sender_id,
            sender_kind: draft.sender_kind,
            content: draft.content,
            message_type: draft.message_type,
            status: MessageStatus::Sent,
            attachment_url: draft.attachment_url,
            sent_at,
            delivered_at: None,
            read_at: None,
            edited_at: None,
            is_deleted: false,
            deleted_for_everyone: false,
        }
    }

    /// Ownership for display: both kind and id must match the viewer.
    #[must_use]
    pub fn is_own_for(&self, viewer: &Party) -> bool {
        self.sender_kind == SenderKind::from(viewer.kind) && self.sender_id == viewer.id
    }

    /// Whether `viewer` is the author, as required for edit and delete.
    #[must_use]
    pub fn is_authored_by(&self, viewer: &Party) -> bool {
        self.is_own_for(viewer)
    }

    /// Moves the status forward to `target`. Never regresses; returns whether anything changed.
    pub fn advance(&mut self, target: MessageStatus, at: OffsetDateTime) -> bool {
        if self.status >= target {
            return false;
        }
        if self.delivered_at.is_none() {
            self.delivered_at = Some(at);
        }
        if target == MessageStatus::Read {
            self.read_at = Some(at);
        }
        self.status = target;
        true
    }

    #[must_use]
    pub fn within_window(&self, window: Duration, now: OffsetDateTime) -> bool {
        now - self.sent_at <= window
    }
}

/// Input for storing a new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: i64,
    pub sender_kind: SenderKind,
    pub content: String,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
}

/// Outcome of a bulk receipt transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub message_ids: Vec<Uuid>,
    pub notifications_read: u64,
}
