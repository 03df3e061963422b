use crate::domain::party::{Party, PartyKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    Active,
    Waiting,
    Resolved,
    Archived,
}

impl ConversationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Waiting => "WAITING",
            Self::Resolved => "RESOLVED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "WAITING" => Ok(Self::Waiting),
            "RESOLVED" => Ok(Self::Resolved),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub order_id: Option<i64>,
    pub requester_id: i64,
    pub server_id: i64,
    pub agent_id: Option<i64>,
    pub title: Option<String>,
    pub status: ConversationStatus,
    pub requester_unread: i64,
    pub server_unread: i64,
    pub last_message_preview: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub archived_at: Option<OffsetDateTime>,
}

impl Conversation {
    /// Builds a fresh `ACTIVE` conversation with zeroed counters.
    #[must_use]
    pub fn new(draft: NewConversation, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id: draft.order_id,
            requester_id: draft.requester_id,
            server_id: draft.server_id,
            agent_id: None,
            title: draft.title,
            status: ConversationStatus::Active,
            requester_unread: 0,
            server_unread: 0,
            last_message_preview: None,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    #[must_use]
    pub const fn unread_for(&self, side: PartyKind) -> i64 {
        match side {
            PartyKind::Requester => self.requester_unread,
            PartyKind::Server => self.server_unread,
        }
    }

    pub const fn unread_mut(&mut self, side: PartyKind) -> &mut i64 {
        match side {
            PartyKind::Requester => &mut self.requester_unread,
            PartyKind::Server => &mut self.server_unread,
        }
    }

    /// The primary identity on the given side.
    #[must_use]
    pub const fn party(&self, side: PartyKind) -> Party {
        match side {
            PartyKind::Requester => Party::requester(self.requester_id),
            PartyKind::Server => Party::server(self.server_id),
        }
    }

    /// Applies a status change, stamping `archived_at` when archiving.
    pub fn apply_status(&mut self, status: ConversationStatus, now: OffsetDateTime) {
        self.status = status;
        if status == ConversationStatus::Archived {
            self.archived_at = Some(now);
        }
        self.updated_at = now;
    }
}

/// Input for opening a new conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversation {
    pub requester_id: i64,
    pub server_id: i64,
    pub order_id: Option<i64>,
    pub title: Option<String>,
}

/// Narrowing applied when listing a caller's conversations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConversationFilter {
    #[default]
    All,
    /// Only conversations where the caller's own counter is above zero.
    Unread,
    Status(ConversationStatus),
    /// Case-insensitive match against title or last message preview.
    Search(String),
}
