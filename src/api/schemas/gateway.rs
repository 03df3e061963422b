use crate::domain::event::EventEnvelope;
use crate::domain::notification::Notification;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity for the WebSocket handshake, where clients cannot always set headers.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub party_id: Option<String>,
    pub party_kind: Option<String>,
}

/// Text frames accepted from a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe { conversation_id: Uuid },
    Unsubscribe { conversation_id: Uuid },
    TypingStart { conversation_id: Uuid },
    TypingStop { conversation_id: Uuid },
    MarkDelivered { conversation_id: Uuid },
    MarkRead { conversation_id: Uuid },
}

impl ClientCommand {
    #[must_use]
    pub const fn conversation_id(&self) -> Uuid {
        match self {
            Self::Subscribe { conversation_id }
            | Self::Unsubscribe { conversation_id }
            | Self::TypingStart { conversation_id }
            | Self::TypingStop { conversation_id }
            | Self::MarkDelivered { conversation_id }
            | Self::MarkRead { conversation_id } => *conversation_id,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
            Self::MarkDelivered { .. } => "mark_delivered",
            Self::MarkRead { .. } => "mark_read",
        }
    }
}

/// Text frames pushed to a connected client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    Event { event: &'a EventEnvelope },
    Notification { notification: &'a Notification },
    /// A command finished; `command` echoes its name.
    Ack { command: &'static str, conversation_id: Uuid },
    /// Events were dropped because the client fell behind; resync with the sync endpoint.
    Lagged { conversation_id: Option<Uuid>, skipped: u64 },
    Error { code: &'static str, error: String },
}
