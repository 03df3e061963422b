use crate::domain::message::{Message, MessageType, ReceiptOutcome};
use crate::domain::party::Party;
use crate::services::message_service::OutgoingMessage;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
}

const fn default_message_type() -> MessageType {
    MessageType::Text
}

impl From<SendMessageRequest> for OutgoingMessage {
    fn from(request: SendMessageRequest) -> Self {
        Self { content: request.content, message_type: request.message_type, attachment_url: request.attachment_url }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteMessageQuery {
    #[serde(default)]
    pub for_everyone: bool,
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    #[serde(with = "time::serde::rfc3339")]
    pub after: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// A message as seen by one viewer. `is_own` needs both sender kind and id to match.
#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_own: bool,
}

impl MessageView {
    #[must_use]
    pub fn for_viewer(message: Message, viewer: &Party) -> Self {
        let is_own = message.is_own_for(viewer);
        Self { message, is_own }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub message_ids: Vec<Uuid>,
    pub notifications_read: u64,
}

impl From<ReceiptOutcome> for ReceiptResponse {
    fn from(outcome: ReceiptOutcome) -> Self {
        Self { message_ids: outcome.message_ids, notifications_read: outcome.notifications_read }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::NewMessage;
    use crate::domain::party::SenderKind;

    #[test]
    fn ownership_needs_kind_and_id() {
        let message = Message::new(
            NewMessage {
                conversation_id: Uuid::now_v7(),
                sender_id: 5,
                sender_kind: SenderKind::Server,
                content: "hi".into(),
                message_type: MessageType::Text,
                attachment_url: None,
            },
            OffsetDateTime::UNIX_EPOCH,
        );
        assert!(MessageView::for_viewer(message.clone(), &Party::server(5)).is_own);
        assert!(!MessageView::for_viewer(message.clone(), &Party::requester(5)).is_own);
        assert!(!MessageView::for_viewer(message, &Party::server(6)).is_own);
    }

    #[test]
    fn message_type_defaults_to_text() {
        let request: SendMessageRequest = serde_json::from_str(r#"{"content":"hello"}"#).expect("valid json");
        assert_eq!(request.message_type, MessageType::Text);
    }
}
