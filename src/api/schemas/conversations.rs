use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus, NewConversation};
use crate::domain::party::Party;
use serde::{Deserialize, Serialize};

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub server_id: i64,
    pub order_id: Option<i64>,
    pub title: Option<String>,
    pub initial_message: Option<String>,
}

impl CreateConversationRequest {
    /// # Errors
    /// Returns an error if the server id is not positive or the title is too long.
    pub fn validate(&self) -> Result<(), String> {
        if self.server_id <= 0 {
            return Err("server_id must be positive".into());
        }
        if self.title.as_ref().is_some_and(|t| t.chars().count() > MAX_TITLE_CHARS) {
            return Err(format!("title is too long (max {MAX_TITLE_CHARS} characters)"));
        }
        Ok(())
    }

    #[must_use]
    pub fn into_parts(self, requester_id: i64) -> (NewConversation, Option<String>) {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        (NewConversation { requester_id, server_id: self.server_id, order_id: self.order_id, title }, self.initial_message)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListConversationsQuery {
    pub filter: Option<String>,
    pub q: Option<String>,
    pub status: Option<ConversationStatus>,
}

impl ListConversationsQuery {
    /// Without an explicit `filter`, a search term or status narrows the listing by itself.
    ///
    /// # Errors
    /// Returns an error for an unknown filter or one missing its argument.
    pub fn to_filter(&self) -> Result<ConversationFilter, String> {
        let q = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        match self.filter.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None => Ok(match (q, self.status) {
                (Some(q), _) => ConversationFilter::Search(q.to_string()),
                (None, Some(status)) => ConversationFilter::Status(status),
                (None, None) => ConversationFilter::All,
            }),
            Some("all") => Ok(ConversationFilter::All),
            Some("unread") => Ok(ConversationFilter::Unread),
            Some("status") => self.status.map(ConversationFilter::Status).ok_or_else(|| "status filter needs status".into()),
            Some("search") => q.map(|q| ConversationFilter::Search(q.to_string())).ok_or_else(|| "search filter needs q".into()),
            Some(other) => Err(format!("unknown filter: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderLookupQuery {
    pub requester_id: i64,
    pub server_id: i64,
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignAgentRequest {
    pub agent_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct SystemMessageRequest {
    pub content: String,
}

/// A conversation as seen by one participant, with that participant's unread count.
#[derive(Debug, Serialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
}

impl ConversationView {
    #[must_use]
    pub fn for_viewer(conversation: Conversation, viewer: &Party) -> Self {
        let unread_count = conversation.unread_for(viewer.kind);
        Self { conversation, unread_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_follow_the_arguments_given() {
        let query = ListConversationsQuery { q: Some(" curry ".into()), ..Default::default() };
        assert_eq!(query.to_filter(), Ok(ConversationFilter::Search("curry".into())));

        let query = ListConversationsQuery { status: Some(ConversationStatus::Waiting), ..Default::default() };
        assert_eq!(query.to_filter(), Ok(ConversationFilter::Status(ConversationStatus::Waiting)));

        assert_eq!(ListConversationsQuery::default().to_filter(), Ok(ConversationFilter::All));
    }

    #[test]
    fn explicit_filters_need_their_arguments() {
        let query = ListConversationsQuery { filter: Some("UNREAD".into()), ..Default::default() };
        assert_eq!(query.to_filter(), Ok(ConversationFilter::Unread));

        let query = ListConversationsQuery { filter: Some("search".into()), q: Some("  ".into()), ..Default::default() };
        assert!(query.to_filter().is_err());

        let query = ListConversationsQuery { filter: Some("starred".into()), ..Default::default() };
        assert!(query.to_filter().is_err());
    }

    #[test]
    fn create_request_is_validated() {
        let ok = CreateConversationRequest { server_id: 2, order_id: None, title: None, initial_message: None };
        assert!(ok.validate().is_ok());
        let bad = CreateConversationRequest { server_id: 0, order_id: None, title: None, initial_message: None };
        assert!(bad.validate().is_err());
        let long = CreateConversationRequest {
            server_id: 2,
            order_id: None,
            title: Some("t".repeat(201)),
            initial_message: None,
        };
        assert!(long.validate().is_err());
    }
}
