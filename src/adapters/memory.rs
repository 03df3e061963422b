//! Single-process store. One lock guards all tables, so every operation is trivially
//! atomic and serialized; suited to tests and single-node development.

use crate::adapters::store::{Opened, Opening, Store};
use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus};
use crate::domain::message::{Message, MessageStatus, ReceiptOutcome};
use crate::domain::notification::Notification;
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind};
use crate::domain::text::contains_ignore_case;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Message>,
    notifications: HashMap<Uuid, Notification>,
}

impl Tables {
    fn conversation_mut(&mut self, id: Uuid) -> Result<&mut Conversation> {
        self.conversations.get_mut(&id).ok_or(AppError::NotFound("Conversation"))
    }

    fn append(&mut self, message: Message, preview: String) -> Result<Conversation> {
        let conversation = self.conversation_mut(message.conversation_id)?;
        for side in [PartyKind::Requester, PartyKind::Server] {
            if message.sender_kind.counts_for(side) {
                *conversation.unread_mut(side) += 1;
            }
        }
        conversation.last_message_preview = Some(preview);
        conversation.last_message_at = Some(message.sent_at);
        conversation.updated_at = message.sent_at;
        let conversation = conversation.clone();
        self.messages.insert(message.id, message);
        Ok(conversation)
    }

    /// Live messages of a conversation, oldest first.
    fn visible_messages(&self, conversation_id: Uuid) -> Vec<&Message> {
        let mut messages: Vec<&Message> =
            self.messages.values().filter(|m| m.conversation_id == conversation_id && !m.is_deleted).collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then(a.id.cmp(&b.id)));
        messages
    }

    fn mark_notifications_read(
        &mut self,
        recipient: Party,
        conversation_id: Option<Uuid>,
        at: OffsetDateTime,
    ) -> u64 {
        let mut count = 0;
        for notification in self.notifications.values_mut() {
            if notification.recipient() == recipient
                && conversation_id.is_none_or(|id| notification.conversation_id == Some(id))
                && notification.mark_read(at)
            {
                count += 1;
            }
        }
        count
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    injected_failures: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` write operations fail with a transient error.
    pub fn fail_next_writes(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> Result<()> {
        let took = self
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took { Err(AppError::TransientStore("injected failure".to_string())) } else { Ok(()) }
    }
}

fn participates(conversation: &Conversation, party: Party) -> bool {
    match party.kind {
        PartyKind::Requester => conversation.requester_id == party.id,
        PartyKind::Server => conversation.server_id == party.id || conversation.agent_id == Some(party.id),
    }
}

fn matches_filter(conversation: &Conversation, party: Party, filter: &ConversationFilter) -> bool {
    match filter {
        ConversationFilter::All => true,
        ConversationFilter::Unread => conversation.unread_for(party.kind) > 0,
        ConversationFilter::Status(status) => conversation.status == *status,
        ConversationFilter::Search(query) => {
            conversation.title.as_deref().is_some_and(|t| contains_ignore_case(t, query))
                || conversation.last_message_preview.as_deref().is_some_and(|p| contains_ignore_case(p, query))
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_conversation(&self, conversation: Conversation, opening: Option<Opening>) -> Result<Opened> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        if let Some(order_id) = conversation.order_id
            && let Some(existing) = tables.conversations.values().find(|c| {
                c.order_id == Some(order_id)
                    && c.requester_id == conversation.requester_id
                    && c.server_id == conversation.server_id
            })
        {
            return Ok(Opened { conversation: existing.clone(), created: false, message: None });
        }
        let id = conversation.id;
        tables.conversations.insert(id, conversation);
        match opening {
            Some(Opening { message, preview }) => {
                let conversation = tables.append(message.clone(), preview)?;
                Ok(Opened { conversation, created: true, message: Some(message) })
            }
            None => {
                let conversation = tables.conversation_mut(id)?.clone();
                Ok(Opened { conversation, created: true, message: None })
            }
        }
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        Ok(self.tables.lock().await.conversations.get(&id).cloned())
    }

    async fn find_conversation_by_order(
        &self,
        requester_id: i64,
        server_id: i64,
        order_id: i64,
    ) -> Result<Option<Conversation>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .conversations
            .values()
            .find(|c| c.order_id == Some(order_id) && c.requester_id == requester_id && c.server_id == server_id)
            .cloned())
    }

    async fn update_conversation_status(
        &self,
        id: Uuid,
        status: ConversationStatus,
        at: OffsetDateTime,
    ) -> Result<Conversation> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_mut(id)?;
        conversation.apply_status(status, at);
        Ok(conversation.clone())
    }

    async fn assign_agent(&self, id: Uuid, agent_id: Option<i64>, at: OffsetDateTime) -> Result<Conversation> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_mut(id)?;
        conversation.agent_id = agent_id;
        conversation.updated_at = at;
        Ok(conversation.clone())
    }

    async fn list_conversations(
        &self,
        party: Party,
        filter: &ConversationFilter,
        page: PageRequest,
    ) -> Result<Page<Conversation>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| participates(c, party) && matches_filter(c, party, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(matching, page))
    }

    async fn increment_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_mut(id)?;
        *conversation.unread_mut(side) += 1;
        Ok(conversation.clone())
    }

    async fn reset_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_mut(id)?;
        *conversation.unread_mut(side) = 0;
        Ok(conversation.clone())
    }

    async fn update_last_message(&self, id: Uuid, preview: &str, at: OffsetDateTime) -> Result<Conversation> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.conversation_mut(id)?;
        conversation.last_message_preview = Some(preview.to_string());
        conversation.last_message_at = Some(at);
        conversation.updated_at = at;
        Ok(conversation.clone())
    }

    async fn append_message(&self, message: Message, preview: String) -> Result<(Message, Conversation)> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let conversation = tables.append(message.clone(), preview)?;
        Ok((message, conversation))
    }

    async fn mark_delivered(
        &self,
        conversation_id: Uuid,
        reader_side: PartyKind,
        at: OffsetDateTime,
    ) -> Result<ReceiptOutcome> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        tables.conversation_mut(conversation_id)?;
        let mut outcome = ReceiptOutcome::default();
        for message in tables.messages.values_mut() {
            if message.conversation_id == conversation_id
                && !message.is_deleted
                && message.sender_kind.counts_for(reader_side)
                && message.status == MessageStatus::Sent
                && message.advance(MessageStatus::Delivered, at)
            {
                outcome.message_ids.push(message.id);
            }
        }
        outcome.message_ids.sort();
        Ok(outcome)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader: Party,
        at: OffsetDateTime,
    ) -> Result<(ReceiptOutcome, Conversation)> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        tables.conversation_mut(conversation_id)?;

        let mut outcome = ReceiptOutcome::default();
        let mut system_read = 0;
        for message in tables.messages.values_mut() {
            if message.conversation_id == conversation_id
                && !message.is_deleted
                && message.sender_kind.counts_for(reader.kind)
                && message.advance(MessageStatus::Read, at)
            {
                if message.sender_kind.side().is_none() {
                    system_read += 1;
                }
                outcome.message_ids.push(message.id);
            }
        }
        outcome.message_ids.sort();

        outcome.notifications_read = tables.mark_notifications_read(reader, Some(conversation_id), at);

        let conversation = tables.conversation_mut(conversation_id)?;
        *conversation.unread_mut(reader.kind) = 0;
        let other = conversation.unread_mut(reader.kind.other());
        *other = (*other - system_read).max(0);
        Ok((outcome, conversation.clone()))
    }

    async fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.tables.lock().await.messages.get(&id).cloned())
    }

    async fn update_message_content(&self, id: Uuid, content: &str, edited_at: OffsetDateTime) -> Result<Message> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let message = tables.messages.get_mut(&id).filter(|m| !m.is_deleted).ok_or(AppError::NotFound("Message"))?;
        message.content = content.to_string();
        message.edited_at = Some(edited_at);
        Ok(message.clone())
    }

    async fn soft_delete_message(&self, id: Uuid, for_everyone: bool) -> Result<(Message, Conversation)> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let message = tables.messages.get_mut(&id).ok_or(AppError::NotFound("Message"))?;
        let was_unread = !message.is_deleted && message.status != MessageStatus::Read;
        message.is_deleted = true;
        message.deleted_for_everyone |= for_everyone;
        let message = message.clone();

        let conversation = tables.conversation_mut(message.conversation_id)?;
        if was_unread {
            for side in [PartyKind::Requester, PartyKind::Server] {
                if message.sender_kind.counts_for(side) {
                    let counter = conversation.unread_mut(side);
                    *counter = (*counter - 1).max(0);
                }
            }
        }
        Ok((message, conversation.clone()))
    }

    async fn list_messages_newest_first(&self, conversation_id: Uuid, page: PageRequest) -> Result<Page<Message>> {
        let tables = self.tables.lock().await;
        let newest_first: Vec<Message> = tables.visible_messages(conversation_id).into_iter().rev().cloned().collect();
        Ok(Page::from_sorted(newest_first, page))
    }

    async fn list_messages(&self, conversation_id: Uuid, after: Option<OffsetDateTime>) -> Result<Vec<Message>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .visible_messages(conversation_id)
            .into_iter()
            .filter(|m| after.is_none_or(|t| m.sent_at > t))
            .cloned()
            .collect())
    }

    async fn search_messages(&self, conversation_id: Uuid, query: &str, page: PageRequest) -> Result<Page<Message>> {
        let tables = self.tables.lock().await;
        let hits: Vec<Message> = tables
            .visible_messages(conversation_id)
            .into_iter()
            .rev()
            .filter(|m| contains_ignore_case(&m.content, query))
            .cloned()
            .collect();
        Ok(Page::from_sorted(hits, page))
    }

    async fn insert_notification(&self, notification: Notification) -> Result<Notification> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        tables.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.tables.lock().await.notifications.get(&id).cloned())
    }

    async fn mark_notification_read(&self, id: Uuid, at: OffsetDateTime) -> Result<Notification> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let notification = tables.notifications.get_mut(&id).ok_or(AppError::NotFound("Notification"))?;
        notification.mark_read(at);
        Ok(notification.clone())
    }

    async fn mark_all_notifications_read(&self, recipient: Party, at: OffsetDateTime) -> Result<u64> {
        self.check_injected_failure()?;
        Ok(self.tables.lock().await.mark_notifications_read(recipient, None, at))
    }

    async fn mark_conversation_notifications_read(
        &self,
        conversation_id: Uuid,
        recipient: Party,
        at: OffsetDateTime,
    ) -> Result<u64> {
        self.check_injected_failure()?;
        Ok(self.tables.lock().await.mark_notifications_read(recipient, Some(conversation_id), at))
    }

    async fn delete_notifications(&self, recipient: Party) -> Result<u64> {
        self.check_injected_failure()?;
        let mut tables = self.tables.lock().await;
        let before = tables.notifications.len();
        tables.notifications.retain(|_, n| n.recipient() != recipient);
        Ok((before - tables.notifications.len()) as u64)
    }

    async fn count_unread_notifications(&self, recipient: Party) -> Result<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.notifications.values().filter(|n| n.recipient() == recipient && !n.is_read).count() as u64)
    }

    async fn list_notifications(
        &self,
        recipient: Party,
        unread_only: bool,
        page: PageRequest,
    ) -> Result<Page<Notification>> {
        let tables = self.tables.lock().await;
        let mut matching: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.recipient() == recipient && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(matching, page))
    }

    async fn purge_read_notifications(&self, read_before: OffsetDateTime) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.notifications.len();
        tables.notifications.retain(|_, n| !(n.is_read && n.read_at.is_some_and(|at| at < read_before)));
        Ok((before - tables.notifications.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::NewConversation;
    use crate::domain::message::{MessageType, NewMessage};
    use crate::domain::party::SenderKind;

    async fn seeded() -> (MemoryStore, Conversation) {
        let store = MemoryStore::new();
        let draft = NewConversation { requester_id: 1, server_id: 2, order_id: Some(10), title: None };
        let opened =
            store.insert_conversation(Conversation::new(draft, OffsetDateTime::now_utc()), None).await.expect("insert");
        assert!(opened.created);
        (store, opened.conversation)
    }

    fn draft(conversation_id: Uuid, sender_id: i64, sender_kind: SenderKind, content: &str) -> Message {
        Message::new(
            NewMessage {
                conversation_id,
                sender_id,
                sender_kind,
                content: content.to_string(),
                message_type: MessageType::Text,
                attachment_url: None,
            },
            OffsetDateTime::now_utc(),
        )
    }

    #[tokio::test]
    async fn order_triple_is_unique() {
        let (store, conversation) = seeded().await;
        let again = NewConversation { requester_id: 1, server_id: 2, order_id: Some(10), title: None };
        let opening =
            Opening { message: draft(conversation.id, 1, SenderKind::Requester, "again?"), preview: "again?".into() };
        let opened = store
            .insert_conversation(Conversation::new(again, OffsetDateTime::now_utc()), Some(opening))
            .await
            .expect("insert");
        assert!(!opened.created);
        assert!(opened.message.is_none());
        assert_eq!(opened.conversation.id, conversation.id);
        assert_eq!(opened.conversation.server_unread, 0);
        assert!(store.list_messages(conversation.id, None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn opening_message_is_stored_with_the_conversation() {
        let store = MemoryStore::new();
        let draft_conversation = NewConversation { requester_id: 1, server_id: 2, order_id: None, title: None };
        let conversation = Conversation::new(draft_conversation, OffsetDateTime::now_utc());
        let first = draft(conversation.id, 1, SenderKind::Requester, "Hi");

        let opened = store
            .insert_conversation(conversation, Some(Opening { message: first.clone(), preview: "Hi".into() }))
            .await
            .expect("insert");

        assert_eq!(opened.message.map(|m| m.id), Some(first.id));
        assert_eq!(opened.conversation.server_unread, 1);
        assert_eq!(opened.conversation.last_message_preview.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn deleted_messages_cannot_be_edited() {
        let (store, conversation) = seeded().await;
        let (msg, _) =
            store.append_message(draft(conversation.id, 1, SenderKind::Requester, "typo"), "typo".into()).await.expect("append");
        store.soft_delete_message(msg.id, true).await.expect("delete");

        let err = store.update_message_content(msg.id, "resurrected", OffsetDateTime::now_utc()).await;
        assert!(matches!(err, Err(AppError::NotFound("Message"))));
        let stored = store.find_message(msg.id).await.expect("find").expect("exists");
        assert_eq!(stored.content, "typo");
    }

    #[tokio::test]
    async fn deleting_for_everyone_after_self_delete_widens_the_scope() {
        let (store, conversation) = seeded().await;
        let (msg, _) =
            store.append_message(draft(conversation.id, 1, SenderKind::Requester, "hm"), "hm".into()).await.expect("append");
        store.soft_delete_message(msg.id, false).await.expect("self delete");

        let (widened, after) = store.soft_delete_message(msg.id, true).await.expect("delete for everyone");
        assert!(widened.deleted_for_everyone);
        assert_eq!(after.server_unread, 0);
    }

    #[tokio::test]
    async fn system_messages_count_for_both_sides_until_read() {
        let (store, conversation) = seeded().await;
        let system = draft(conversation.id, 0, SenderKind::System, "Order accepted");
        let (_, after_send) = store.append_message(system, "Order accepted".into()).await.expect("append");
        assert_eq!((after_send.requester_unread, after_send.server_unread), (1, 1));

        let (outcome, after_read) =
            store.mark_read(conversation.id, Party::requester(1), OffsetDateTime::now_utc()).await.expect("read");
        assert_eq!(outcome.message_ids.len(), 1);
        assert_eq!((after_read.requester_unread, after_read.server_unread), (0, 0));
    }

    #[tokio::test]
    async fn deleting_an_unread_message_takes_it_off_the_counter() {
        let (store, conversation) = seeded().await;
        let msg = draft(conversation.id, 1, SenderKind::Requester, "oops");
        let (msg, _) = store.append_message(msg, "oops".into()).await.expect("append");

        let (deleted, conversation) = store.soft_delete_message(msg.id, false).await.expect("delete");
        assert!(deleted.is_deleted);
        assert_eq!(conversation.server_unread, 0);

        // Deleting again must not decrement twice.
        let (_, conversation) = store.soft_delete_message(msg.id, true).await.expect("delete again");
        assert_eq!(conversation.server_unread, 0);
        assert!(store.list_messages(conversation.id, None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let (store, conversation) = seeded().await;
        store.fail_next_writes(1);
        let err = store.reset_unread(conversation.id, PartyKind::Server).await.expect_err("should fail");
        assert!(err.is_transient());
        store.reset_unread(conversation.id, PartyKind::Server).await.expect("second attempt succeeds");
    }
}
