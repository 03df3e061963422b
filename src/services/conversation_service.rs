use crate::adapters::store::Store;
use crate::config::{ConversationConfig, StatusPolicy};
use crate::domain::conversation::{Conversation, ConversationFilter, ConversationStatus, NewConversation};
use crate::domain::event::EventEnvelope;
use crate::domain::page::{Page, PageRequest};
use crate::domain::party::{Party, PartyKind};
use crate::domain::text;
use crate::error::{AppError, Result};
use crate::services::ChatCore;
use crate::services::access_guard;
use crate::services::broadcaster::Broadcaster;
use crate::services::clock::Clock;
use crate::services::message_service::{MessageService, OutgoingMessage};
use crate::services::notification_service::NotificationService;
use crate::services::ordering::OrderingGate;
use crate::services::retry::StoreRetry;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    created_total: Counter<u64>,
    status_changes_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            created_total: meter
                .u64_counter("conversations_created_total")
                .with_description("Conversations opened (existing order conversations are not counted)")
                .build(),
            status_changes_total: meter
                .u64_counter("conversation_status_changes_total")
                .with_description("Conversation status changes, by new status")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationService {
    store: Arc<dyn Store>,
    broadcaster: Arc<Broadcaster>,
    gate: Arc<OrderingGate>,
    retry: StoreRetry,
    clock: Arc<dyn Clock>,
    messages: MessageService,
    notifications: NotificationService,
    config: ConversationConfig,
    max_page_size: u32,
    metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    pub fn new(
        core: ChatCore,
        messages: MessageService,
        notifications: NotificationService,
        config: ConversationConfig,
        max_page_size: u32,
    ) -> Self {
        let ChatCore { store, broadcaster, gate, retry, clock } = core;
        Self {
            store,
            broadcaster,
            gate,
            retry,
            clock,
            messages,
            notifications,
            config,
            max_page_size,
            metrics: Metrics::new(),
        }
    }

    /// Opens a conversation on behalf of its requester. The conversation and its
    /// `initial_message` are committed together or not at all. With an order id the call
    /// is idempotent per (requester, server, order): a repeat returns the existing
    /// conversation and does not resend `initial_message`.
    ///
    /// # Errors
    /// Returns `AppError::AccessDenied` unless `caller` is the requester being named,
    /// `AppError::Validation` for an invalid initial message.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, draft, initial_message),
        fields(caller = %caller, server_id = draft.server_id, order_id = ?draft.order_id)
    )]
    pub async fn create(
        &self,
        caller: Party,
        draft: NewConversation,
        initial_message: Option<String>,
    ) -> Result<Conversation> {
        if caller != Party::requester(draft.requester_id) {
            return Err(AppError::AccessDenied);
        }

        let candidate = Conversation::new(draft, self.clock.now());
        let first = initial_message
            .filter(|m| !m.trim().is_empty())
            .map(|content| self.messages.draft(candidate.id, caller, OutgoingMessage::text(content)))
            .transpose()?;

        let turn = self.gate.enter(candidate.id).await;
        let opening = first.map(|draft| self.messages.compose(draft));
        let store = &self.store;
        let opened = self
            .retry
            .run("insert_conversation", move || store.insert_conversation(candidate.clone(), opening.clone()))
            .await?;
        if !opened.created {
            drop(turn);
            tracing::debug!(conversation_id = %opened.conversation.id, "Order conversation already exists");
            return Ok(opened.conversation);
        }
        self.metrics.created_total.add(1, &[]);

        let conversation = opened.conversation;
        if let Some(message) = &opened.message {
            self.messages.publish_new(message).await;
        }
        drop(turn);

        let server = conversation.party(PartyKind::Server);
        if let Err(e) =
            self.notifications.notify_new_conversation(server, conversation.id, conversation.title.as_deref()).await
        {
            tracing::warn!(error = %e, "Failed to create new-conversation notification");
        }
        if let Some(message) = &opened.message {
            self.messages.notify_recipient(message, &conversation, caller).await;
        }
        Ok(conversation)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if absent, `AppError::AccessDenied` if `caller` is not a participant.
    pub async fn get(&self, id: Uuid, caller: Party) -> Result<Conversation> {
        let conversation = self.load(id).await?;
        access_guard::authorize(&conversation, &caller)?;
        Ok(conversation)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if no conversation exists for the triple,
    /// `AppError::AccessDenied` if `caller` is not a participant.
    pub async fn find_by_order(&self, caller: Party, requester_id: i64, server_id: i64, order_id: i64) -> Result<Conversation> {
        let conversation = self
            .store
            .find_conversation_by_order(requester_id, server_id, order_id)
            .await?
            .ok_or(AppError::NotFound("Conversation"))?;
        access_guard::authorize(&conversation, &caller)?;
        Ok(conversation)
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn list(&self, caller: Party, filter: &ConversationFilter, page: PageRequest) -> Result<Page<Conversation>> {
        self.store.list_conversations(caller, filter, page.clamped(self.max_page_size)).await
    }

    /// Sets the conversation status, subject to the configured policy.
    ///
    /// # Errors
    /// Returns `AppError::NotFound`, `AppError::AccessDenied`, or
    /// `AppError::InvalidStatusTransition` when the policy forbids the change.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn update_status(&self, id: Uuid, caller: Party, status: ConversationStatus) -> Result<Conversation> {
        let _turn = self.gate.enter(id).await;
        let current = self.get(id, caller).await?;
        self.check_transition(&current, caller, status)?;

        let at = self.clock.now();
        let store = &self.store;
        let updated =
            self.retry.run("update_conversation_status", move || store.update_conversation_status(id, status, at)).await?;

        self.metrics.status_changes_total.add(1, &[KeyValue::new("status", status.as_str())]);
        self.broadcaster.publish_to_conversation(EventEnvelope::conversation_updated(&updated, at)).await;
        Ok(updated)
    }

    fn check_transition(&self, current: &Conversation, caller: Party, next: ConversationStatus) -> Result<()> {
        if self.config.status_policy == StatusPolicy::Open {
            return Ok(());
        }
        if current.status == ConversationStatus::Archived && next != ConversationStatus::Archived {
            return Err(AppError::InvalidStatusTransition(format!("{} is terminal", current.status)));
        }
        if next == ConversationStatus::Resolved && caller.kind != PartyKind::Server {
            return Err(AppError::InvalidStatusTransition("only the server side may resolve a conversation".into()));
        }
        Ok(())
    }

    /// Hands the server side of the conversation to an agent, or clears it with `None`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound`, or `AppError::AccessDenied` unless `caller` is on the server side.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(caller = %caller))]
    pub async fn assign_agent(&self, id: Uuid, caller: Party, agent_id: Option<i64>) -> Result<Conversation> {
        if caller.kind != PartyKind::Server {
            return Err(AppError::AccessDenied);
        }
        let _turn = self.gate.enter(id).await;
        self.get(id, caller).await?;

        let at = self.clock.now();
        let store = &self.store;
        let updated = self.retry.run("assign_agent", move || store.assign_agent(id, agent_id, at)).await?;

        self.broadcaster.publish_to_conversation(EventEnvelope::conversation_updated(&updated, at)).await;
        Ok(updated)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    pub async fn increment_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        let store = &self.store;
        self.retry.run("increment_unread", move || store.increment_unread(id, side)).await
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    pub async fn reset_unread(&self, id: Uuid, side: PartyKind) -> Result<Conversation> {
        let store = &self.store;
        self.retry.run("reset_unread", move || store.reset_unread(id, side)).await
    }

    /// Stores a preview, truncated to fit, as the latest activity on the conversation.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation does not exist.
    pub async fn update_last_message(&self, id: Uuid, preview: &str, at: OffsetDateTime) -> Result<Conversation> {
        let preview = text::preview(preview);
        let preview = preview.as_str();
        let store = &self.store;
        self.retry.run("update_last_message", move || store.update_last_message(id, preview, at)).await
    }

    async fn load(&self, id: Uuid) -> Result<Conversation> {
        self.store.find_conversation(id).await?.ok_or(AppError::NotFound("Conversation"))
    }
}
