use crate::api::AppState;
use crate::api::middleware::Caller;
use crate::api::schemas::PageQuery;
use crate::api::schemas::conversations::{
    AssignAgentRequest, ConversationView, CreateConversationRequest, ListConversationsQuery, OrderLookupQuery,
    SystemMessageRequest, TypingRequest, UpdateStatusRequest,
};
use crate::api::schemas::messages::MessageView;
use crate::domain::party::PartyKind;
use crate::domain::page::Page;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Opens a conversation for the calling requester.
///
/// # Errors
/// Returns `AppError::Validation` for a malformed body, `AppError::AccessDenied` for server callers.
pub async fn create_conversation(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate().map_err(AppError::Validation)?;
    let (draft, initial_message) = payload.into_parts(caller.id);
    let conversation = state.conversation_service.create(caller, draft, initial_message).await?;
    Ok((StatusCode::CREATED, Json(ConversationView::for_viewer(conversation, &caller))))
}

/// # Errors
/// Returns `AppError::Validation` for an unknown filter.
pub async fn list_conversations(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<ConversationView>>> {
    let filter = query.to_filter().map_err(AppError::Validation)?;
    let page = state.conversation_service.list(caller, &filter, page.to_request()).await?;
    Ok(Json(page.map(|c| ConversationView::for_viewer(c, &caller))))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn get_conversation(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationView>> {
    let conversation = state.conversation_service.get(id, caller).await?;
    Ok(Json(ConversationView::for_viewer(conversation, &caller)))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn find_by_order(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<ConversationView>> {
    let conversation = state
        .conversation_service
        .find_by_order(caller, query.requester_id, query.server_id, query.order_id)
        .await?;
    Ok(Json(ConversationView::for_viewer(conversation, &caller)))
}

/// # Errors
/// Returns `AppError::InvalidStatusTransition` when the configured policy forbids the change.
pub async fn update_status(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<ConversationView>> {
    let conversation = state.conversation_service.update_status(id, caller, payload.status).await?;
    Ok(Json(ConversationView::for_viewer(conversation, &caller)))
}

/// # Errors
/// Returns `AppError::AccessDenied` unless the caller is on the server side.
pub async fn assign_agent(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignAgentRequest>,
) -> Result<Json<ConversationView>> {
    if payload.agent_id.is_some_and(|a| a <= 0) {
        return Err(AppError::Validation("agent_id must be positive".into()));
    }
    let conversation = state.conversation_service.assign_agent(id, caller, payload.agent_id).await?;
    Ok(Json(ConversationView::for_viewer(conversation, &caller)))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn typing(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TypingRequest>,
) -> Result<impl IntoResponse> {
    state.message_service.typing(id, caller, payload.typing).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Posts a platform message, e.g. an order status change relayed by the server side.
///
/// # Errors
/// Returns `AppError::AccessDenied` unless the caller is a server-side participant.
pub async fn post_system_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SystemMessageRequest>,
) -> Result<impl IntoResponse> {
    if caller.kind != PartyKind::Server {
        return Err(AppError::AccessDenied);
    }
    state.conversation_service.get(id, caller).await?;
    let message = state.message_service.send_system(id, payload.content).await?;
    Ok((StatusCode::CREATED, Json(MessageView::for_viewer(message, &caller))))
}
