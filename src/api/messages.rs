use crate::api::AppState;
use crate::api::middleware::Caller;
use crate::api::schemas::PageQuery;
use crate::api::schemas::messages::{
    DeleteMessageQuery, EditMessageRequest, MessageView, ReceiptResponse, SearchQuery, SendMessageRequest, SyncQuery,
};
use crate::domain::message::Message;
use crate::domain::page::Page;
use crate::domain::party::Party;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

fn views(messages: Vec<Message>, viewer: &Party) -> Vec<MessageView> {
    messages.into_iter().map(|m| MessageView::for_viewer(m, viewer)).collect()
}

/// Sends a message into a conversation.
///
/// # Errors
/// Returns `AppError::Validation` for blank or oversized content.
/// Returns `AppError::AccessDenied` if the caller is not a participant.
pub async fn send_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state.message_service.send(conversation_id, caller, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(MessageView::for_viewer(message, &caller))))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn list_messages(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<MessageView>>> {
    let page = state.message_service.list_page(conversation_id, caller, page.to_request()).await?;
    Ok(Json(page.map(|m| MessageView::for_viewer(m, &caller))))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn list_all_messages(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<MessageView>>> {
    let messages = state.message_service.list_all(conversation_id, caller).await?;
    Ok(Json(views(messages, &caller)))
}

/// Messages sent strictly after `after`, for clients catching up after a disconnect.
///
/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn sync_messages(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<Vec<MessageView>>> {
    let messages = state.message_service.list_after(conversation_id, caller, query.after).await?;
    Ok(Json(views(messages, &caller)))
}

/// # Errors
/// Returns `AppError::Validation` for a blank query.
pub async fn search_messages(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<MessageView>>> {
    let page = state.message_service.search(conversation_id, caller, &query.q, page.to_request()).await?;
    Ok(Json(page.map(|m| MessageView::for_viewer(m, &caller))))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn mark_delivered(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>> {
    let outcome = state.message_service.mark_delivered(conversation_id, caller).await?;
    Ok(Json(outcome.into()))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied`.
pub async fn mark_read(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>> {
    let outcome = state.message_service.mark_read(conversation_id, caller).await?;
    Ok(Json(outcome.into()))
}

/// # Errors
/// Returns `AppError::EditWindowExpired` once the edit window has passed.
pub async fn edit_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<EditMessageRequest>,
) -> Result<Json<MessageView>> {
    let message = state.message_service.edit(message_id, caller, payload.content).await?;
    Ok(Json(MessageView::for_viewer(message, &caller)))
}

/// # Errors
/// Returns `AppError::DeleteWindowExpired` for a late delete-for-everyone.
pub async fn delete_message(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<DeleteMessageQuery>,
) -> Result<impl IntoResponse> {
    state.message_service.delete(message_id, caller, query.for_everyone).await?;
    Ok(StatusCode::NO_CONTENT)
}
