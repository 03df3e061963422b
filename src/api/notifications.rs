use crate::api::AppState;
use crate::api::middleware::Caller;
use crate::api::schemas::PageQuery;
use crate::api::schemas::notifications::{AffectedResponse, ListNotificationsQuery, UnreadCountResponse};
use crate::domain::notification::Notification;
use crate::domain::page::Page;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

/// # Errors
/// Returns an error if the store fails.
pub async fn list_notifications(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Page<Notification>>> {
    Ok(Json(state.notification_service.list(caller, query.unread_only, page.to_request()).await?))
}

/// # Errors
/// Returns an error if the store fails.
pub async fn unread_count(Caller(caller): Caller, State(state): State<AppState>) -> Result<Json<UnreadCountResponse>> {
    let count = state.notification_service.count_unread(caller).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// # Errors
/// Returns `AppError::NotFound` or `AppError::AccessDenied` if the notification belongs to someone else.
pub async fn mark_read(
    Caller(caller): Caller,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>> {
    Ok(Json(state.notification_service.mark_read(id, caller).await?))
}

/// # Errors
/// Returns an error if the store fails.
pub async fn mark_all_read(Caller(caller): Caller, State(state): State<AppState>) -> Result<Json<AffectedResponse>> {
    let affected = state.notification_service.mark_all_read(caller).await?;
    Ok(Json(AffectedResponse { affected }))
}

/// # Errors
/// Returns an error if the store fails.
pub async fn clear_all(Caller(caller): Caller, State(state): State<AppState>) -> Result<Json<AffectedResponse>> {
    let affected = state.notification_service.clear_all(caller).await?;
    Ok(Json(AffectedResponse { affected }))
}
