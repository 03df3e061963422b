use crate::services::conversation_service::ConversationService;
use crate::services::gateway::GatewayService;
use crate::services::health_service::HealthService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    routing::{get, patch, post, put},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod conversations;
pub mod gateway;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod schemas;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState {
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub notification_service: NotificationService,
    pub gateway_service: GatewayService,
    pub shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Clone, Debug)]
pub struct MgmtState {
    pub health_service: HealthService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub conversation_service: ConversationService,
    pub message_service: MessageService,
    pub notification_service: NotificationService,
    pub gateway_service: GatewayService,
}

/// Configures and returns the primary application router.
pub fn app_router(services: ServiceContainer, shutdown_rx: tokio::sync::watch::Receiver<bool>) -> Router {
    let state = AppState {
        conversation_service: services.conversation_service,
        message_service: services.message_service,
        notification_service: services.notification_service,
        gateway_service: services.gateway_service,
        shutdown_rx,
    };

    let conversation_routes = Router::new()
        .route("/conversations", post(conversations::create_conversation).get(conversations::list_conversations))
        .route("/conversations/by-order", get(conversations::find_by_order))
        .route("/conversations/{id}", get(conversations::get_conversation))
        .route("/conversations/{id}/status", put(conversations::update_status))
        .route("/conversations/{id}/agent", put(conversations::assign_agent))
        .route("/conversations/{id}/typing", post(conversations::typing))
        .route("/conversations/{id}/system-messages", post(conversations::post_system_message));

    let message_routes = Router::new()
        .route("/conversations/{id}/messages", post(messages::send_message).get(messages::list_messages))
        .route("/conversations/{id}/messages/all", get(messages::list_all_messages))
        .route("/conversations/{id}/messages/sync", get(messages::sync_messages))
        .route("/conversations/{id}/messages/search", get(messages::search_messages))
        .route("/conversations/{id}/delivered", post(messages::mark_delivered))
        .route("/conversations/{id}/read", post(messages::mark_read))
        .route("/messages/{id}", patch(messages::edit_message).delete(messages::delete_message));

    let notification_routes = Router::new()
        .route("/notifications", get(notifications::list_notifications).delete(notifications::clear_all))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read));

    let api_routes = conversation_routes
        .merge(message_routes)
        .merge(notification_routes)
        .route("/gateway", get(gateway::websocket_handler));

    Router::new()
        .nest("/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeRequestUuid))
        .with_state(state)
}

pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
