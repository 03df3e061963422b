use crate::api::AppState;
use crate::api::middleware::{parse_party, party_from_headers};
use crate::api::schemas::gateway::WsParams;
use crate::error::AppError;
use axum::{
    extract::{Query, State, ws::WebSocketUpgrade},
    http::{Extensions, HeaderMap},
    response::{IntoResponse, Response},
};
use tower_http::request_id::RequestId;

/// Upgrades to the live gateway. Identity comes from the usual headers or, for clients
/// that cannot set them, from `party_id` and `party_kind` query parameters.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    extensions: Extensions,
    State(state): State<AppState>,
) -> Response {
    let request_id = extensions
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let party = party_from_headers(&headers).or_else(|_| match (params.party_id, params.party_kind) {
        (Some(id), Some(kind)) => parse_party(&id, &kind),
        _ => Err(AppError::Unauthenticated),
    });

    match party {
        Ok(party) => {
            let gateway = state.gateway_service.clone();
            let shutdown_rx = state.shutdown_rx.clone();
            ws.on_upgrade(move |socket| async move {
                gateway.handle_socket(socket, party, request_id, shutdown_rx).await;
            })
        }
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake rejected");
            e.into_response()
        }
    }
}
