pub(crate) mod session;

use crate::domain::event::EventEnvelope;
use crate::domain::party::Party;
use crate::services::broadcaster::Broadcaster;
use crate::services::clock::Clock;
use crate::services::conversation_service::ConversationService;
use crate::services::gateway::session::Session;
use crate::services::message_service::MessageService;
use axum::extract::ws::WebSocket;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) active_connections: UpDownCounter<i64>,
    pub(crate) commands_total: Counter<u64>,
    pub(crate) lagged_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("threadline-server");
        Self {
            active_connections: meter
                .i64_up_down_counter("websocket_active_connections")
                .with_description("Number of active WebSocket connections")
                .build(),
            commands_total: meter
                .u64_counter("websocket_commands_total")
                .with_description("Client commands handled, by command and outcome")
                .build(),
            lagged_total: meter
                .u64_counter("websocket_lagged_events_total")
                .with_description("Events skipped because a client fell behind its channel")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Live conversation access over WebSocket.
#[derive(Clone, Debug)]
pub struct GatewayService {
    conversations: ConversationService,
    messages: MessageService,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl GatewayService {
    #[must_use]
    pub fn new(
        conversations: ConversationService,
        messages: MessageService,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { conversations, messages, broadcaster, clock, metrics: Metrics::new() }
    }

    pub async fn handle_socket(
        &self,
        socket: WebSocket,
        party: Party,
        request_id: String,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let session = Session { party, request_id, socket, gateway: self.clone(), shutdown_rx };
        session.run().await;
    }

    async fn announce(&self, conversation_id: Uuid, party: Party, online: bool) {
        let event = EventEnvelope::presence(conversation_id, party, online, self.clock.now());
        self.broadcaster.publish_to_conversation(event).await;
    }
}
