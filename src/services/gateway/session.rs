use crate::api::schemas::gateway::{ClientCommand, ServerFrame};
use crate::domain::event::EventEnvelope;
use crate::domain::party::Party;
use crate::error::Result;
use crate::services::gateway::GatewayService;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use std::sync::Arc;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use uuid::Uuid;

type Topics = StreamMap<Uuid, BroadcastStream<Arc<EventEnvelope>>>;

pub(crate) struct Session {
    pub(crate) party: Party,
    pub(crate) request_id: String,
    pub(crate) socket: WebSocket,
    pub(crate) gateway: GatewayService,
    pub(crate) shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl Session {
    #[tracing::instrument(
        name = "websocket_session",
        skip(self),
        fields(
            party = %self.party,
            request_id = %self.request_id,
            otel.kind = "server",
            ws.session_id = %Uuid::new_v4()
        )
    )]
    pub(crate) async fn run(self) {
        // Destructured so the socket halves and the subscriptions can be borrowed independently.
        let Self { party, socket, gateway, mut shutdown_rx, .. } = self;

        gateway.metrics.active_connections.add(1, &[]);
        tracing::info!("WebSocket connected");

        let mut notifications = BroadcastStream::new(gateway.broadcaster.subscribe_recipient(party));
        let mut topics: Topics = StreamMap::new();
        let (mut ws_sink, mut ws_stream) = socket.split();

        loop {
            if *shutdown_rx.borrow() {
                tracing::info!("Shutdown signal received, closing WebSocket");
                let _ = ws_sink
                    .send(WsMessage::Close(Some(axum::extract::ws::CloseFrame {
                        code: axum::extract::ws::close_code::AWAY,
                        reason: "Server shutting down".into(),
                    })))
                    .await;
                break;
            }

            let outbound = tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() { break; }
                    None
                }

                msg = ws_stream.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => gateway.dispatch(party, text.as_str(), &mut topics).await,
                    Some(Ok(WsMessage::Binary(_))) => encode(&ServerFrame::Error {
                        code: "VALIDATION_ERROR",
                        error: "binary frames are not supported".to_string(),
                    }),
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                        tracing::debug!("Received heartbeat from client");
                        None
                    }
                    Some(Ok(WsMessage::Close(_)) | Err(_)) | None => break,
                },

                Some(received) = notifications.next() => match received {
                    Ok(notification) => encode(&ServerFrame::Notification { notification: &notification }),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        gateway.metrics.lagged_total.add(skipped, &[KeyValue::new("channel", "recipient")]);
                        encode(&ServerFrame::Lagged { conversation_id: None, skipped })
                    }
                },

                Some((conversation_id, received)) = topics.next(), if !topics.is_empty() => match received {
                    Ok(event) => encode(&ServerFrame::Event { event: &event }),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        gateway.metrics.lagged_total.add(skipped, &[KeyValue::new("channel", "conversation")]);
                        encode(&ServerFrame::Lagged { conversation_id: Some(conversation_id), skipped })
                    }
                },
            };

            if let Some(text) = outbound
                && ws_sink.send(WsMessage::Text(text.into())).await.is_err()
            {
                break;
            }
        }

        let _ = ws_sink.close().await;

        let subscribed: Vec<Uuid> = topics.keys().copied().collect();
        for conversation_id in subscribed {
            gateway.announce(conversation_id, party, false).await;
        }

        gateway.metrics.active_connections.add(-1, &[]);
        tracing::info!("WebSocket disconnected");
    }
}

impl GatewayService {
    /// Parses and runs one client command, returning the reply frame.
    async fn dispatch(&self, party: Party, text: &str, topics: &mut Topics) -> Option<String> {
        let command = match serde_json::from_str::<ClientCommand>(text) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "Received malformed command");
                self.metrics.commands_total.add(1, &[KeyValue::new("outcome", "malformed")]);
                return encode(&ServerFrame::Error { code: "VALIDATION_ERROR", error: format!("malformed command: {e}") });
            }
        };

        let reply = match self.execute(party, command, topics).await {
            Ok(()) => {
                self.record(command, "ok");
                ServerFrame::Ack { command: command.name(), conversation_id: command.conversation_id() }
            }
            Err(e) => {
                self.record(command, e.code());
                ServerFrame::Error { code: e.code(), error: e.public_message() }
            }
        };
        encode(&reply)
    }

    async fn execute(&self, party: Party, command: ClientCommand, topics: &mut Topics) -> Result<()> {
        match command {
            ClientCommand::Subscribe { conversation_id } => {
                self.conversations.get(conversation_id, party).await?;
                if !topics.contains_key(&conversation_id) {
                    let rx = self.broadcaster.subscribe_conversation(conversation_id);
                    topics.insert(conversation_id, BroadcastStream::new(rx));
                    self.announce(conversation_id, party, true).await;
                }
            }
            ClientCommand::Unsubscribe { conversation_id } => {
                if topics.remove(&conversation_id).is_some() {
                    self.announce(conversation_id, party, false).await;
                }
            }
            ClientCommand::TypingStart { conversation_id } => self.messages.typing(conversation_id, party, true).await?,
            ClientCommand::TypingStop { conversation_id } => self.messages.typing(conversation_id, party, false).await?,
            ClientCommand::MarkDelivered { conversation_id } => {
                self.messages.mark_delivered(conversation_id, party).await?;
            }
            ClientCommand::MarkRead { conversation_id } => {
                self.messages.mark_read(conversation_id, party).await?;
            }
        }
        Ok(())
    }

    fn record(&self, command: ClientCommand, outcome: &'static str) {
        self.metrics
            .commands_total
            .add(1, &[KeyValue::new("command", command.name()), KeyValue::new("outcome", outcome)]);
    }
}

fn encode(frame: &ServerFrame<'_>) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode WebSocket frame");
            None
        }
    }
}
