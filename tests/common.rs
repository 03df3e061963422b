#![allow(dead_code)]
use futures::{SinkExt, StreamExt};
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::sync::{Arc, Once};
use std::time::Duration;
use threadline_server::adapters::store::Store;
use threadline_server::api::MgmtState;
use threadline_server::config::Config;
use threadline_server::domain::party::Party;
use threadline_server::{AppBuilder, api};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("threadline_server=debug".parse().unwrap())
            .add_directive("sqlx=warn".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("tungstenite=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().init();
    });
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.store_retry.min_delay_ms = 1;
    config.store_retry.max_delay_ms = 5;
    config.notifications.gc_interval_secs = 1;
    config
}

pub struct TestApp {
    pub server_url: String,
    pub ws_url: String,
    pub mgmt_url: String,
    pub client: Client,
    pub config: Config,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        Self::spawn_inner(config, None).await
    }

    pub async fn spawn_with_store(config: Config, store: Arc<dyn Store>) -> Self {
        Self::spawn_inner(config, Some(store)).await
    }

    async fn spawn_inner(config: Config, store: Option<Arc<dyn Store>>) -> Self {
        setup_tracing();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = AppBuilder::new(config.clone()).with_shutdown_rx(shutdown_rx.clone());
        if let Some(store) = store {
            builder = builder.with_store(store);
        }
        let app = builder.build().await.expect("Failed to build application");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mgmt_addr = mgmt_listener.local_addr().unwrap();

        let router = api::app_router(app.services, shutdown_rx.clone());
        let mgmt_router = api::mgmt_router(MgmtState { health_service: app.health_service });

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt_router)
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let _workers = app.workers.spawn_all(shutdown_rx);

        Self {
            server_url: format!("http://{addr}"),
            ws_url: format!("ws://{addr}/v1/gateway"),
            mgmt_url: format!("http://{mgmt_addr}"),
            client: Client::new(),
            config,
            shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.server_url, path)
    }

    pub fn get(&self, party: Party, path: &str) -> RequestBuilder {
        as_party(self.client.get(self.url(path)), party)
    }

    pub fn post(&self, party: Party, path: &str) -> RequestBuilder {
        as_party(self.client.post(self.url(path)), party)
    }

    pub fn put(&self, party: Party, path: &str) -> RequestBuilder {
        as_party(self.client.put(self.url(path)), party)
    }

    pub fn patch(&self, party: Party, path: &str) -> RequestBuilder {
        as_party(self.client.patch(self.url(path)), party)
    }

    pub fn delete(&self, party: Party, path: &str) -> RequestBuilder {
        as_party(self.client.delete(self.url(path)), party)
    }

    /// Opens a conversation as `requester` with `server_id` and returns its JSON view.
    pub async fn create_conversation(&self, requester: Party, server_id: i64) -> Value {
        let resp = self
            .post(requester, "/conversations")
            .json(&json!({ "server_id": server_id, "title": "Order help" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn send_text(&self, sender: Party, conversation_id: &str, content: &str) -> Value {
        let resp = self
            .post(sender, &format!("/conversations/{conversation_id}/messages"))
            .json(&json!({ "content": content }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn fetch_conversation(&self, party: Party, conversation_id: &str) -> Value {
        let resp = self.get(party, &format!("/conversations/{conversation_id}")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        resp.json().await.unwrap()
    }

    pub async fn connect_ws(&self, party: Party) -> TestWsClient {
        let url = format!("{}?party_id={}&party_kind={}", self.ws_url, party.id, party.kind);
        let (stream, _) = connect_async(url).await.expect("Failed to connect WebSocket");
        TestWsClient { stream }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub fn as_party(builder: RequestBuilder, party: Party) -> RequestBuilder {
    builder.header("x-party-id", party.id.to_string()).header("x-party-kind", party.kind.to_string())
}

pub struct TestWsClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestWsClient {
    pub async fn send_command(&mut self, command: Value) {
        self.stream.send(Message::Text(command.to_string().into())).await.unwrap();
    }

    pub async fn subscribe(&mut self, conversation_id: &str) {
        self.send_command(json!({ "type": "subscribe", "conversation_id": conversation_id })).await;
        let ack = self.receive_matching(Duration::from_secs(2), |f| f["type"] == "ack").await;
        assert!(ack.is_some(), "subscribe was not acknowledged");
    }

    pub async fn receive_frame_timeout(&mut self, timeout: Duration) -> Option<Value> {
        loop {
            match tokio::time::timeout(timeout, self.stream.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => return Some(serde_json::from_str(text.as_str()).unwrap()),
                Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
                _ => return None,
            }
        }
    }

    /// Skips frames until one satisfies `predicate` or the timeout passes.
    pub async fn receive_matching(&mut self, timeout: Duration, predicate: impl Fn(&Value) -> bool) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let frame = self.receive_frame_timeout(remaining).await?;
            if predicate(&frame) {
                return Some(frame);
            }
        }
    }

    pub async fn receive_event(&mut self, event_type: &str) -> Option<Value> {
        self.receive_matching(Duration::from_secs(2), |f| f["type"] == "event" && f["event"]["event_type"] == event_type)
            .await
    }
}
